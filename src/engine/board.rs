//! Bitboard position representation.
//!
//! `Position` stores piece placement as 12 bitboards (2 colours x 6 piece
//! types), redundant occupancy bitboards, side to move, castling rights,
//! en-passant target, move clocks, and an incrementally maintained Zobrist
//! key. It is mutated only by `make_move` and restored only by `unmake_move`.

use crate::engine::attacks;
use crate::engine::types::{Bitboard, CastlingRights, ChessError, Color, Move, PieceType, Square};
use crate::engine::zobrist;

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

// ---------------------------------------------------------------------------
// Undo — saved state for reversing a move
// ---------------------------------------------------------------------------

/// State snapshot taken by `make_move` so `unmake_move` can restore the
/// position exactly.
#[derive(Clone, Copy, Debug)]
pub struct Undo {
    pub en_passant: Option<Square>,
    pub castling: CastlingRights,
    pub halfmove_clock: u16,
    pub fullmove_number: u16,
    pub moved: PieceType,
    pub captured: Option<PieceType>,
    pub zkey: u64,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A complete chess position in LERF square mapping (a1=0 .. h8=63).
#[derive(Clone, Debug)]
pub struct Position {
    /// Piece bitboards: `pieces[color][piece_type]`.
    pub pieces: [[Bitboard; PieceType::COUNT]; 2],

    /// Per-colour occupancy (union of that colour's piece bitboards).
    pub occupied: [Bitboard; 2],

    /// Total occupancy.
    pub all_occupied: Bitboard,

    /// Whose turn it is.
    pub side_to_move: Color,

    /// Castling availability.
    pub castling: CastlingRights,

    /// En-passant target square (the square jumped over by a double push).
    pub en_passant: Option<Square>,

    /// Half-move clock for the 50-move rule.
    pub halfmove_clock: u16,

    /// Full-move number (starts at 1, incremented after Black moves).
    pub fullmove_number: u16,

    /// Incrementally maintained Zobrist key.
    pub zkey: u64,
}

impl Position {
    /// An empty board with no pieces.
    pub fn empty() -> Self {
        Position {
            pieces: [[Bitboard::EMPTY; PieceType::COUNT]; 2],
            occupied: [Bitboard::EMPTY; 2],
            all_occupied: Bitboard::EMPTY,
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            zkey: 0,
        }
    }

    /// The standard starting position.
    pub fn startpos() -> Self {
        Self::from_fen(START_FEN).expect("start FEN is always valid")
    }

    // -----------------------------------------------------------------------
    // Piece manipulation
    // -----------------------------------------------------------------------

    /// Flip one piece bit across all three occupancy layers. Adding and
    /// removing are the same XOR; the public wrappers keep the distinction
    /// and assert their preconditions.
    #[inline]
    fn toggle_piece(&mut self, sq: Square, color: Color, piece: PieceType) {
        let bb = Bitboard::from_square(sq);
        self.pieces[color.index()][piece.index()] ^= bb;
        self.occupied[color.index()] ^= bb;
        self.all_occupied ^= bb;
    }

    /// Place a piece on an empty square. Does NOT touch the Zobrist key.
    #[inline]
    pub fn put_piece(&mut self, sq: Square, color: Color, piece: PieceType) {
        debug_assert!(!self.all_occupied.is_set(sq), "{sq} is already occupied");
        self.toggle_piece(sq, color, piece);
    }

    /// Remove a known piece from its square. Does NOT touch the Zobrist key.
    #[inline]
    pub fn remove_piece(&mut self, sq: Square, color: Color, piece: PieceType) {
        debug_assert!(
            self.bb(color, piece).is_set(sq),
            "no {color} {piece:?} on {sq}"
        );
        self.toggle_piece(sq, color, piece);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// What piece (if any) is on the square? The colour comes from the
    /// occupancy layers, the piece type from the matching piece board.
    pub fn piece_at(&self, sq: Square) -> Option<(Color, PieceType)> {
        let color = if self.occupied[Color::White.index()].is_set(sq) {
            Color::White
        } else if self.occupied[Color::Black.index()].is_set(sq) {
            Color::Black
        } else {
            return None;
        };
        PieceType::ALL
            .into_iter()
            .find(|&pt| self.bb(color, pt).is_set(sq))
            .map(|pt| (color, pt))
    }

    /// Bitboard of all pieces of a given colour and type.
    #[inline]
    pub fn bb(&self, color: Color, piece: PieceType) -> Bitboard {
        self.pieces[color.index()][piece.index()]
    }

    /// King square for the given colour.
    #[inline]
    pub fn king_sq(&self, color: Color) -> Square {
        self.pieces[color.index()][PieceType::King.index()]
            .lsb()
            .expect("king must exist")
    }

    /// Piece type on `sq` for a known colour. Precondition: the square holds
    /// a piece of that colour.
    #[inline]
    pub(crate) fn piece_type_at(&self, sq: Square, color: Color) -> PieceType {
        let bb = Bitboard::from_square(sq);
        for pt in PieceType::ALL {
            if (self.pieces[color.index()][pt.index()] & bb).is_not_empty() {
                return pt;
            }
        }
        panic!("no {color} piece on {sq}:\n{}", self.board_string());
    }

    // -----------------------------------------------------------------------
    // Attack detection
    // -----------------------------------------------------------------------

    /// Is `sq` attacked by any piece of colour `by`?
    pub fn is_square_attacked(&self, sq: Square, by: Color) -> bool {
        let t = attacks::tables();
        let occ = self.all_occupied;

        // Pawns, via the inverse capture geometry: the squares from which a
        // `by` pawn would attack `sq` are the squares a `!by` pawn on `sq`
        // would attack.
        if (t.pawn_attacks(!by, sq) & self.bb(by, PieceType::Pawn)).is_not_empty() {
            return true;
        }

        if (t.knight_attacks(sq) & self.bb(by, PieceType::Knight)).is_not_empty() {
            return true;
        }

        if (t.king_attacks(sq) & self.bb(by, PieceType::King)).is_not_empty() {
            return true;
        }

        let rook_queen = self.bb(by, PieceType::Rook) | self.bb(by, PieceType::Queen);
        if (t.rook_attacks(sq, occ) & rook_queen).is_not_empty() {
            return true;
        }

        let bishop_queen = self.bb(by, PieceType::Bishop) | self.bb(by, PieceType::Queen);
        if (t.bishop_attacks(sq, occ) & bishop_queen).is_not_empty() {
            return true;
        }

        false
    }

    /// Is the side to move currently in check?
    #[inline]
    pub fn in_check(&self) -> bool {
        self.is_square_attacked(self.king_sq(self.side_to_move), !self.side_to_move)
    }

    // -----------------------------------------------------------------------
    // Zobrist
    // -----------------------------------------------------------------------

    /// Full key recompute from the position fields.
    pub fn compute_zobrist(&self) -> u64 {
        let zk = zobrist::keys();
        let mut key = 0u64;

        for color in [Color::White, Color::Black] {
            for pt in PieceType::ALL {
                for sq in self.bb(color, pt).iter() {
                    key ^= zk.piece_key(color, pt, sq);
                }
            }
        }

        if self.side_to_move == Color::Black {
            key ^= zk.side_to_move;
        }

        key ^= zk.castle_component(self.castling);
        key ^= self.ep_component();

        key
    }

    /// EP file key, included only when a side-to-move pawn could actually
    /// capture onto the EP target. This keeps keys identical between
    /// transpositions that differ only by a non-capturable EP square.
    fn ep_component(&self) -> u64 {
        let Some(ep) = self.en_passant else {
            return 0;
        };
        let target = Bitboard::from_square(ep);
        let pawns = self.bb(self.side_to_move, PieceType::Pawn);
        let capture_origins = match self.side_to_move {
            Color::White => target.south_east() | target.south_west(),
            Color::Black => target.north_east() | target.north_west(),
        };
        if (capture_origins & pawns).is_not_empty() {
            zobrist::keys().ep_key(ep.file())
        } else {
            0
        }
    }

    // -----------------------------------------------------------------------
    // Make / Unmake
    // -----------------------------------------------------------------------

    /// Apply a move. The move must be pseudo-legal for this position; the
    /// caller is responsible for legality filtering.
    pub fn make_move(&mut self, mv: Move) -> Undo {
        let zk = zobrist::keys();
        let us = self.side_to_move;
        let them = !us;
        let from = mv.from_sq();
        let to = mv.to_sq();
        let flag = mv.flag();

        let moved = self.piece_type_at(from, us);

        let mut undo = Undo {
            en_passant: self.en_passant,
            castling: self.castling,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            moved,
            captured: None,
            zkey: self.zkey,
        };

        // Old EP component leaves the key before any pawn moves.
        self.zkey ^= self.ep_component();
        self.en_passant = None;

        // Captures first; the EP victim is not on the destination square.
        if flag.is_en_passant() {
            let cap_sq = match us {
                Color::White => to.offset(-8),
                Color::Black => to.offset(8),
            };
            self.remove_piece(cap_sq, them, PieceType::Pawn);
            self.zkey ^= zk.piece_key(them, PieceType::Pawn, cap_sq);
            undo.captured = Some(PieceType::Pawn);
        } else if flag.is_capture() {
            let victim = self.piece_type_at(to, them);
            self.remove_piece(to, them, victim);
            self.zkey ^= zk.piece_key(them, victim, to);
            undo.captured = Some(victim);
        }

        // Lift the mover off its origin.
        self.remove_piece(from, us, moved);
        self.zkey ^= zk.piece_key(us, moved, from);

        // Land on the destination: promoted piece for promotions, the mover
        // otherwise.
        let landing = flag.promotion_piece().unwrap_or(moved);
        self.put_piece(to, us, landing);
        self.zkey ^= zk.piece_key(us, landing, to);

        // Castling relocates the rook as well.
        if flag.is_castle() {
            let (rook_from, rook_to) = castling_rook_squares(to);
            self.remove_piece(rook_from, us, PieceType::Rook);
            self.zkey ^= zk.piece_key(us, PieceType::Rook, rook_from);
            self.put_piece(rook_to, us, PieceType::Rook);
            self.zkey ^= zk.piece_key(us, PieceType::Rook, rook_to);
        }

        // Double push sets the EP target to the square jumped over.
        if flag.is_double_push() {
            self.en_passant = Some(match us {
                Color::White => from.offset(8),
                Color::Black => from.offset(-8),
            });
        }

        // Castling rights: a king move clears both of its side's rights, a
        // rook move or a capture on a rook home square clears one. The mask
        // table covers all cases by from/to square.
        self.castling.0 &= CASTLING_MASK[from.0 as usize];
        self.castling.0 &= CASTLING_MASK[to.0 as usize];
        self.zkey ^= zk.castle_component(undo.castling) ^ zk.castle_component(self.castling);

        // Halfmove clock resets on pawn moves and captures.
        if moved == PieceType::Pawn || undo.captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        if us == Color::Black {
            self.fullmove_number += 1;
        }
        self.side_to_move = them;
        self.zkey ^= zk.side_to_move;

        // New EP component enters with the post-move side to move.
        self.zkey ^= self.ep_component();

        debug_assert_eq!(self.zkey, self.compute_zobrist(), "incremental key drift");

        undo
    }

    /// Reverse a move previously applied with `make_move`.
    pub fn unmake_move(&mut self, mv: Move, undo: &Undo) {
        let them = self.side_to_move; // the side to move after make_move
        let us = !them; // the side that made the move
        let from = mv.from_sq();
        let to = mv.to_sq();
        let flag = mv.flag();

        self.side_to_move = us;
        self.en_passant = undo.en_passant;
        self.castling = undo.castling;
        self.halfmove_clock = undo.halfmove_clock;
        self.fullmove_number = undo.fullmove_number;
        self.zkey = undo.zkey;

        // Take the landed piece off the destination and restore the mover.
        let landing = flag.promotion_piece().unwrap_or(undo.moved);
        self.remove_piece(to, us, landing);
        self.put_piece(from, us, undo.moved);

        // Put the rook back after castling.
        if flag.is_castle() {
            let (rook_from, rook_to) = castling_rook_squares(to);
            self.remove_piece(rook_to, us, PieceType::Rook);
            self.put_piece(rook_from, us, PieceType::Rook);
        }

        // Restore the captured piece.
        if let Some(captured) = undo.captured {
            if flag.is_en_passant() {
                let cap_sq = match us {
                    Color::White => to.offset(-8),
                    Color::Black => to.offset(8),
                };
                self.put_piece(cap_sq, them, PieceType::Pawn);
            } else {
                self.put_piece(to, them, captured);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Consistency check
    // -----------------------------------------------------------------------

    /// Verify the redundant occupancy layers against the piece bitboards and
    /// that no square is claimed by two piece boards. Panics on mismatch;
    /// used by debug builds and the test suite.
    pub fn assert_consistent(&self) {
        let rebuilt = self
            .pieces
            .map(|side| side.into_iter().fold(Bitboard::EMPTY, |acc, bb| acc | bb));
        assert_eq!(self.occupied, rebuilt, "per-colour occupancy out of sync");
        assert_eq!(
            self.all_occupied,
            rebuilt[0] | rebuilt[1],
            "total occupancy out of sync"
        );

        // A union loses overlaps; the bit totals do not.
        let bits: u32 = self.pieces.iter().flatten().map(|bb| bb.pop_count()).sum();
        assert_eq!(
            bits,
            self.all_occupied.pop_count(),
            "a square is occupied by two pieces"
        );
    }

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    /// Render the board as an 8-line text grid (rank 8 at the top).
    pub fn board_string(&self) -> String {
        let mut s = String::with_capacity(200);
        for rank in (0..8).rev() {
            s.push((b'1' + rank) as char);
            s.push(' ');
            for file in 0..8 {
                let sq = Square::from_file_rank(file, rank);
                let ch = match self.piece_at(sq) {
                    Some((c, p)) => p.to_char(c),
                    None => '.',
                };
                s.push(ch);
                if file < 7 {
                    s.push(' ');
                }
            }
            s.push('\n');
        }
        s.push_str("  a b c d e f g h");
        s
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.board_string())
    }
}

// ---------------------------------------------------------------------------
// Castling helpers
// ---------------------------------------------------------------------------

/// For a castling king destination, the rook's (from, to) squares.
fn castling_rook_squares(king_to: Square) -> (Square, Square) {
    match king_to.0 {
        6 => (Square::H1, Square::F1),  // white kingside
        2 => (Square::A1, Square::D1),  // white queenside
        62 => (Square::H8, Square::F8), // black kingside
        58 => (Square::A8, Square::D8), // black queenside
        _ => panic!("invalid castling king destination: {king_to}"),
    }
}

/// Castling-rights mask per square: ANDed into the rights whenever a move
/// touches that square. Covers king moves, rook moves, and rook captures.
#[rustfmt::skip]
const CASTLING_MASK: [u8; 64] = {
    let mut mask = [0b1111u8; 64];
    mask[0]  = 0b1111 & !CastlingRights::WHITE_QUEENSIDE;                                   // a1
    mask[4]  = 0b1111 & !(CastlingRights::WHITE_KINGSIDE | CastlingRights::WHITE_QUEENSIDE); // e1
    mask[7]  = 0b1111 & !CastlingRights::WHITE_KINGSIDE;                                    // h1
    mask[56] = 0b1111 & !CastlingRights::BLACK_QUEENSIDE;                                   // a8
    mask[60] = 0b1111 & !(CastlingRights::BLACK_KINGSIDE | CastlingRights::BLACK_QUEENSIDE); // e8
    mask[63] = 0b1111 & !CastlingRights::BLACK_KINGSIDE;                                    // h8
    mask
};

// ---------------------------------------------------------------------------
// FEN parsing & generation
// ---------------------------------------------------------------------------

impl Position {
    /// Parse a FEN string. Validates all six fields and leaves no partially
    /// built position behind on error.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ChessError::InvalidFen(format!(
                "expected 6 fields, got {}",
                fields.len()
            )));
        }

        let mut pos = Position::empty();

        // ----- Field 1: piece placement -----
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(ChessError::InvalidFen(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        for (rank_idx, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - rank_idx as u8;
            let mut file: u8 = 0;
            for ch in rank_str.chars() {
                if file > 7 {
                    return Err(ChessError::InvalidFen(format!(
                        "too many squares in rank {}",
                        rank + 1
                    )));
                }
                if let Some(digit) = ch.to_digit(10) {
                    if !(1..=8).contains(&digit) {
                        return Err(ChessError::InvalidFen(format!(
                            "invalid empty count '{ch}' in rank {}",
                            rank + 1
                        )));
                    }
                    file += digit as u8;
                } else if let Some((color, piece)) = PieceType::from_char(ch) {
                    pos.put_piece(Square::from_file_rank(file, rank), color, piece);
                    file += 1;
                } else {
                    return Err(ChessError::InvalidFen(format!(
                        "invalid character '{ch}' in piece placement"
                    )));
                }
            }
            if file != 8 {
                return Err(ChessError::InvalidFen(format!(
                    "rank {} has {} squares instead of 8",
                    rank + 1,
                    file
                )));
            }
        }

        // Exactly one king per side.
        for color in [Color::White, Color::Black] {
            let kings = pos.bb(color, PieceType::King).pop_count();
            if kings != 1 {
                return Err(ChessError::InvalidFen(format!(
                    "{color} has {kings} kings (expected 1)"
                )));
            }
        }

        // ----- Field 2: side to move -----
        pos.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(ChessError::InvalidFen(format!(
                    "invalid side to move: '{other}'"
                )));
            }
        };

        // ----- Field 3: castling availability -----
        pos.castling = CastlingRights::from_fen(fields[2]).ok_or_else(|| {
            ChessError::InvalidFen(format!("invalid castling field: '{}'", fields[2]))
        })?;

        // ----- Field 4: en-passant target -----
        if fields[3] != "-" {
            let ep = Square::from_algebraic(fields[3]).ok_or_else(|| {
                ChessError::InvalidFen(format!("invalid en passant square: '{}'", fields[3]))
            })?;
            // The target sits behind the double-pushed enemy pawn: rank 6
            // with White to move, rank 3 with Black to move.
            let (expected_rank, pawn_sq) = match pos.side_to_move {
                Color::White => (5u8, ep.offset(-8)),
                Color::Black => (2u8, ep.offset(8)),
            };
            if ep.rank() != expected_rank {
                return Err(ChessError::InvalidFen(format!(
                    "en passant square {} on wrong rank for {} to move",
                    fields[3], pos.side_to_move
                )));
            }
            if !pos.bb(!pos.side_to_move, PieceType::Pawn).is_set(pawn_sq) {
                return Err(ChessError::InvalidFen(format!(
                    "en passant square {} has no double-pushed pawn beyond it",
                    fields[3]
                )));
            }
            pos.en_passant = Some(ep);
        }

        // ----- Field 5: halfmove clock -----
        pos.halfmove_clock = fields[4].parse::<u16>().map_err(|_| {
            ChessError::InvalidFen(format!("invalid halfmove clock: '{}'", fields[4]))
        })?;

        // ----- Field 6: fullmove number -----
        pos.fullmove_number = fields[5].parse::<u16>().map_err(|_| {
            ChessError::InvalidFen(format!("invalid fullmove number: '{}'", fields[5]))
        })?;
        if pos.fullmove_number == 0 {
            return Err(ChessError::InvalidFen(
                "fullmove number must be >= 1".to_string(),
            ));
        }

        pos.zkey = pos.compute_zobrist();

        #[cfg(debug_assertions)]
        pos.assert_consistent();

        Ok(pos)
    }

    /// Emit the position as a FEN string.
    pub fn to_fen(&self) -> String {
        // One string per rank, top rank first, empty squares run-length
        // compressed as FEN requires.
        let placement: Vec<String> = (0..8)
            .rev()
            .map(|rank| {
                let mut row = String::with_capacity(8);
                let mut empty_run = 0u8;
                for file in 0..8 {
                    if let Some((color, piece)) = self.piece_at(Square::from_file_rank(file, rank))
                    {
                        if empty_run > 0 {
                            row.push((b'0' + empty_run) as char);
                            empty_run = 0;
                        }
                        row.push(piece.to_char(color));
                    } else {
                        empty_run += 1;
                    }
                }
                if empty_run > 0 {
                    row.push((b'0' + empty_run) as char);
                }
                row
            })
            .collect();

        let side = match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        };
        let ep = self
            .en_passant
            .map_or_else(|| "-".to_string(), |sq| sq.to_algebraic());

        format!(
            "{} {side} {} {ep} {} {}",
            placement.join("/"),
            self.castling.to_fen(),
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
