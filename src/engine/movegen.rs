//! Move generation.
//!
//! Two layers:
//!   1. `pseudo_legal_moves` — fast enumeration that ignores pins and check.
//!   2. `legal_moves` — filters the pseudo-legal list by making each move,
//!      testing whether the mover's king is attacked, and unmaking.
//!
//! The single make/test/unmake filter also rejects en-passant captures that
//! expose a discovered check and pinned-piece moves off the pin line.

use crate::engine::attacks;
use crate::engine::board::Position;
use crate::engine::types::{Bitboard, Color, Move, MoveFlag, PieceType, Square};

// =========================================================================
// Public API
// =========================================================================

/// Generate all legal moves for the side to move. The position is mutated
/// during filtering and restored before returning.
pub fn legal_moves(pos: &mut Position) -> Vec<Move> {
    let pseudo = pseudo_legal_moves(pos);
    let mut legal = Vec::with_capacity(pseudo.len());
    let us = pos.side_to_move;

    for mv in pseudo {
        let undo = pos.make_move(mv);
        if !pos.is_square_attacked(pos.king_sq(us), pos.side_to_move) {
            legal.push(mv);
        }
        pos.unmake_move(mv, &undo);
    }
    legal
}

/// Generate pseudo-legal moves for the side to move: every move that obeys
/// piece geometry, ignoring whether the own king ends up attacked.
pub fn pseudo_legal_moves(pos: &Position) -> Vec<Move> {
    let mut moves = Vec::with_capacity(64);
    let us = pos.side_to_move;
    generate_pawn_moves(pos, us, &mut moves);
    generate_knight_moves(pos, us, &mut moves);
    generate_slider_moves(pos, us, PieceType::Bishop, &mut moves);
    generate_slider_moves(pos, us, PieceType::Rook, &mut moves);
    generate_slider_moves(pos, us, PieceType::Queen, &mut moves);
    generate_king_moves(pos, us, &mut moves);
    generate_castling_moves(pos, us, &mut moves);
    moves
}

// =========================================================================
// Pawns
// =========================================================================

fn generate_pawn_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let pawns = pos.bb(us, PieceType::Pawn);
    let enemy = pos.occupied[(!us).index()];
    let empty = !pos.all_occupied;

    let (push, start_rank, promo_rank): (i8, u8, u8) = match us {
        Color::White => (8, 1, 6),
        Color::Black => (-8, 6, 1),
    };

    for from in pawns.iter() {
        let from_rank = from.rank();

        // Single push, with promotions from the seventh rank.
        let to = from.offset(push);
        if (Bitboard::from_square(to) & empty).is_not_empty() {
            if from_rank == promo_rank {
                push_promotions(from, to, false, moves);
            } else {
                moves.push(Move::new(from, to, MoveFlag::Quiet));

                // Double push through an empty intermediate square.
                if from_rank == start_rank {
                    let to2 = from.offset(push * 2);
                    if (Bitboard::from_square(to2) & empty).is_not_empty() {
                        moves.push(Move::new(from, to2, MoveFlag::DoublePush));
                    }
                }
            }
        }

        // Diagonal captures, promoting on the last rank.
        for to in (t.pawn_attacks(us, from) & enemy).iter() {
            if from_rank == promo_rank {
                push_promotions(from, to, true, moves);
            } else {
                moves.push(Move::new(from, to, MoveFlag::Capture));
            }
        }

        // En passant: the target must be attackable from this pawn AND the
        // double-pushed enemy pawn must still stand beyond the target.
        if let Some(ep) = pos.en_passant
            && t.pawn_attacks(us, from).is_set(ep)
        {
            let victim_sq = ep.offset(-push);
            if pos.bb(!us, PieceType::Pawn).is_set(victim_sq) {
                moves.push(Move::new(from, ep, MoveFlag::EnPassant));
            }
        }
    }
}

/// All four promotion variants for one pawn push or capture.
fn push_promotions(from: Square, to: Square, capture: bool, moves: &mut Vec<Move>) {
    let flags = if capture {
        [
            MoveFlag::PromoQueenCapture,
            MoveFlag::PromoRookCapture,
            MoveFlag::PromoBishopCapture,
            MoveFlag::PromoKnightCapture,
        ]
    } else {
        [
            MoveFlag::PromoQueen,
            MoveFlag::PromoRook,
            MoveFlag::PromoBishop,
            MoveFlag::PromoKnight,
        ]
    };
    for flag in flags {
        moves.push(Move::new(from, to, flag));
    }
}

// =========================================================================
// Knights
// =========================================================================

fn generate_knight_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];

    for from in pos.bb(us, PieceType::Knight).iter() {
        for to in (t.knight_attacks(from) & !friendly).iter() {
            let flag = if (Bitboard::from_square(to) & enemy).is_not_empty() {
                MoveFlag::Capture
            } else {
                MoveFlag::Quiet
            };
            moves.push(Move::new(from, to, flag));
        }
    }
}

// =========================================================================
// Sliders (bishop, rook, queen)
// =========================================================================

fn generate_slider_moves(pos: &Position, us: Color, piece: PieceType, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];
    let occ = pos.all_occupied;

    for from in pos.bb(us, piece).iter() {
        let attacks = match piece {
            PieceType::Bishop => t.bishop_attacks(from, occ),
            PieceType::Rook => t.rook_attacks(from, occ),
            PieceType::Queen => t.queen_attacks(from, occ),
            _ => unreachable!("not a slider: {piece:?}"),
        };
        for to in (attacks & !friendly).iter() {
            let flag = if (Bitboard::from_square(to) & enemy).is_not_empty() {
                MoveFlag::Capture
            } else {
                MoveFlag::Quiet
            };
            moves.push(Move::new(from, to, flag));
        }
    }
}

// =========================================================================
// King (non-castling)
// =========================================================================

fn generate_king_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let from = pos.king_sq(us);
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];

    for to in (t.king_attacks(from) & !friendly).iter() {
        let flag = if (Bitboard::from_square(to) & enemy).is_not_empty() {
            MoveFlag::Capture
        } else {
            MoveFlag::Quiet
        };
        moves.push(Move::new(from, to, flag));
    }
}

// =========================================================================
// Castling
// =========================================================================

fn generate_castling_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let them = !us;

    let (king_from, rook_ks, rook_qs) = match us {
        Color::White => (Square::E1, Square::H1, Square::A1),
        Color::Black => (Square::E8, Square::H8, Square::A8),
    };

    // King must stand on its origin square and must not be in check.
    if !pos.bb(us, PieceType::King).is_set(king_from) {
        return;
    }
    if pos.is_square_attacked(king_from, them) {
        return;
    }

    let rank_base = king_from.0 - 4;

    // Kingside: f and g empty, f and g unattacked. The b-file plays no part.
    if pos.castling.kingside(us) && pos.bb(us, PieceType::Rook).is_set(rook_ks) {
        let f_sq = Square(rank_base + 5);
        let g_sq = Square(rank_base + 6);
        if !pos.all_occupied.is_set(f_sq)
            && !pos.all_occupied.is_set(g_sq)
            && !pos.is_square_attacked(f_sq, them)
            && !pos.is_square_attacked(g_sq, them)
        {
            moves.push(Move::new(king_from, g_sq, MoveFlag::KingCastle));
        }
    }

    // Queenside: b, c and d empty; c and d unattacked (the rook may pass
    // through an attacked b-square).
    if pos.castling.queenside(us) && pos.bb(us, PieceType::Rook).is_set(rook_qs) {
        let b_sq = Square(rank_base + 1);
        let c_sq = Square(rank_base + 2);
        let d_sq = Square(rank_base + 3);
        if !pos.all_occupied.is_set(b_sq)
            && !pos.all_occupied.is_set(c_sq)
            && !pos.all_occupied.is_set(d_sq)
            && !pos.is_square_attacked(c_sq, them)
            && !pos.is_square_attacked(d_sq, them)
        {
            moves.push(Move::new(king_from, c_sq, MoveFlag::QueenCastle));
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
