//! Precomputed attack tables for move generation and attack detection.
//!
//! Leaper attacks (knight, king, pawn) are plain 64-entry lookups. Sliding
//! attacks use eight precomputed ray tables and resolve the first blocker on
//! the ray classically: the nearest occupied square truncates the ray, and
//! everything beyond it is masked off with a second table lookup.
//!
//! All tables are initialised once (via `OnceLock`) and live for the lifetime
//! of the process.

use crate::engine::types::{Bitboard, Color, Square};
use std::sync::OnceLock;

// =========================================================================
// Public API
// =========================================================================

/// Get a reference to the global attack tables.
pub fn tables() -> &'static AttackTables {
    static TABLES: OnceLock<AttackTables> = OnceLock::new();
    TABLES.get_or_init(AttackTables::init)
}

/// Ray directions, indexing the per-direction ray tables.
const NORTH: usize = 0;
const NORTH_EAST: usize = 1;
const EAST: usize = 2;
const SOUTH_EAST: usize = 3;
const SOUTH: usize = 4;
const SOUTH_WEST: usize = 5;
const WEST: usize = 6;
const NORTH_WEST: usize = 7;

/// Directions whose one-step shift increases the square index. The first
/// blocker on these rays is the lowest set bit; on the others, the highest.
const IS_POSITIVE: [bool; 8] = [true, true, true, false, false, false, false, true];

/// Pre-computed attack tables for every piece type.
pub struct AttackTables {
    knight: [Bitboard; 64],
    king: [Bitboard; 64],
    /// `pawn[color][square]` — squares a pawn of `color` on `square` attacks.
    pawn: [[Bitboard; 64]; 2],
    /// `rays[direction][square]` — every square on the open ray from `square`.
    rays: [[Bitboard; 64]; 8],
}

impl AttackTables {
    // -------------------------------------------------------------------
    // Leaper lookups
    // -------------------------------------------------------------------

    /// Knight attacks from a square.
    #[inline]
    pub fn knight_attacks(&self, sq: Square) -> Bitboard {
        self.knight[sq.0 as usize]
    }

    /// King ring attacks from a square.
    #[inline]
    pub fn king_attacks(&self, sq: Square) -> Bitboard {
        self.king[sq.0 as usize]
    }

    /// Squares attacked by a pawn of `color` standing on `sq`.
    #[inline]
    pub fn pawn_attacks(&self, color: Color, sq: Square) -> Bitboard {
        self.pawn[color.index()][sq.0 as usize]
    }

    // -------------------------------------------------------------------
    // Slider lookups (classic ray resolution)
    // -------------------------------------------------------------------

    /// Attacks along one ray: the open ray truncated at the first blocker
    /// (the blocker square itself stays attackable).
    #[inline]
    fn ray_attacks(&self, sq: Square, occupied: Bitboard, dir: usize) -> Bitboard {
        let ray = self.rays[dir][sq.0 as usize];
        let blockers = ray & occupied;
        let first = if IS_POSITIVE[dir] {
            blockers.lsb()
        } else {
            blockers.msb()
        };
        match first {
            Some(blocker) => ray ^ self.rays[dir][blocker.0 as usize],
            None => ray,
        }
    }

    /// Rook attacks from `sq` given the current occupancy.
    #[inline]
    pub fn rook_attacks(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.ray_attacks(sq, occupied, NORTH)
            | self.ray_attacks(sq, occupied, EAST)
            | self.ray_attacks(sq, occupied, SOUTH)
            | self.ray_attacks(sq, occupied, WEST)
    }

    /// Bishop attacks from `sq` given the current occupancy.
    #[inline]
    pub fn bishop_attacks(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.ray_attacks(sq, occupied, NORTH_EAST)
            | self.ray_attacks(sq, occupied, SOUTH_EAST)
            | self.ray_attacks(sq, occupied, SOUTH_WEST)
            | self.ray_attacks(sq, occupied, NORTH_WEST)
    }

    /// Queen attacks = rook | bishop.
    #[inline]
    pub fn queen_attacks(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.rook_attacks(sq, occupied) | self.bishop_attacks(sq, occupied)
    }
}

// =========================================================================
// Initialisation
// =========================================================================

/// One step in the given ray direction, with file-edge masking.
#[inline]
fn step(dir: usize, b: Bitboard) -> Bitboard {
    match dir {
        NORTH => b.north(),
        NORTH_EAST => b.north_east(),
        EAST => b.east(),
        SOUTH_EAST => b.south_east(),
        SOUTH => b.south(),
        SOUTH_WEST => b.south_west(),
        WEST => b.west(),
        NORTH_WEST => b.north_west(),
        _ => unreachable!("ray direction out of range: {dir}"),
    }
}

impl AttackTables {
    fn init() -> Self {
        AttackTables {
            knight: init_knight_attacks(),
            king: init_king_attacks(),
            pawn: init_pawn_attacks(),
            rays: init_rays(),
        }
    }
}

fn init_knight_attacks() -> [Bitboard; 64] {
    let mut table = [Bitboard::EMPTY; 64];
    let offsets: [(i8, i8); 8] = [
        (-2, -1),
        (-2, 1),
        (-1, -2),
        (-1, 2),
        (1, -2),
        (1, 2),
        (2, -1),
        (2, 1),
    ];
    for sq in 0..64u8 {
        let file = (sq & 7) as i8;
        let rank = (sq >> 3) as i8;
        let mut bb = 0u64;
        for &(dr, df) in &offsets {
            let r = rank + dr;
            let f = file + df;
            if (0..8).contains(&r) && (0..8).contains(&f) {
                bb |= 1u64 << (r * 8 + f);
            }
        }
        table[sq as usize] = Bitboard(bb);
    }
    table
}

/// King ring: union of all eight one-step shifts.
fn init_king_attacks() -> [Bitboard; 64] {
    let mut table = [Bitboard::EMPTY; 64];
    for sq in 0..64u8 {
        let b = Bitboard::from_square(Square(sq));
        table[sq as usize] = b.north()
            | b.south()
            | b.east()
            | b.west()
            | b.north_east()
            | b.north_west()
            | b.south_east()
            | b.south_west();
    }
    table
}

fn init_pawn_attacks() -> [[Bitboard; 64]; 2] {
    let mut table = [[Bitboard::EMPTY; 64]; 2];
    for sq in 0..64u8 {
        let b = Bitboard::from_square(Square(sq));
        table[Color::White.index()][sq as usize] = b.north_east() | b.north_west();
        table[Color::Black.index()][sq as usize] = b.south_east() | b.south_west();
    }
    table
}

fn init_rays() -> [[Bitboard; 64]; 8] {
    let mut rays = [[Bitboard::EMPTY; 64]; 8];
    for (dir, table) in rays.iter_mut().enumerate() {
        for sq in 0..64u8 {
            let mut ray = Bitboard::EMPTY;
            let mut b = step(dir, Bitboard::from_square(Square(sq)));
            while b.is_not_empty() {
                ray |= b;
                b = step(dir, b);
            }
            table[sq as usize] = ray;
        }
    }
    rays
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    // -------------------------------------------------------------------
    // Knight
    // -------------------------------------------------------------------

    #[test]
    fn knight_center_attacks() {
        let t = tables();
        let attacks = t.knight_attacks(sq("e4"));
        assert_eq!(attacks.pop_count(), 8);
        for name in ["d2", "f2", "c3", "g3", "c5", "g5", "d6", "f6"] {
            assert!(attacks.is_set(sq(name)), "knight on e4 should attack {name}");
        }
    }

    #[test]
    fn knight_corner_attacks() {
        let t = tables();
        let attacks = t.knight_attacks(sq("a1"));
        assert_eq!(attacks.pop_count(), 2);
        assert!(attacks.is_set(sq("b3")));
        assert!(attacks.is_set(sq("c2")));
    }

    // -------------------------------------------------------------------
    // King
    // -------------------------------------------------------------------

    #[test]
    fn king_center_attacks() {
        let t = tables();
        assert_eq!(t.king_attacks(sq("e4")).pop_count(), 8);
    }

    #[test]
    fn king_corner_attacks() {
        let t = tables();
        let attacks = t.king_attacks(sq("h8"));
        assert_eq!(attacks.pop_count(), 3); // g8, g7, h7
        assert!(attacks.is_set(sq("g8")));
        assert!(attacks.is_set(sq("g7")));
        assert!(attacks.is_set(sq("h7")));
    }

    // -------------------------------------------------------------------
    // Pawns
    // -------------------------------------------------------------------

    #[test]
    fn white_pawn_attacks() {
        let t = tables();
        let atk = t.pawn_attacks(Color::White, sq("e4"));
        assert_eq!(atk.pop_count(), 2);
        assert!(atk.is_set(sq("d5")));
        assert!(atk.is_set(sq("f5")));
    }

    #[test]
    fn black_pawn_attacks() {
        let t = tables();
        let atk = t.pawn_attacks(Color::Black, sq("e4"));
        assert_eq!(atk.pop_count(), 2);
        assert!(atk.is_set(sq("d3")));
        assert!(atk.is_set(sq("f3")));
    }

    #[test]
    fn pawn_attacks_edge_files() {
        let t = tables();
        let a2 = t.pawn_attacks(Color::White, sq("a2"));
        assert_eq!(a2.pop_count(), 1);
        assert!(a2.is_set(sq("b3")));

        let h7 = t.pawn_attacks(Color::Black, sq("h7"));
        assert_eq!(h7.pop_count(), 1);
        assert!(h7.is_set(sq("g6")));
    }

    // -------------------------------------------------------------------
    // Sliders
    // -------------------------------------------------------------------

    #[test]
    fn rook_attacks_empty_board() {
        let t = tables();
        assert_eq!(t.rook_attacks(sq("e4"), Bitboard::EMPTY).pop_count(), 14);
        assert_eq!(t.rook_attacks(sq("a1"), Bitboard::EMPTY).pop_count(), 14);
    }

    #[test]
    fn rook_attacks_stop_at_first_blocker() {
        let t = tables();
        let occ = Bitboard::from_square(sq("e6"));
        let attacks = t.rook_attacks(sq("e4"), occ);
        assert!(attacks.is_set(sq("e5")));
        assert!(attacks.is_set(sq("e6"))); // blocker itself is attackable
        assert!(!attacks.is_set(sq("e7")));
        assert!(!attacks.is_set(sq("e8")));
    }

    #[test]
    fn rook_attacks_blocked_below() {
        let t = tables();
        let occ = Bitboard::from_square(sq("e2"));
        let attacks = t.rook_attacks(sq("e4"), occ);
        assert!(attacks.is_set(sq("e3")));
        assert!(attacks.is_set(sq("e2")));
        assert!(!attacks.is_set(sq("e1")));
    }

    #[test]
    fn bishop_attacks_empty_board() {
        let t = tables();
        assert_eq!(t.bishop_attacks(sq("e4"), Bitboard::EMPTY).pop_count(), 13);
        assert_eq!(t.bishop_attacks(sq("a1"), Bitboard::EMPTY).pop_count(), 7);
    }

    #[test]
    fn bishop_attacks_stop_at_first_blocker() {
        let t = tables();
        let occ = Bitboard::from_square(sq("c6"));
        let attacks = t.bishop_attacks(sq("e4"), occ);
        assert!(attacks.is_set(sq("d5")));
        assert!(attacks.is_set(sq("c6")));
        assert!(!attacks.is_set(sq("b7")));
        assert!(!attacks.is_set(sq("a8")));
    }

    #[test]
    fn queen_attacks_empty_board() {
        let t = tables();
        // Rook (14) + bishop (13).
        assert_eq!(t.queen_attacks(sq("e4"), Bitboard::EMPTY).pop_count(), 27);
    }

    #[test]
    fn slider_attacks_never_include_origin() {
        let t = tables();
        for i in 0..64u8 {
            let s = Square(i);
            assert!(!t.rook_attacks(s, Bitboard::EMPTY).is_set(s));
            assert!(!t.bishop_attacks(s, Bitboard::EMPTY).is_set(s));
        }
    }

    #[test]
    fn full_occupancy_reduces_to_adjacent() {
        let t = tables();
        // With every square occupied, a rook attacks exactly its neighbours.
        let attacks = t.rook_attacks(sq("e4"), Bitboard::ALL);
        assert_eq!(attacks.pop_count(), 4);
        for name in ["e5", "e3", "d4", "f4"] {
            assert!(attacks.is_set(sq(name)));
        }
    }
}
