//! Transposition table.
//!
//! A fixed-size, power-of-two array of entries indexed by the low bits of the
//! Zobrist key, with depth-preferred replacement: a slot is overwritten when
//! empty, when the key differs, or when the new search is at least as deep as
//! the stored one.
//!
//! Mate scores are stored relative to the probing ply and converted back to
//! root-relative scores on probe, so entries compare correctly regardless of
//! where in the tree they were written.

use super::MATE_BOUND;
use crate::engine::types::Move;

/// Kind of bound a stored score represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Empty,
    Exact,
    Lower,
    Upper,
}

#[derive(Clone, Copy)]
struct TtEntry {
    key: u64,
    mv: Move,
    score: i32,
    depth: i16,
    bound: Bound,
}

impl TtEntry {
    const EMPTY: TtEntry = TtEntry {
        key: 0,
        mv: Move::NULL,
        score: 0,
        depth: 0,
        bound: Bound::Empty,
    };
}

/// Outcome of a probe: an optional score usable as an immediate cutoff, plus
/// the stored best move as an ordering hint (NULL on miss).
pub struct TtProbe {
    pub score: Option<i32>,
    pub best_move: Move,
}

impl TtProbe {
    const MISS: TtProbe = TtProbe {
        score: None,
        best_move: Move::NULL,
    };
}

/// Fixed-size transposition table.
pub struct TranspositionTable {
    entries: Vec<TtEntry>,
    mask: usize,
}

impl TranspositionTable {
    /// Allocate a table with `2^log2_entries` slots.
    pub fn new(log2_entries: u32) -> Self {
        let size = 1usize << log2_entries;
        TranspositionTable {
            entries: vec![TtEntry::EMPTY; size],
            mask: size - 1,
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reset every slot. Used on `ucinewgame` and between adversarial runs.
    pub fn clear(&mut self) {
        self.entries.fill(TtEntry::EMPTY);
    }

    /// Look up `key`. A stored score becomes a cutoff when the entry is at
    /// least as deep as the request and its bound admits the current window:
    /// EXACT always, LOWER at `score >= beta`, UPPER at `score <= alpha`.
    pub fn probe(&self, key: u64, depth: i32, ply: i32, alpha: i32, beta: i32) -> TtProbe {
        let entry = &self.entries[(key as usize) & self.mask];
        if entry.bound == Bound::Empty || entry.key != key {
            return TtProbe::MISS;
        }

        let mut score = None;
        if entry.depth as i32 >= depth {
            let value = score_from_tt(entry.score, ply);
            score = match entry.bound {
                Bound::Exact => Some(value),
                Bound::Lower if value >= beta => Some(value),
                Bound::Upper if value <= alpha => Some(value),
                _ => None,
            };
        }

        TtProbe {
            score,
            best_move: entry.mv,
        }
    }

    /// Store a search result, depth-preferred.
    pub fn store(&mut self, key: u64, mv: Move, score: i32, depth: i32, bound: Bound, ply: i32) {
        let slot = &mut self.entries[(key as usize) & self.mask];
        if slot.bound == Bound::Empty || slot.key != key || depth as i16 >= slot.depth {
            *slot = TtEntry {
                key,
                mv,
                score: score_to_tt(score, ply),
                depth: depth as i16,
                bound,
            };
        }
    }
}

/// Convert a root-relative mate score to a ply-relative one for storage.
#[inline]
fn score_to_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_BOUND {
        score + ply
    } else if score <= -MATE_BOUND {
        score - ply
    } else {
        score
    }
}

/// Convert a stored ply-relative mate score back to root-relative.
#[inline]
fn score_from_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_BOUND {
        score - ply
    } else if score <= -MATE_BOUND {
        score + ply
    } else {
        score
    }
}
