//! NNUE evaluation.
//!
//! The network is a single hidden layer over 768 binary input features per
//! perspective: (side, piece, square), with ranks flipped for the Black
//! perspective. Two accumulators hold the pre-activation hidden vector for
//! each reference colour and are updated incrementally as moves are made and
//! unmade, so a full forward pass is never recomputed during search.
//!
//! Two numeric paths are supported and chosen by the weight-file format:
//! quantised i16 (activation `clamp(x, 0, QA)^2`, integer reduction) and raw
//! f32 (activation `clamp(x, 0, 1)^2`). Both scale to centipawns and clamp
//! to +/-20000.
//!
//! Weight-file layout, in element order: L0 weights, L0 bias (H), L1 weights
//! (2H), L1 bias (1). The element count determines `H = (count - 1) / 771`.
//! Quantised files store L0 feature-major; float files store it `[H x 768]`
//! row-major and are transposed on load.

use crate::engine::board::Position;
use crate::engine::types::{Color, Move, MoveFlag, PieceType, Square};
use std::path::Path;

/// L0 quantisation range (and ScReLU clip) for the quantised path.
pub const QA: i32 = 255;
/// L1 quantisation divisor for the quantised path.
pub const QB: i32 = 64;
/// Network output to centipawn scale.
pub const SCALE: i32 = 400;
/// Final evaluation clamp in centipawns.
pub const EVAL_CLAMP: i32 = 20_000;

/// Input features per perspective: 2 sides x 6 pieces x 64 squares.
const FEATURES: usize = 768;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from weight loading.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("failed to read network file '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised network format ({0} bytes match neither i16 nor f32 layout)")]
    BadFormat(usize),
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

enum Weights {
    /// i16 weights; L0 stored feature-major (`[feature][hidden]`).
    Quantised {
        l0w: Vec<i16>,
        l0b: Vec<i16>,
        l1w: Vec<i16>,
        l1b: i16,
    },
    /// f32 weights; L0 transposed to feature-major on load.
    Float {
        l0w: Vec<f32>,
        l0b: Vec<f32>,
        l1w: Vec<f32>,
        l1b: f32,
    },
}

/// A loaded evaluation network. Immutable after construction; all mutable
/// evaluation state lives in `EvalState`.
pub struct Network {
    hidden: usize,
    weights: Weights,
}

impl Network {
    /// Load a network from a raw binary file.
    pub fn load(path: impl AsRef<Path>) -> Result<Network, EvalError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| EvalError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let net = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            hidden = net.hidden,
            format = if net.is_quantised() { "quantised_i16" } else { "float_raw" },
            "loaded NNUE network"
        );
        Ok(net)
    }

    /// Parse a network from raw bytes. The quantised layout is preferred when
    /// both interpretations would fit.
    pub fn from_bytes(bytes: &[u8]) -> Result<Network, EvalError> {
        if let Some(net) = Self::try_quantised(bytes) {
            return Ok(net);
        }
        if let Some(net) = Self::try_float(bytes) {
            return Ok(net);
        }
        Err(EvalError::BadFormat(bytes.len()))
    }

    fn try_quantised(bytes: &[u8]) -> Option<Network> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return None;
        }
        let count = bytes.len() / 2;
        if count < 1 || (count - 1) % 771 != 0 {
            return None;
        }
        let hidden = (count - 1) / 771;
        if hidden == 0 {
            return None;
        }

        let mut vals = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(2) {
            vals.push(i16::from_le_bytes([chunk[0], chunk[1]]));
        }

        let l0_len = FEATURES * hidden;
        let l0w = vals[..l0_len].to_vec();
        let l0b = vals[l0_len..l0_len + hidden].to_vec();
        let l1w = vals[l0_len + hidden..l0_len + 3 * hidden].to_vec();
        let l1b = vals[l0_len + 3 * hidden];

        Some(Network {
            hidden,
            weights: Weights::Quantised { l0w, l0b, l1w, l1b },
        })
    }

    fn try_float(bytes: &[u8]) -> Option<Network> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let count = bytes.len() / 4;
        if count < 1 || (count - 1) % 771 != 0 {
            return None;
        }
        let hidden = (count - 1) / 771;
        if hidden == 0 {
            return None;
        }

        let mut vals = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(4) {
            vals.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        let l0_len = FEATURES * hidden;
        // On disk L0 is [hidden][feature] row-major; transpose to
        // feature-major so a feature's column is contiguous.
        let mut l0w = vec![0.0f32; l0_len];
        for feat in 0..FEATURES {
            for i in 0..hidden {
                l0w[feat * hidden + i] = vals[i * FEATURES + feat];
            }
        }
        let l0b = vals[l0_len..l0_len + hidden].to_vec();
        let l1w = vals[l0_len + hidden..l0_len + 3 * hidden].to_vec();
        let l1b = vals[l0_len + 3 * hidden];

        Some(Network {
            hidden,
            weights: Weights::Float { l0w, l0b, l1w, l1b },
        })
    }

    /// Hidden-layer width H.
    #[inline]
    pub fn hidden_size(&self) -> usize {
        self.hidden
    }

    #[inline]
    pub fn is_quantised(&self) -> bool {
        matches!(self.weights, Weights::Quantised { .. })
    }

    // -----------------------------------------------------------------------
    // State construction and evaluation
    // -----------------------------------------------------------------------

    /// Build both perspective accumulators from scratch for `pos`.
    pub fn init_position(&self, pos: &Position) -> EvalState {
        let mut acc = match &self.weights {
            Weights::Quantised { l0b, .. } => Accumulators::Quantised {
                white: l0b.iter().map(|&b| b as i32).collect(),
                black: l0b.iter().map(|&b| b as i32).collect(),
            },
            Weights::Float { l0b, .. } => Accumulators::Float {
                white: l0b.clone(),
                black: l0b.clone(),
            },
        };

        for color in [Color::White, Color::Black] {
            for piece in PieceType::ALL {
                for sq in pos.bb(color, piece).iter() {
                    for perspective in [Color::White, Color::Black] {
                        let feat = feature_index(perspective, color, piece, sq);
                        self.add_column(&mut acc, perspective, feat);
                    }
                }
            }
        }

        EvalState {
            acc,
            stm: pos.side_to_move,
        }
    }

    /// Evaluate from the accumulators: centipawns from the side to move's
    /// perspective.
    pub fn evaluate(&self, st: &EvalState) -> i32 {
        let h = self.hidden;
        match (&self.weights, &st.acc) {
            (Weights::Quantised { l1w, l1b, .. }, Accumulators::Quantised { white, black }) => {
                let (stm, ntm) = match st.stm {
                    Color::White => (white, black),
                    Color::Black => (black, white),
                };
                let mut out: i64 = 0;
                for i in 0..h {
                    out += screlu_quantised(stm[i]) as i64 * l1w[i] as i64;
                }
                for i in 0..h {
                    out += screlu_quantised(ntm[i]) as i64 * l1w[h + i] as i64;
                }
                out /= QA as i64;
                out += *l1b as i64;
                out *= SCALE as i64;
                out /= (QA * QB) as i64;
                out.clamp(-EVAL_CLAMP as i64, EVAL_CLAMP as i64) as i32
            }
            (Weights::Float { l1w, l1b, .. }, Accumulators::Float { white, black }) => {
                let (stm, ntm) = match st.stm {
                    Color::White => (white, black),
                    Color::Black => (black, white),
                };
                let mut y = *l1b;
                for i in 0..h {
                    y += l1w[i] * screlu_float(stm[i]);
                }
                for i in 0..h {
                    y += l1w[h + i] * screlu_float(ntm[i]);
                }
                let cp = y * SCALE as f32;
                cp.clamp(-(EVAL_CLAMP as f32), EVAL_CLAMP as f32) as i32
            }
            _ => unreachable!("accumulator format does not match network format"),
        }
    }

    /// Evaluate a position from scratch (fresh accumulators).
    pub fn evaluate_position(&self, pos: &Position) -> i32 {
        self.evaluate(&self.init_position(pos))
    }

    // -----------------------------------------------------------------------
    // Incremental update / revert
    // -----------------------------------------------------------------------

    /// Apply the accumulator delta for `mv`, which is about to be made on
    /// `pos` (the position is pre-move). Toggles the state's side to move and
    /// returns the delta for `revert`.
    pub fn update(&self, st: &mut EvalState, pos: &Position, mv: Move) -> NnueDelta {
        let us = pos.side_to_move;
        let them = !us;
        let from = mv.from_sq();
        let to = mv.to_sq();
        let flag = mv.flag();

        let moved = pos.piece_type_at(from, us);

        let mut delta = NnueDelta {
            add: [FeatureSet::default(), FeatureSet::default()],
            remove: [FeatureSet::default(), FeatureSet::default()],
            stm_before: st.stm,
        };

        let remove = |d: &mut NnueDelta, side: Color, piece: PieceType, sq: Square| {
            for perspective in [Color::White, Color::Black] {
                d.remove[perspective.index()].push(feature_index(perspective, side, piece, sq));
            }
        };
        let add = |d: &mut NnueDelta, side: Color, piece: PieceType, sq: Square| {
            for perspective in [Color::White, Color::Black] {
                d.add[perspective.index()].push(feature_index(perspective, side, piece, sq));
            }
        };

        // The mover leaves its origin.
        remove(&mut delta, us, moved, from);

        // Captures, with the en-passant victim off the destination square.
        if flag.is_en_passant() {
            let cap_sq = match us {
                Color::White => to.offset(-8),
                Color::Black => to.offset(8),
            };
            remove(&mut delta, them, PieceType::Pawn, cap_sq);
        } else if flag.is_capture() {
            let victim = pos.piece_type_at(to, them);
            remove(&mut delta, them, victim, to);
        }

        // The landed piece: promotion piece or the mover.
        let placed = flag.promotion_piece().unwrap_or(moved);
        add(&mut delta, us, placed, to);

        // Castling relocates the rook.
        if flag.is_castle() {
            let (rook_from, rook_to) = match (us, flag) {
                (Color::White, MoveFlag::KingCastle) => (Square::H1, Square::F1),
                (Color::White, _) => (Square::A1, Square::D1),
                (Color::Black, MoveFlag::KingCastle) => (Square::H8, Square::F8),
                (Color::Black, _) => (Square::A8, Square::D8),
            };
            remove(&mut delta, us, PieceType::Rook, rook_from);
            add(&mut delta, us, PieceType::Rook, rook_to);
        }

        for perspective in [Color::White, Color::Black] {
            for feat in delta.remove[perspective.index()].iter() {
                self.sub_column(&mut st.acc, perspective, feat);
            }
            for feat in delta.add[perspective.index()].iter() {
                self.add_column(&mut st.acc, perspective, feat);
            }
        }

        st.stm = !st.stm;
        delta
    }

    /// Undo a previous `update`: apply the inverse column deltas and restore
    /// the side to move.
    pub fn revert(&self, st: &mut EvalState, delta: &NnueDelta) {
        for perspective in [Color::White, Color::Black] {
            for feat in delta.add[perspective.index()].iter() {
                self.sub_column(&mut st.acc, perspective, feat);
            }
            for feat in delta.remove[perspective.index()].iter() {
                self.add_column(&mut st.acc, perspective, feat);
            }
        }
        st.stm = delta.stm_before;
    }

    // -----------------------------------------------------------------------
    // Column arithmetic
    // -----------------------------------------------------------------------

    fn add_column(&self, acc: &mut Accumulators, perspective: Color, feature: usize) {
        let h = self.hidden;
        match (&self.weights, acc) {
            (Weights::Quantised { l0w, .. }, Accumulators::Quantised { white, black }) => {
                let target = if perspective == Color::White { white } else { black };
                let col = &l0w[feature * h..(feature + 1) * h];
                for (a, &w) in target.iter_mut().zip(col) {
                    *a += w as i32;
                }
            }
            (Weights::Float { l0w, .. }, Accumulators::Float { white, black }) => {
                let target = if perspective == Color::White { white } else { black };
                let col = &l0w[feature * h..(feature + 1) * h];
                for (a, &w) in target.iter_mut().zip(col) {
                    *a += w;
                }
            }
            _ => unreachable!("accumulator format does not match network format"),
        }
    }

    fn sub_column(&self, acc: &mut Accumulators, perspective: Color, feature: usize) {
        let h = self.hidden;
        match (&self.weights, acc) {
            (Weights::Quantised { l0w, .. }, Accumulators::Quantised { white, black }) => {
                let target = if perspective == Color::White { white } else { black };
                let col = &l0w[feature * h..(feature + 1) * h];
                for (a, &w) in target.iter_mut().zip(col) {
                    *a -= w as i32;
                }
            }
            (Weights::Float { l0w, .. }, Accumulators::Float { white, black }) => {
                let target = if perspective == Color::White { white } else { black };
                let col = &l0w[feature * h..(feature + 1) * h];
                for (a, &w) in target.iter_mut().zip(col) {
                    *a -= w;
                }
            }
            _ => unreachable!("accumulator format does not match network format"),
        }
    }
}

// ---------------------------------------------------------------------------
// EvalState & NnueDelta
// ---------------------------------------------------------------------------

enum Accumulators {
    Quantised { white: Vec<i32>, black: Vec<i32> },
    Float { white: Vec<f32>, black: Vec<f32> },
}

/// Mutable evaluation state: one accumulator per reference colour plus the
/// side to move, kept in lockstep with the search's make/unmake.
pub struct EvalState {
    acc: Accumulators,
    stm: Color,
}

/// Up to four feature indices (a move touches at most: mover off, victim off,
/// landing on, rook relocation).
#[derive(Clone, Copy, Debug, Default)]
struct FeatureSet {
    idx: [u16; 4],
    len: u8,
}

impl FeatureSet {
    fn push(&mut self, feature: usize) {
        debug_assert!((self.len as usize) < 4, "feature set overflow");
        self.idx[self.len as usize] = feature as u16;
        self.len += 1;
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.idx[..self.len as usize].iter().map(|&f| f as usize)
    }
}

/// Reversible accumulator change for one move.
#[derive(Clone, Copy, Debug)]
pub struct NnueDelta {
    add: [FeatureSet; 2],
    remove: [FeatureSet; 2],
    stm_before: Color,
}

// ---------------------------------------------------------------------------
// Feature transform and activations
// ---------------------------------------------------------------------------

/// Feature index for a piece from one perspective: plane 0-5 for own pieces,
/// 6-11 for the opponent's, times 64 squares, rank-flipped for Black.
#[inline]
fn feature_index(perspective: Color, piece_color: Color, piece: PieceType, sq: Square) -> usize {
    let plane = if piece_color == perspective { 0 } else { 6 } + piece.index();
    let normalized = if perspective == Color::Black {
        sq.flip_rank()
    } else {
        sq
    };
    plane * 64 + normalized.0 as usize
}

/// Square clipped ReLU on the quantised path: `clamp(x, 0, QA)^2`.
#[inline]
fn screlu_quantised(x: i32) -> i32 {
    let c = x.clamp(0, QA);
    c * c
}

/// Square clipped ReLU on the float path: `clamp(x, 0, 1)^2`.
#[inline]
fn screlu_float(x: f32) -> f32 {
    let c = x.clamp(0.0, 1.0);
    c * c
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::MoveFlag;

    /// Deterministic i16 generator for synthetic nets.
    fn xorshift(state: &mut u64) -> u64 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        x
    }

    /// Build a quantised net of width `h` with small pseudo-random weights.
    fn quantised_net_bytes(h: usize, seed: u64) -> Vec<u8> {
        let count = 1 + 771 * h;
        let mut state = seed;
        let mut bytes = Vec::with_capacity(count * 2);
        for _ in 0..count {
            let v = (xorshift(&mut state) % 129) as i16 - 64; // [-64, 64]
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Build a float net of width `h` with small pseudo-random weights.
    fn float_net_bytes(h: usize, seed: u64) -> Vec<u8> {
        let count = 1 + 771 * h;
        let mut state = seed;
        let mut bytes = Vec::with_capacity(count * 4);
        for _ in 0..count {
            let v = ((xorshift(&mut state) % 2001) as f32 - 1000.0) / 4000.0; // [-0.25, 0.25]
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn detects_quantised_format_and_width() {
        let net = Network::from_bytes(&quantised_net_bytes(16, 7)).unwrap();
        assert!(net.is_quantised());
        assert_eq!(net.hidden_size(), 16);
    }

    #[test]
    fn detects_float_format_and_width() {
        let net = Network::from_bytes(&float_net_bytes(8, 9)).unwrap();
        assert!(!net.is_quantised());
        assert_eq!(net.hidden_size(), 8);
    }

    #[test]
    fn rejects_garbage_sizes() {
        assert!(Network::from_bytes(&[]).is_err());
        assert!(Network::from_bytes(&[0u8; 7]).is_err());
        assert!(Network::from_bytes(&[0u8; 1000]).is_err());
    }

    #[test]
    fn feature_index_planes() {
        // White pawn on a1, White perspective: plane 0, square 0.
        assert_eq!(
            feature_index(Color::White, Color::White, PieceType::Pawn, Square(0)),
            0
        );
        // Same piece from Black's perspective: opponent plane 6, rank-flipped.
        assert_eq!(
            feature_index(Color::Black, Color::White, PieceType::Pawn, Square(0)),
            6 * 64 + 56
        );
        // Black king h8 from Black's perspective: own plane 5, flipped to h1.
        assert_eq!(
            feature_index(Color::Black, Color::Black, PieceType::King, Square(63)),
            5 * 64 + 7
        );
        assert!(
            (0..768).contains(&feature_index(
                Color::White,
                Color::Black,
                PieceType::Queen,
                Square(42)
            ))
        );
    }

    #[test]
    fn screlu_clamps_and_squares() {
        assert_eq!(screlu_quantised(-5), 0);
        assert_eq!(screlu_quantised(10), 100);
        assert_eq!(screlu_quantised(300), QA * QA);
        assert_eq!(screlu_float(-0.5), 0.0);
        assert_eq!(screlu_float(0.5), 0.25);
        assert_eq!(screlu_float(2.0), 1.0);
    }

    #[test]
    fn update_matches_init_after_one_move() {
        let net = Network::from_bytes(&quantised_net_bytes(32, 123)).unwrap();
        let mut pos = Position::startpos();
        let mut st = net.init_position(&pos);

        let mv = Move::new(
            Square::from_algebraic("e2").unwrap(),
            Square::from_algebraic("e4").unwrap(),
            MoveFlag::DoublePush,
        );
        let delta = net.update(&mut st, &pos, mv);
        let undo = pos.make_move(mv);

        assert_eq!(net.evaluate(&st), net.evaluate_position(&pos));

        pos.unmake_move(mv, &undo);
        net.revert(&mut st, &delta);
        assert_eq!(net.evaluate(&st), net.evaluate_position(&pos));
    }

    #[test]
    fn evaluate_is_stm_relative() {
        // Mirror-symmetric position: the score must be identical for both
        // sides to move (the perspectives swap exactly).
        let net = Network::from_bytes(&quantised_net_bytes(16, 55)).unwrap();
        let w = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let b = Position::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap();
        assert_eq!(net.evaluate_position(&w), net.evaluate_position(&b));
    }

    #[test]
    fn evaluation_stays_within_clamp() {
        let net = Network::from_bytes(&quantised_net_bytes(16, 99)).unwrap();
        let pos = Position::startpos();
        let cp = net.evaluate_position(&pos);
        assert!(cp.abs() <= EVAL_CLAMP);
    }
}
