//! Search: iterative deepening with aspiration windows over a negamax
//! alpha-beta core with null-window PVS, quiescence, a transposition table,
//! and killer/history move ordering.
//!
//! The search is single-threaded and cooperative: it polls the monotonic
//! clock and an external stop flag every 32 visited nodes and unwinds with a
//! bounded static-eval fallback once the hard budget expires. Only the
//! iterative-deepening loop consults the soft budget, between completed
//! depths.

pub mod ordering;
pub mod tt;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::engine::board::{Position, Undo};
use crate::engine::movegen::legal_moves;
use crate::engine::types::Move;
use crate::eval::{EvalState, Network, NnueDelta};
use ordering::{OrderingTables, order_moves};
use tt::{Bound, TranspositionTable};

/// Forced-mate score magnitude at the root.
pub const MATE: i32 = 30_000;
/// Window infinity; strictly outside every reachable score.
pub const INF: i32 = MATE + 1;
/// Maximum search depth / ply (killer table height, recursion cap).
pub const MAX_PLY: usize = 128;
/// Scores at or beyond this magnitude encode a forced mate.
pub const MATE_BOUND: i32 = MATE - 2 * MAX_PLY as i32;

/// Initial aspiration half-window in centipawns.
const ASPIRATION_DELTA: i32 = 200;
/// Once the half-window has widened past this, fall back to a full window.
const ASPIRATION_LIMIT: i32 = 2_000;

/// Score for the side to move being mated `ply` plies from the root.
#[inline]
pub fn mated_in(ply: i32) -> i32 {
    ply - MATE
}

/// Score for delivering mate `ply` plies from the root.
#[inline]
pub fn mate_in(ply: i32) -> i32 {
    MATE - ply
}

/// Is this score a forced mate (for either side)?
#[inline]
pub fn is_mate_score(score: i32) -> bool {
    score.abs() >= MATE_BOUND
}

// ---------------------------------------------------------------------------
// Limits & results
// ---------------------------------------------------------------------------

/// Bounds for one search call.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_depth: u32,
    /// Do not start a new iteration after this much elapsed time.
    pub soft: Option<Duration>,
    /// Abort the search as soon as this much time has elapsed.
    pub hard: Option<Duration>,
}

impl SearchLimits {
    /// Fixed-depth search without time limits.
    pub fn depth(max_depth: u32) -> Self {
        SearchLimits {
            max_depth,
            soft: None,
            hard: None,
        }
    }

    /// Iterative deepening under millisecond budgets.
    pub fn timed(max_depth: u32, soft_ms: u64, hard_ms: u64) -> Self {
        SearchLimits {
            max_depth,
            soft: Some(Duration::from_millis(soft_ms)),
            hard: Some(Duration::from_millis(hard_ms)),
        }
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    /// Best move of the deepest completed iteration; `None` only when the
    /// root has no legal move.
    pub best_move: Option<Move>,
    /// Score of `best_move` in centipawns (or a mate score).
    pub score: i32,
    /// Deepest fully completed iteration.
    pub depth: u32,
    /// Nodes visited across all iterations.
    pub nodes: u64,
}

// ---------------------------------------------------------------------------
// Searcher
// ---------------------------------------------------------------------------

/// Owns all mutable search state: transposition table, ordering heuristics,
/// NNUE accumulators, node counter, clock and stop flag.
pub struct Searcher {
    tt: TranspositionTable,
    ordering: OrderingTables,
    network: Arc<Network>,
    eval: EvalState,

    nodes: u64,
    start: Instant,
    soft: Option<Duration>,
    hard: Option<Duration>,
    aborted: bool,
    stop: Arc<AtomicBool>,

    /// Emit UCI `info` lines after each completed depth.
    pub uci_info: bool,
}

impl Searcher {
    pub fn new(network: Arc<Network>, config: &EngineConfig) -> Self {
        let eval = network.init_position(&Position::startpos());
        Searcher {
            tt: TranspositionTable::new(config.tt_log2),
            ordering: OrderingTables::new(),
            network,
            eval,
            nodes: 0,
            start: Instant::now(),
            soft: None,
            hard: None,
            aborted: false,
            stop: Arc::new(AtomicBool::new(false)),
            uci_info: false,
        }
    }

    /// Shared handle to the cooperative stop flag.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Request cooperative cancellation of the running search.
    pub fn stop(&self) {
        self.stop.store(true, AtomicOrdering::Relaxed);
    }

    /// Re-arm after a `stop` so the next search runs.
    pub fn reset_stop(&self) {
        self.stop.store(false, AtomicOrdering::Relaxed);
    }

    /// Reset the transposition table (new game, adversarial test runs).
    pub fn tt_clear(&mut self) {
        self.tt.clear();
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Fixed-depth best move, no time limit.
    pub fn search_best_move(&mut self, pos: &mut Position, depth: u32) -> Option<Move> {
        self.search(pos, SearchLimits::depth(depth)).best_move
    }

    /// Iterative deepening under (soft, hard) millisecond budgets.
    pub fn search_best_move_timed(
        &mut self,
        pos: &mut Position,
        max_depth: u32,
        soft_ms: u64,
        hard_ms: u64,
    ) -> Option<Move> {
        self.search(pos, SearchLimits::timed(max_depth, soft_ms, hard_ms))
            .best_move
    }

    /// Run a search under `limits` and return the full result.
    pub fn search(&mut self, pos: &mut Position, limits: SearchLimits) -> SearchResult {
        self.nodes = 0;
        self.aborted = false;
        self.start = Instant::now();
        self.soft = limits.soft;
        self.hard = limits.hard;
        self.ordering.reset();
        self.eval = self.network.init_position(pos);

        let root_moves = legal_moves(pos);
        if root_moves.is_empty() {
            // Checkmate or stalemate at the root is an outcome, not an error.
            let score = if pos.in_check() { mated_in(0) } else { 0 };
            return SearchResult {
                best_move: None,
                score,
                depth: 0,
                nodes: 0,
            };
        }

        let mut result = SearchResult {
            best_move: Some(root_moves[0]),
            score: -INF,
            depth: 0,
            nodes: 0,
        };

        let mut prev_score = 0;
        for depth in 1..=limits.max_depth.min(MAX_PLY as u32) {
            self.check_abort();
            if self.aborted {
                break;
            }

            let (score, best) = self.aspiration_root(pos, depth as i32, prev_score);

            if self.aborted {
                // Partial iteration: adopt its move only if nothing completed.
                if result.depth == 0
                    && let Some(mv) = best
                {
                    result.best_move = Some(mv);
                    result.score = score;
                }
                break;
            }

            if let Some(mv) = best {
                result.best_move = Some(mv);
                result.score = score;
                result.depth = depth;
            }
            prev_score = score;
            result.nodes = self.nodes;
            self.report(depth, score, result.best_move);

            if self.past_soft() {
                break;
            }
        }

        result.nodes = self.nodes;
        result
    }

    // -----------------------------------------------------------------------
    // Aspiration window driver
    // -----------------------------------------------------------------------

    /// Search the root at `depth`. From depth 2 onward the window is seeded
    /// around the previous score and widened (doubling) on fail-low or
    /// fail-high, falling back to the full window once it grows past the
    /// aspiration limit.
    fn aspiration_root(&mut self, pos: &mut Position, depth: i32, prev: i32) -> (i32, Option<Move>) {
        if depth == 1 {
            return self.search_root(pos, depth, -MATE, MATE);
        }

        let mut delta = ASPIRATION_DELTA;
        let mut alpha = (prev - delta).max(-MATE);
        let mut beta = (prev + delta).min(MATE);

        loop {
            let (score, best) = self.search_root(pos, depth, alpha, beta);
            if self.aborted {
                return (score, best);
            }

            if score <= alpha {
                delta = delta.saturating_mul(2);
                alpha = if delta > ASPIRATION_LIMIT {
                    -MATE
                } else {
                    (score - delta).max(-MATE)
                };
            } else if score >= beta {
                delta = delta.saturating_mul(2);
                beta = if delta > ASPIRATION_LIMIT {
                    MATE
                } else {
                    (score + delta).min(MATE)
                };
            } else {
                return (score, best);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Root node
    // -----------------------------------------------------------------------

    fn search_root(
        &mut self,
        pos: &mut Position,
        depth: i32,
        mut alpha: i32,
        beta: i32,
    ) -> (i32, Option<Move>) {
        let orig_alpha = alpha;
        let us = pos.side_to_move;

        let mut moves = legal_moves(pos);
        let hint = self.tt.probe(pos.zkey, depth, 0, alpha, beta).best_move;
        order_moves(pos, &mut moves, hint, 0, &self.ordering);

        let mut best = -INF;
        let mut best_move = None;

        for (i, &mv) in moves.iter().enumerate() {
            let (undo, delta) = self.make(pos, mv);
            let score = if i == 0 {
                -self.negamax(pos, depth - 1, 1, -beta, -alpha)
            } else {
                let mut s = -self.negamax(pos, depth - 1, 1, -alpha - 1, -alpha);
                if s > alpha && s < beta {
                    s = -self.negamax(pos, depth - 1, 1, -beta, -alpha);
                }
                s
            };
            self.unmake(pos, mv, &undo, &delta);

            if self.aborted {
                break;
            }

            if score > best {
                best = score;
                best_move = Some(mv);
            }
            if score > alpha {
                alpha = score;
            }
            if alpha >= beta {
                if mv.is_quiet() {
                    self.ordering.on_beta_cutoff(mv, us, depth, 0);
                }
                break;
            }
        }

        if !self.aborted && let Some(mv) = best_move {
            let bound = if best <= orig_alpha {
                Bound::Upper
            } else if best >= beta {
                Bound::Lower
            } else {
                Bound::Exact
            };
            self.tt.store(pos.zkey, mv, best, depth, bound, 0);
        }

        (best, best_move)
    }

    // -----------------------------------------------------------------------
    // Negamax
    // -----------------------------------------------------------------------

    fn negamax(&mut self, pos: &mut Position, depth: i32, ply: i32, mut alpha: i32, beta: i32) -> i32 {
        self.nodes += 1;
        if self.nodes & 31 == 0 {
            self.check_abort();
        }
        if self.aborted {
            // Out of time: bounded static-eval fallback while unwinding.
            return self.static_eval();
        }

        let orig_alpha = alpha;
        let us = pos.side_to_move;

        // Transposition probe: immediate cut when usable, ordering hint
        // otherwise.
        let probe = self.tt.probe(pos.zkey, depth, ply, alpha, beta);
        if let Some(score) = probe.score {
            return score;
        }
        let tt_move = probe.best_move;

        // 50-move rule.
        if pos.halfmove_clock >= 100 {
            return 0;
        }

        if ply as usize >= MAX_PLY {
            return self.static_eval();
        }

        if depth == 0 {
            return self.quiescence(pos, ply, alpha, beta);
        }

        let mut moves = legal_moves(pos);
        if moves.is_empty() {
            let score = if pos.in_check() { mated_in(ply) } else { 0 };
            self.tt.store(pos.zkey, Move::NULL, score, depth, Bound::Exact, ply);
            return score;
        }

        order_moves(pos, &mut moves, tt_move, ply as usize, &self.ordering);

        let mut best = -INF;
        let mut best_move = moves[0];

        for (i, &mv) in moves.iter().enumerate() {
            let (undo, delta) = self.make(pos, mv);
            let score = if i == 0 {
                // Principal variation: full window.
                -self.negamax(pos, depth - 1, ply + 1, -beta, -alpha)
            } else {
                // Scout with a null window; re-search on an improvement.
                let mut s = -self.negamax(pos, depth - 1, ply + 1, -alpha - 1, -alpha);
                if s > alpha && s < beta {
                    s = -self.negamax(pos, depth - 1, ply + 1, -beta, -alpha);
                }
                s
            };
            self.unmake(pos, mv, &undo, &delta);

            if self.aborted {
                return best.max(score);
            }

            if score > best {
                best = score;
                best_move = mv;
            }
            if score > alpha {
                alpha = score;
            }
            if alpha >= beta {
                if mv.is_quiet() {
                    self.ordering.on_beta_cutoff(mv, us, depth, ply as usize);
                }
                break;
            }
        }

        let bound = if best <= orig_alpha {
            Bound::Upper
        } else if best >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.tt.store(pos.zkey, best_move, best, depth, bound, ply);

        best
    }

    // -----------------------------------------------------------------------
    // Quiescence
    // -----------------------------------------------------------------------

    fn quiescence(&mut self, pos: &mut Position, ply: i32, mut alpha: i32, beta: i32) -> i32 {
        self.nodes += 1;
        if self.nodes & 31 == 0 {
            self.check_abort();
        }
        if self.aborted {
            return self.static_eval();
        }

        if ply as usize >= MAX_PLY {
            return self.static_eval();
        }

        // In check there is no stand-pat: every evasion is searched.
        if pos.in_check() {
            let mut moves = legal_moves(pos);
            if moves.is_empty() {
                return mated_in(ply);
            }
            order_moves(pos, &mut moves, Move::NULL, ply as usize, &self.ordering);

            let mut best = -INF;
            for &mv in &moves {
                let (undo, delta) = self.make(pos, mv);
                let score = -self.quiescence(pos, ply + 1, -beta, -alpha);
                self.unmake(pos, mv, &undo, &delta);

                if self.aborted {
                    return best.max(score);
                }
                if score > best {
                    best = score;
                }
                if score > alpha {
                    alpha = score;
                }
                if alpha >= beta {
                    break;
                }
            }
            return best;
        }

        // Stand pat on the static evaluation.
        let stand = self.static_eval();
        if stand >= beta {
            return beta;
        }
        if stand > alpha {
            alpha = stand;
        }

        // Only captures and promotions beyond this point.
        let mut moves: Vec<Move> = legal_moves(pos)
            .into_iter()
            .filter(|m| m.flag().is_capture() || m.flag().is_promotion())
            .collect();
        order_moves(pos, &mut moves, Move::NULL, ply as usize, &self.ordering);

        for &mv in &moves {
            let (undo, delta) = self.make(pos, mv);
            let score = -self.quiescence(pos, ply + 1, -beta, -alpha);
            self.unmake(pos, mv, &undo, &delta);

            if self.aborted {
                return alpha;
            }
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Make a move with the NNUE accumulators kept in lockstep.
    #[inline]
    fn make(&mut self, pos: &mut Position, mv: Move) -> (Undo, NnueDelta) {
        let delta = self.network.update(&mut self.eval, pos, mv);
        (pos.make_move(mv), delta)
    }

    #[inline]
    fn unmake(&mut self, pos: &mut Position, mv: Move, undo: &Undo, delta: &NnueDelta) {
        pos.unmake_move(mv, undo);
        self.network.revert(&mut self.eval, delta);
    }

    /// Static evaluation of the current accumulators, side-to-move relative.
    #[inline]
    fn static_eval(&self) -> i32 {
        self.network.evaluate(&self.eval)
    }

    /// Poll the stop flag and the hard deadline.
    fn check_abort(&mut self) {
        if self.aborted {
            return;
        }
        if self.stop.load(AtomicOrdering::Relaxed) {
            self.aborted = true;
            return;
        }
        if let Some(hard) = self.hard
            && self.start.elapsed() >= hard
        {
            self.aborted = true;
        }
    }

    fn past_soft(&self) -> bool {
        self.soft.is_some_and(|d| self.start.elapsed() >= d)
    }

    /// One line per completed depth: UCI `info` on stdout when wired to the
    /// protocol shell, a tracing event always.
    fn report(&self, depth: u32, score: i32, best: Option<Move>) {
        let ms = self.start.elapsed().as_millis() as u64;
        let nps = if ms > 0 { self.nodes * 1000 / ms } else { 0 };
        let pv = best.map_or_else(|| "0000".to_string(), |m| m.to_uci());
        let score_str = if is_mate_score(score) {
            let moves = (MATE - score.abs() + 1) / 2;
            format!("mate {}", if score > 0 { moves } else { -moves })
        } else {
            format!("cp {score}")
        };

        if self.uci_info {
            println!(
                "info depth {depth} score {score_str} time {ms} nodes {} nps {nps} pv {pv}",
                self.nodes
            );
        }
        tracing::debug!(depth, score, time_ms = ms, nodes = self.nodes, nps, pv = %pv, "depth complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_helpers() {
        assert_eq!(mated_in(0), -MATE);
        assert_eq!(mate_in(1), MATE - 1);
        assert!(is_mate_score(mate_in(4)));
        assert!(is_mate_score(mated_in(7)));
        assert!(!is_mate_score(0));
        assert!(!is_mate_score(19_999));
    }

    #[test]
    fn limits_constructors() {
        let d = SearchLimits::depth(6);
        assert_eq!(d.max_depth, 6);
        assert!(d.soft.is_none() && d.hard.is_none());

        let t = SearchLimits::timed(64, 100, 250);
        assert_eq!(t.soft, Some(Duration::from_millis(100)));
        assert_eq!(t.hard, Some(Duration::from_millis(250)));
    }
}
