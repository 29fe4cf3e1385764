//! Search behaviour scenarios: mates, draws, terminal positions, and time
//! budgets. All tests run on a small synthetic network — mate detection and
//! draw scores come from the search itself, not from learned weights.

use quartz::config::EngineConfig;
use quartz::engine::board::Position;
use quartz::engine::movegen::legal_moves;
use quartz::eval::Network;
use quartz::search::{MATE, SearchLimits, Searcher, is_mate_score, mated_in};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hand-built quantised net (H = 1) that counts material.
///
/// Each own-piece plane feeds the single hidden unit its piece value, so the
/// accumulator holds the side's total material (well under the QA clamp).
/// With output weights (+w, -w) the score is monotone in the material
/// difference, which is enough for the tactical assertions below; mate and
/// draw scores come from the search itself.
fn test_network() -> Arc<Network> {
    let h = 1;
    let values: [i16; 6] = [5, 15, 16, 25, 45, 0]; // P N B R Q K
    let mut vals: Vec<i16> = Vec::with_capacity(1 + 771 * h);
    // L0: planes 0-5 are own pieces, 6-11 the opponent's.
    for plane in 0..12 {
        let v = if plane < 6 { values[plane] } else { 0 };
        for _sq in 0..64 {
            vals.push(v);
        }
    }
    vals.push(0); // L0 bias
    vals.extend_from_slice(&[64, -64]); // L1: stm half positive, ntm negative
    vals.push(0); // L1 bias
    let bytes: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
    Arc::new(Network::from_bytes(&bytes).unwrap())
}

fn searcher() -> Searcher {
    let config = EngineConfig {
        tt_log2: 16,
        ..EngineConfig::default()
    };
    Searcher::new(test_network(), &config)
}

fn pos(fen: &str) -> Position {
    Position::from_fen(fen).unwrap()
}

// =====================================================================
// Mate detection
// =====================================================================

#[test]
fn finds_mate_in_one_for_white() {
    // Scholar's mate pattern: Qxf7# is the only mating move.
    let mut p = pos("r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(2));
    assert_eq!(result.best_move.map(|m| m.to_uci()), Some("h5f7".into()));
    assert_eq!(result.score, MATE - 1, "mate in one scores MATE - 1");
}

#[test]
fn finds_mate_in_one_for_black() {
    // Fool's mate: Qh4# ends it.
    let mut p = pos("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq g3 0 2");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(3));
    assert_eq!(result.best_move.map(|m| m.to_uci()), Some("d8h4".into()));
    assert!(is_mate_score(result.score));
}

#[test]
fn prefers_faster_mate() {
    // Back-rank ladder: Ra8# now rather than any slower mate.
    let mut p = pos("6k1/5ppp/8/8/8/8/R7/R5K1 w - - 0 1");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(4));
    assert_eq!(result.score, MATE - 1, "should find the immediate mate");
    assert_eq!(result.best_move.map(|m| m.to_uci()), Some("a2a8".into()));
}

#[test]
fn queen_endgame_returns_legal_queen_or_king_move() {
    // KQ vs K with distant kings: no immediate mate, but a legal move and a
    // non-mate score are required.
    let mut p = pos("4k3/8/8/8/8/8/4Q3/4K3 w - - 0 1");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(2));
    let mv = result.best_move.expect("a legal move exists");
    assert!(
        legal_moves(&mut p).contains(&mv),
        "search must return a legal move"
    );
}

// =====================================================================
// Terminal positions at the root
// =====================================================================

#[test]
fn checkmated_root_reports_mate_score_and_no_move() {
    // Fool's mate delivered: White has no legal move and is in check.
    let mut p = pos("rnb1kbnr/pppp1ppp/4p3/8/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
    assert!(legal_moves(&mut p).is_empty());
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(3));
    assert_eq!(result.best_move, None);
    assert_eq!(result.score, mated_in(0));
}

#[test]
fn stalemated_root_reports_draw_and_no_move() {
    let mut p = pos("k7/8/KQ6/8/8/8/8/8 b - - 0 1");
    assert!(legal_moves(&mut p).is_empty());
    assert!(!p.in_check());
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(3));
    assert_eq!(result.best_move, None);
    assert_eq!(result.score, 0);
}

#[test]
fn halfmove_clock_at_100_scores_draw_but_still_moves() {
    // Bare shuffling position with the 50-move counter exhausted: every
    // line is a draw, yet a legal move must still come back.
    let mut p = pos("7k/8/8/8/8/8/R7/K7 w - - 100 1");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(3));
    let mv = result.best_move.expect("a legal move must be produced");
    assert!(legal_moves(&mut p).contains(&mv));
    assert_eq!(result.score, 0, "everything is a draw at clock 100");
}

// =====================================================================
// Tactics
// =====================================================================

#[test]
fn captures_hanging_rook() {
    let mut p = pos("4k3/8/8/3r4/8/8/3Q4/4K3 w - - 0 1");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(4));
    assert_eq!(
        result.best_move.map(|m| m.to_uci()),
        Some("d2d5".into()),
        "the undefended rook should be taken"
    );
}

#[test]
fn fixed_depth_returns_legal_moves_everywhere() {
    for fen in [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    ] {
        let mut p = pos(fen);
        let mut s = searcher();
        let mv = s.search_best_move(&mut p, 3).expect("legal move exists");
        assert!(legal_moves(&mut p).contains(&mv), "illegal move from {fen}");
        assert_eq!(p.to_fen(), fen, "search must restore the position");
    }
}

// =====================================================================
// Time control & cancellation
// =====================================================================

#[test]
fn timed_search_respects_hard_budget() {
    let mut p = pos("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
    let mut s = searcher();
    let start = Instant::now();
    let mv = s.search_best_move_timed(&mut p, 64, 80, 150);
    let elapsed = start.elapsed();
    assert!(mv.is_some());
    // Generous envelope: the hard wall is 150ms plus one poll interval.
    assert!(
        elapsed < Duration::from_millis(2_000),
        "search overran its hard budget: {elapsed:?}"
    );
}

#[test]
fn stop_flag_aborts_and_still_yields_a_move() {
    let mut p = Position::startpos();
    let mut s = searcher();
    s.stop();
    let result = s.search(&mut p, SearchLimits::depth(6));
    let mv = result.best_move.expect("fallback move expected");
    assert!(legal_moves(&mut p).contains(&mv));

    // After re-arming, the search runs to completion again.
    s.reset_stop();
    let result = s.search(&mut p, SearchLimits::depth(3));
    assert_eq!(result.depth, 3);
}

#[test]
fn deeper_search_does_not_regress_mate_found_earlier() {
    // TT reuse across iterations must not corrupt mate scores.
    let mut p = pos("r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4");
    let mut s = searcher();
    let result = s.search(&mut p, SearchLimits::depth(5));
    assert_eq!(result.best_move.map(|m| m.to_uci()), Some("h5f7".into()));
    assert_eq!(result.score, MATE - 1);
}

#[test]
fn tt_clear_between_games_is_safe() {
    let mut p = Position::startpos();
    let mut s = searcher();
    let first = s.search(&mut p, SearchLimits::depth(3));
    s.tt_clear();
    let second = s.search(&mut p, SearchLimits::depth(3));
    assert_eq!(first.best_move, second.best_move, "deterministic after clear");
    assert_eq!(first.score, second.score);
}
