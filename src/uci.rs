//! UCI protocol shell.
//!
//! A thin, blocking text loop around the engine core. A dedicated thread
//! reads stdin and forwards complete lines over a channel; on `stop` or
//! `quit` it flips the searcher's stop flag directly, so a running
//! (single-threaded, cooperative) search notices within a few dozen nodes.
//!
//! Supported commands: `uci`, `isready`, `ucinewgame`, `position`
//! (`startpos`/`fen`, optional `moves`), `go` (`depth`, `movetime`,
//! `wtime`/`btime`/`winc`/`binc`, `infinite`, plus `perft`/`divide`
//! subcommands), `stop`, `quit`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};

use crate::config::EngineConfig;
use crate::engine::board::Position;
use crate::engine::movegen::legal_moves;
use crate::engine::perft::{perft, perft_divide};
use crate::engine::types::{Color, Move};
use crate::eval::Network;
use crate::search::{MAX_PLY, SearchLimits, Searcher};

const NAME: &str = concat!("quartz ", env!("CARGO_PKG_VERSION"));

/// Run the UCI loop until `quit` or stdin EOF.
pub fn run(config: EngineConfig) -> Result<()> {
    let mut engine = UciEngine::new(config)?;
    engine.run_loop()
}

struct UciEngine {
    pos: Position,
    searcher: Option<Searcher>,
    config: EngineConfig,
}

impl UciEngine {
    fn new(config: EngineConfig) -> Result<Self> {
        let searcher = match &config.net_path {
            Some(path) => {
                let network = Network::load(path)
                    .with_context(|| format!("loading NNUE network from '{path}'"))?;
                let mut searcher = Searcher::new(Arc::new(network), &config);
                searcher.uci_info = true;
                Some(searcher)
            }
            None => {
                tracing::warn!("no network configured (QUARTZ_NET); search disabled");
                None
            }
        };

        Ok(UciEngine {
            pos: Position::startpos(),
            searcher,
            config,
        })
    }

    fn run_loop(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<String>();
        let stop = self
            .searcher
            .as_ref()
            .map(Searcher::stop_handle)
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

        // Input thread: forwards lines, flips the stop flag out-of-band so a
        // blocking search can be interrupted.
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let trimmed = line.trim().to_string();
                if trimmed == "stop" || trimmed == "quit" {
                    stop.store(true, Ordering::Relaxed);
                }
                let quitting = trimmed == "quit";
                if tx.send(trimmed).is_err() || quitting {
                    break;
                }
            }
        });

        self.greet();

        for line in rx {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.first().copied() {
                Some("uci") => self.greet(),
                Some("isready") => println!("readyok"),
                Some("ucinewgame") => self.new_game(),
                Some("position") => self.cmd_position(&tokens[1..]),
                Some("go") => self.cmd_go(&tokens[1..]),
                Some("stop") => {
                    // The flag was already flipped by the input thread; the
                    // search (if any) has returned by the time we get here.
                    if let Some(s) = &self.searcher {
                        s.reset_stop();
                    }
                }
                Some("quit") => break,
                Some(other) => tracing::debug!(command = other, "ignoring unknown command"),
                None => {}
            }
        }

        Ok(())
    }

    fn greet(&self) {
        println!("id name {NAME}");
        println!("id author quartz contributors");
        println!("uciok");
    }

    fn new_game(&mut self) {
        self.pos = Position::startpos();
        if let Some(s) = &mut self.searcher {
            s.tt_clear();
        }
    }

    // -----------------------------------------------------------------------
    // position
    // -----------------------------------------------------------------------

    fn cmd_position(&mut self, tokens: &[&str]) {
        let mut rest = tokens;
        let pos = match rest.first().copied() {
            Some("startpos") => {
                rest = &rest[1..];
                Position::startpos()
            }
            Some("fen") if rest.len() >= 7 => {
                let fen = rest[1..7].join(" ");
                rest = &rest[7..];
                match Position::from_fen(&fen) {
                    Ok(p) => p,
                    Err(e) => {
                        println!("info string error: {e}");
                        return;
                    }
                }
            }
            _ => {
                println!("info string error: position needs 'startpos' or 'fen <6 fields>'");
                return;
            }
        };

        self.pos = pos;

        if rest.first().copied() == Some("moves") {
            for uci in &rest[1..] {
                if !self.apply_uci_move(uci) {
                    println!("info string warning: illegal/unknown move {uci}");
                    break;
                }
            }
        }
    }

    /// Apply a move in UCI notation by matching it against the legal move
    /// list of the current position.
    fn apply_uci_move(&mut self, uci: &str) -> bool {
        let mv = find_uci_move(&mut self.pos, uci);
        match mv {
            Some(mv) => {
                let _ = self.pos.make_move(mv);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // go
    // -----------------------------------------------------------------------

    fn cmd_go(&mut self, tokens: &[&str]) {
        // Perft subcommands run without a network.
        if let Some(ix) = tokens.iter().position(|&t| t == "perft") {
            let depth = tokens.get(ix + 1).and_then(|d| d.parse().ok()).unwrap_or(1);
            let nodes = perft(&mut self.pos, depth);
            println!("info string perft {depth} nodes {nodes}");
            println!("bestmove 0000");
            return;
        }
        if let Some(ix) = tokens.iter().position(|&t| t == "divide") {
            let depth = tokens.get(ix + 1).and_then(|d| d.parse().ok()).unwrap_or(1);
            let parts = perft_divide(&mut self.pos, depth);
            let mut total = 0u64;
            for (mv, nodes) in parts {
                println!("{}: {nodes}", mv.to_uci());
                total += nodes;
            }
            println!("Total: {total}");
            println!("bestmove 0000");
            return;
        }

        let Some(searcher) = &mut self.searcher else {
            println!("info string error: no network loaded, cannot search");
            println!("bestmove 0000");
            return;
        };

        let limits = parse_go_limits(tokens, self.pos.side_to_move, self.config.move_overhead_ms);
        searcher.reset_stop();
        let result = searcher.search(&mut self.pos, limits);
        match result.best_move {
            Some(mv) => println!("bestmove {}", mv.to_uci()),
            None => println!("bestmove 0000"),
        }
    }
}

/// Find the legal move matching a UCI string at the current position.
pub fn find_uci_move(pos: &mut Position, uci: &str) -> Option<Move> {
    legal_moves(pos).into_iter().find(|m| m.to_uci() == uci)
}

/// Translate `go` arguments into search limits.
///
/// `movetime` fixes both budgets. With clock times, the soft budget is
/// remaining/20 + increment/2 and the hard budget remaining/5 + increment/2,
/// capped below the remaining clock. `infinite` (or no time tokens) searches
/// without a time limit.
fn parse_go_limits(tokens: &[&str], stm: Color, overhead_ms: u64) -> SearchLimits {
    let mut depth: Option<u32> = None;
    let mut movetime: Option<u64> = None;
    let mut wtime: Option<u64> = None;
    let mut btime: Option<u64> = None;
    let mut winc: Option<u64> = None;
    let mut binc: Option<u64> = None;

    let mut i = 0;
    while i < tokens.len() {
        let value = tokens.get(i + 1).and_then(|v| v.parse::<u64>().ok());
        match tokens[i] {
            "depth" => depth = value.map(|d| d as u32),
            "movetime" => movetime = value,
            "wtime" => wtime = value,
            "btime" => btime = value,
            "winc" => winc = value,
            "binc" => binc = value,
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    let max_depth = depth.unwrap_or(MAX_PLY as u32);

    if let Some(mt) = movetime {
        let ms = mt.saturating_sub(overhead_ms).max(1);
        return SearchLimits::timed(max_depth, ms, ms);
    }

    let (time, inc) = match stm {
        Color::White => (wtime, winc),
        Color::Black => (btime, binc),
    };

    if let Some(time) = time {
        let inc = inc.unwrap_or(0);
        let soft = (time / 20 + inc / 2).max(1);
        let hard = (time / 5 + inc / 2)
            .min(time.saturating_sub(overhead_ms))
            .max(1);
        return SearchLimits::timed(max_depth, soft.min(hard), hard);
    }

    // `infinite`, bare `go`, or plain `depth N`.
    SearchLimits::depth(max_depth)
}
