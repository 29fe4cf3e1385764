pub mod attacks;
pub mod board;
pub mod movegen;
pub mod perft;
pub mod types;
pub mod zobrist;

pub use board::{Position, Undo};
pub use movegen::{legal_moves, pseudo_legal_moves};
pub use perft::{perft, perft_divide};
pub use types::*;
