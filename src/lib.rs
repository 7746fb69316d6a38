pub use chess;

pub mod board_utils;
pub mod config;
pub mod db;
pub mod error;
pub mod pgn;
pub mod pool;
pub mod reanalyze;
pub mod score;
pub mod stockfish;
