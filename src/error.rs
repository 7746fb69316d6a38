//! Worker error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    /// The engine answered but the evaluation payload was unusable.
    /// Transient: retried in place with the same position and budget.
    #[error("Malformed engine evaluation")]
    MalformedEval,

    /// Retry ceiling for malformed evaluations was exhausted.
    #[error("Engine unstable: {attempts} consecutive malformed evaluations")]
    EngineUnstable { attempts: u32 },

    #[error("Move resolution error: {0}")]
    Analysis(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
