//! Worker configuration from environment variables

use std::env;

use serde_json::{Map, Value};

use crate::error::WorkerError;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Database connection URL
    pub database_url: String,

    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Node budget per engine analysis call
    pub nodes_per_position: u32,

    /// Number of games analyzed concurrently
    pub parallelism: usize,

    /// UCI options applied verbatim at engine startup (e.g. Hash, Threads)
    pub engine_options: Map<String, Value>,

    /// Malformed-evaluation retries per move before giving up on the game
    pub max_engine_retries: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| WorkerError::Config("DATABASE_URL not set"))?;

        let stockfish_path = env::var("STOCKFISH_PATH")
            .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string());

        let nodes_per_position = env::var("NODES_PER_POSITION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4_000_000);

        let parallelism = env::var("PARALLELISM")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&p| p > 0)
            .unwrap_or_else(num_cpus::get);

        let engine_options = match env::var("ENGINE_OPTIONS") {
            Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(WorkerError::Config("ENGINE_OPTIONS must be a JSON object")),
            },
            Err(_) => default_engine_options(),
        };

        let max_engine_retries = env::var("MAX_ENGINE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(5);

        Ok(Self {
            database_url,
            stockfish_path,
            nodes_per_position,
            parallelism,
            engine_options,
            max_engine_retries,
        })
    }
}

fn default_engine_options() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("Threads".into(), Value::from(1));
    map.insert("Hash".into(), Value::from(256));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_cover_threads_and_hash() {
        let opts = default_engine_options();
        assert_eq!(opts.get("Threads"), Some(&Value::from(1)));
        assert_eq!(opts.get("Hash"), Some(&Value::from(256)));
    }
}
