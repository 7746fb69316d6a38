//! Game reanalysis worker
//!
//! Re-analyzes historical games move-by-move with a local Stockfish,
//! persisting one evaluation record per move so each game is analyzed at
//! most once. Partially-analyzed games resume from the moves they already
//! have on record.

use anyhow::Context;
use tracing::info;

use reanalysis_worker::config::WorkerConfig;
use reanalysis_worker::stockfish::StockfishEngine;
use reanalysis_worker::{db, pgn, pool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let pgn_path = std::env::args()
        .nth(1)
        .context("Usage: reanalysis-worker <games.pgn>")?;

    let config = WorkerConfig::load()?;
    info!(
        stockfish_path = %config.stockfish_path,
        nodes = config.nodes_per_position,
        parallelism = config.parallelism,
        "Worker config loaded"
    );

    let pool_size = (config.parallelism + 2) as u32; // headroom for overlapping saves
    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    db::init_schema(&pg_pool).await?;
    info!(pool_size, "Database connection pool established");

    // Verify the engine binary before any work is dispatched
    let mut probe = StockfishEngine::new(&config.stockfish_path, &config.engine_options)
        .await
        .context("Stockfish startup check failed")?;
    probe.quit().await;
    info!("Stockfish ready");

    // PGN exports are frequently latin-1, so read bytes and convert lossily
    let raw = std::fs::read(&pgn_path).with_context(|| format!("Failed to read {pgn_path}"))?;
    let text = String::from_utf8_lossy(&raw);
    let working_set = pgn::load_working_set(&text);
    info!(games = working_set.len(), path = %pgn_path, "Working set loaded");

    pool::run(&pg_pool, &config, working_set).await
}
