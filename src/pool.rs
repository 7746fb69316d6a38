//! Work deduplication and the worker pool.
//!
//! Games are fully independent: the work set is split once up front and each
//! worker owns whole games, a private engine process per game, and nothing
//! else. The only cross-worker resource is the database, serialized behind
//! one metadata lock held inside the per-game pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::db;
use crate::pgn::RawGame;
use crate::reanalyze;
use crate::stockfish::StockfishEngine;

/// Candidate game ids minus those already marked fully analyzed.
///
/// A race with a concurrent writer marking a game analyzed is benign: a
/// double-dispatched game only re-checks per-move keys, and idempotent move
/// creation absorbs the rest.
pub fn residual_work(
    candidates: &HashMap<String, RawGame>,
    analyzed: &HashSet<String>,
) -> Vec<String> {
    candidates
        .keys()
        .filter(|id| !analyzed.contains(*id))
        .cloned()
        .collect()
}

/// Dispatch one reanalysis per residual game across `parallelism` workers
/// and block until every dispatched game completes.
///
/// Failed games are logged and left not-fully-analyzed; the next run picks
/// them up again through the dedup step.
pub async fn run(
    pg_pool: &PgPool,
    config: &WorkerConfig,
    working_set: HashMap<String, RawGame>,
) -> anyhow::Result<()> {
    let analyzed = db::analyzed_game_ids(pg_pool).await?;
    let residual = residual_work(&working_set, &analyzed);
    info!(
        skipped = working_set.len() - residual.len(),
        "Skipping already-processed games"
    );

    let total_moves: usize = residual
        .iter()
        .filter_map(|id| working_set.get(id))
        .map(|g| g.moves.len())
        .sum();
    info!(
        games = residual.len(),
        total_moves,
        parallelism = config.parallelism,
        "Starting worker pool"
    );

    let semaphore = Arc::new(Semaphore::new(config.parallelism));
    let meta_lock = Arc::new(Mutex::new(()));
    let mut handles = Vec::with_capacity(residual.len());

    for id in residual {
        let Some(game) = working_set.get(&id).cloned() else {
            continue;
        };
        let permit = semaphore.clone().acquire_owned().await?;
        let pg_pool = pg_pool.clone();
        let meta_lock = meta_lock.clone();
        let config = config.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit; // Hold until done

            // One private engine per game, torn down when the game finishes
            let mut engine =
                match StockfishEngine::new(&config.stockfish_path, &config.engine_options).await {
                    Ok(engine) => engine,
                    Err(e) => {
                        error!(game_id = %game.id, error = %e, "Engine spawn failed");
                        return;
                    }
                };

            match reanalyze::reanalyze_game(&mut engine, &pg_pool, &meta_lock, &config, &game)
                .await
            {
                Ok(()) => info!(game_id = %game.id, "Analysis complete"),
                Err(e) => {
                    error!(game_id = %game.id, error = %e, "Analysis failed, game left incomplete")
                }
            }

            engine.quit().await;
        }));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: &str) -> RawGame {
        RawGame {
            id: id.to_string(),
            white: "alice".into(),
            black: "bob".into(),
            moves: vec!["e4".into(), "e5".into()],
        }
    }

    #[test]
    fn residual_is_the_set_difference() {
        let candidates: HashMap<String, RawGame> = (0..10)
            .map(|i| (format!("game000{i}"), game(&format!("game000{i}"))))
            .collect();
        let analyzed: HashSet<String> =
            ["game0001", "game0003", "game0005", "game0007"]
                .iter()
                .map(|s| s.to_string())
                .collect();

        let mut residual = residual_work(&candidates, &analyzed);
        residual.sort();
        assert_eq!(
            residual,
            vec![
                "game0000", "game0002", "game0004", "game0006", "game0008", "game0009"
            ]
        );
    }

    #[test]
    fn unknown_analyzed_ids_are_ignored() {
        let candidates: HashMap<String, RawGame> =
            [("game0000".to_string(), game("game0000"))].into();
        let analyzed: HashSet<String> = ["gameFFFF".to_string()].into();
        assert_eq!(residual_work(&candidates, &analyzed), vec!["game0000"]);
    }

    #[test]
    fn everything_analyzed_leaves_no_work() {
        let candidates: HashMap<String, RawGame> =
            [("game0000".to_string(), game("game0000"))].into();
        let analyzed: HashSet<String> = ["game0000".to_string()].into();
        assert!(residual_work(&candidates, &analyzed).is_empty());
    }
}
