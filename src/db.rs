//! Database queries for games, players and per-move evaluation records.
//!
//! Every create is idempotent (`ON CONFLICT DO NOTHING`): concurrent workers
//! racing on the same key must neither duplicate rows nor fail.

use std::collections::HashSet;

use chess::Color;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::WorkerError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        username TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        is_analyzed BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS game_players (
        game_id TEXT NOT NULL REFERENCES games(id),
        color TEXT NOT NULL,
        username TEXT NOT NULL REFERENCES players(username),
        PRIMARY KEY (game_id, color)
    )",
    "CREATE TABLE IF NOT EXISTS moves (
        game_id TEXT NOT NULL REFERENCES games(id),
        color TEXT NOT NULL,
        number INT NOT NULL,
        pv1_eval INT,
        pv2_eval INT,
        pv3_eval INT,
        pv4_eval INT,
        pv5_eval INT,
        played_rank SMALLINT,
        played_eval INT NOT NULL,
        nodes BIGINT,
        masterdb_matches INT,
        PRIMARY KEY (game_id, color, number)
    )",
];

/// One persisted move evaluation. Immutable once created: its existence for
/// (game, color, number) means that move is never re-analyzed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub game_id: String,
    pub color: String,
    pub number: i32,
    /// Ranked line evaluations, index 0 = pv1; None where the engine
    /// reported fewer lines
    pub pv_evals: [Option<i32>; 5],
    /// 1-5 when the played move matched a ranked line, None otherwise
    pub played_rank: Option<i16>,
    /// Evaluation of the played move, mover's perspective
    pub played_eval: i32,
    /// Node count the engine consulted
    pub nodes: Option<i64>,
    /// Reserved extension point, always None
    pub masterdb_matches: Option<i32>,
}

/// Single-character color tag used in persisted keys
pub fn color_tag(color: Color) -> &'static str {
    match color {
        Color::White => "w",
        Color::Black => "b",
    }
}

/// Create the schema if it does not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<(), WorkerError> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

pub async fn get_or_create_game(pool: &PgPool, game_id: &str) -> Result<(), WorkerError> {
    sqlx::query("INSERT INTO games (id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_or_create_player(pool: &PgPool, username: &str) -> Result<(), WorkerError> {
    sqlx::query("INSERT INTO players (username) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(username)
        .execute(pool)
        .await?;
    Ok(())
}

/// Associate a player with one color of a game, at most once per
/// (game, color) pair
pub async fn get_or_create_game_player(
    pool: &PgPool,
    game_id: &str,
    color: &str,
    username: &str,
) -> Result<(), WorkerError> {
    sqlx::query(
        "INSERT INTO game_players (game_id, color, username) VALUES ($1, $2, $3)
         ON CONFLICT DO NOTHING",
    )
    .bind(game_id)
    .bind(color)
    .bind(username)
    .execute(pool)
    .await?;
    Ok(())
}

/// Existence check on the resumability key
pub async fn move_exists(
    pool: &PgPool,
    game_id: &str,
    color: &str,
    number: i32,
) -> Result<bool, WorkerError> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM moves WHERE game_id = $1 AND color = $2 AND number = $3",
    )
    .bind(game_id)
    .bind(color)
    .bind(number)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Persist one move record. A concurrent duplicate is silently dropped.
pub async fn insert_move(pool: &PgPool, record: &MoveRecord) -> Result<(), WorkerError> {
    sqlx::query(
        r#"INSERT INTO moves (
            game_id, color, number,
            pv1_eval, pv2_eval, pv3_eval, pv4_eval, pv5_eval,
            played_rank, played_eval, nodes, masterdb_matches
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT DO NOTHING"#,
    )
    .bind(&record.game_id)
    .bind(&record.color)
    .bind(record.number)
    .bind(record.pv_evals[0])
    .bind(record.pv_evals[1])
    .bind(record.pv_evals[2])
    .bind(record.pv_evals[3])
    .bind(record.pv_evals[4])
    .bind(record.played_rank)
    .bind(record.played_eval)
    .bind(record.nodes)
    .bind(record.masterdb_matches)
    .execute(pool)
    .await?;
    Ok(())
}

/// Set after the full mainline was iterated with no move skipped by failure
pub async fn mark_analyzed(pool: &PgPool, game_id: &str) -> Result<(), WorkerError> {
    sqlx::query("UPDATE games SET is_analyzed = TRUE WHERE id = $1")
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All game ids already marked fully analyzed
pub async fn analyzed_game_ids(pool: &PgPool) -> Result<HashSet<String>, WorkerError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM games WHERE is_analyzed = TRUE")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_tags_are_single_characters() {
        assert_eq!(color_tag(Color::White), "w");
        assert_eq!(color_tag(Color::Black), "b");
    }

    #[test]
    fn reserved_field_stays_empty() {
        let record = MoveRecord {
            game_id: "AbCd1234".into(),
            color: "w".into(),
            number: 1,
            pv_evals: [Some(50), Some(30), Some(10), None, None],
            played_rank: Some(3),
            played_eval: 10,
            nodes: Some(4_000_000),
            masterdb_matches: None,
        };
        assert!(record.masterdb_matches.is_none());
    }
}
