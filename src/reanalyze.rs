//! Per-game reanalysis pipeline.
//!
//! Replays the mainline forward to collect the position before each ply,
//! then walks plies in reverse (endgame positions are cheaper to search, and
//! resumed runs short-circuit already-recorded suffixes quickly). Each ply
//! produces exactly one immutable move record; an existing record for the
//! (game, color, number) key is skipped, which is what makes repeated runs
//! over partially-completed games cheap and idempotent.

use chess::{Board, ChessMove};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::board_utils::{find_san_move, is_checkmate, is_stalemate, uci};
use crate::config::WorkerConfig;
use crate::db::{self, MoveRecord};
use crate::error::WorkerError;
use crate::pgn::RawGame;
use crate::score::{normalize, MATE_DELIVERED};
use crate::stockfish::{PvLine, StockfishEngine};

/// Ranked lines requested per position
pub const PV_LINES: u32 = 5;

/// Engine verdict for a single position, before persistence
#[derive(Debug, Clone)]
struct MoveEval {
    pv_evals: [Option<i32>; 5],
    played_rank: Option<i16>,
    played_eval: i32,
    nodes: Option<i64>,
}

/// Analyze every unrecorded move of one game and mark it fully analyzed.
///
/// The metadata lock is held around every database read or write and never
/// across an engine call, so CPU-bound analysis overlaps across workers
/// while persistence stays serialized.
pub async fn reanalyze_game(
    engine: &mut StockfishEngine,
    pool: &PgPool,
    meta_lock: &Mutex<()>,
    config: &WorkerConfig,
    game: &RawGame,
) -> Result<(), WorkerError> {
    {
        let _guard = meta_lock.lock().await;
        db::get_or_create_game(pool, &game.id).await?;
        db::get_or_create_player(pool, &game.white).await?;
        db::get_or_create_player(pool, &game.black).await?;
        db::get_or_create_game_player(pool, &game.id, "w", &game.white).await?;
        db::get_or_create_game_player(pool, &game.id, "b", &game.black).await?;
    }

    // Forward replay: board before each ply
    let mut board = Board::default();
    let mut plies: Vec<(Board, ChessMove)> = Vec::with_capacity(game.moves.len());
    for san in &game.moves {
        let mv = find_san_move(&board, san)?;
        plies.push((board, mv));
        board = board.make_move_new(mv);
    }

    info!(game_id = %game.id, moves = plies.len(), "Reanalyzing game");

    let mut analyzed = 0u32;
    let mut skipped = 0u32;

    for (ply, &(position, played)) in plies.iter().enumerate().rev() {
        let color = db::color_tag(position.side_to_move());
        let number = (ply / 2 + 1) as i32;

        {
            let _guard = meta_lock.lock().await;
            if db::move_exists(pool, &game.id, color, number).await? {
                skipped += 1;
                continue;
            }
        }

        let eval = analyze_with_retry(engine, &position, played, config).await?;
        debug!(
            game_id = %game.id,
            number,
            color,
            played_eval = eval.played_eval,
            rank = ?eval.played_rank,
            "Move analyzed"
        );

        let record = MoveRecord {
            game_id: game.id.clone(),
            color: color.to_string(),
            number,
            pv_evals: eval.pv_evals,
            played_rank: eval.played_rank,
            played_eval: eval.played_eval,
            nodes: eval.nodes,
            masterdb_matches: None,
        };

        {
            let _guard = meta_lock.lock().await;
            db::insert_move(pool, &record).await?;
        }
        analyzed += 1;
    }

    {
        let _guard = meta_lock.lock().await;
        db::mark_analyzed(pool, &game.id).await?;
    }

    info!(game_id = %game.id, analyzed, skipped, "Game fully analyzed");
    Ok(())
}

/// Retry malformed evaluations in place, same position and budget, up to the
/// configured ceiling.
async fn analyze_with_retry(
    engine: &mut StockfishEngine,
    position: &Board,
    played: ChessMove,
    config: &WorkerConfig,
) -> Result<MoveEval, WorkerError> {
    let mut attempts = 0u32;
    loop {
        match analyze_position(engine, position, played, config).await {
            Ok(eval) => return Ok(eval),
            Err(WorkerError::MalformedEval) => {
                attempts += 1;
                if attempts >= config.max_engine_retries {
                    return Err(WorkerError::EngineUnstable { attempts });
                }
                warn!(attempts, "Malformed engine evaluation, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn analyze_position(
    engine: &mut StockfishEngine,
    position: &Board,
    played: ChessMove,
    config: &WorkerConfig,
) -> Result<MoveEval, WorkerError> {
    let fen = position.to_string();
    let top = engine
        .analyze_top(&fen, config.nodes_per_position, PV_LINES)
        .await?;
    let pv_evals = normalize_lines(&top.lines)?;

    let (played_rank, played_eval) = match match_played(&top.lines, &pv_evals, &uci(played)) {
        // The played move was a ranked line: reuse its evaluation, no
        // second engine call.
        Some((rank, eval)) => (Some(rank), eval),
        None => {
            let after = position.make_move_new(played);
            match terminal_played_eval(&after) {
                Some(eval) => (None, eval),
                None => {
                    // Score the forced position and flip it back to the
                    // original mover's perspective.
                    let best = engine
                        .analyze_best(&after.to_string(), config.nodes_per_position)
                        .await?;
                    (None, -normalize(best.cp, best.mate)?)
                }
            }
        }
    };

    Ok(MoveEval {
        pv_evals,
        played_rank,
        played_eval,
        nodes: top.nodes,
    })
}

/// Score the played move without the engine when it ends the game on the
/// spot: delivering checkmate is mate distance 1 for the mover, stalemate
/// is a dead draw. The engine answers terminal positions with a pv-less
/// depth-0 info line, which the analysis parsers read as malformed, so
/// these positions must never reach `analyze_best`.
fn terminal_played_eval(after: &Board) -> Option<i32> {
    if is_checkmate(after) {
        Some(MATE_DELIVERED)
    } else if is_stalemate(after) {
        Some(0)
    } else {
        None
    }
}

/// Normalize the ranked lines into the five persisted slots.
///
/// Trailing ranks the engine never reported (fewer legal moves than lines
/// requested) stay None; a reported line missing its move or score, or a
/// missing rank-1 line, is a transient malformation.
fn normalize_lines(lines: &[PvLine]) -> Result<[Option<i32>; 5], WorkerError> {
    let mut evals = [None; 5];
    for (i, line) in lines.iter().take(5).enumerate() {
        if line.is_empty() {
            continue;
        }
        if line.first.is_none() {
            return Err(WorkerError::MalformedEval);
        }
        evals[i] = Some(normalize(line.cp, line.mate)?);
    }
    if evals[0].is_none() {
        return Err(WorkerError::MalformedEval);
    }
    Ok(evals)
}

/// Resolve the played move's rank among the engine's lines. Returns the
/// 1-based rank and that line's evaluation when it matches.
fn match_played(
    lines: &[PvLine],
    evals: &[Option<i32>; 5],
    played_uci: &str,
) -> Option<(i16, i32)> {
    for (i, line) in lines.iter().take(5).enumerate() {
        if line.first.as_deref() == Some(played_uci) {
            return evals[i].map(|eval| ((i + 1) as i16, eval));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn line(first: &str, cp: i32) -> PvLine {
        PvLine {
            first: Some(first.to_string()),
            cp: Some(cp),
            mate: None,
        }
    }

    fn top5() -> Vec<PvLine> {
        vec![
            line("e2e4", 50),
            line("d2d4", 30),
            line("g1f3", 10),
            line("c2c4", -5),
            line("b1c3", -20),
        ]
    }

    #[test]
    fn played_move_at_rank_three_reuses_its_eval() {
        let lines = top5();
        let evals = normalize_lines(&lines).unwrap();
        assert_eq!(evals, [Some(50), Some(30), Some(10), Some(-5), Some(-20)]);
        assert_eq!(match_played(&lines, &evals, "g1f3"), Some((3, 10)));
    }

    #[test]
    fn unranked_played_move_does_not_match() {
        let lines = top5();
        let evals = normalize_lines(&lines).unwrap();
        assert_eq!(match_played(&lines, &evals, "a2a3"), None);
    }

    #[test]
    fn unreported_trailing_ranks_stay_unset() {
        let mut lines = top5();
        lines[3] = PvLine::default();
        lines[4] = PvLine::default();
        let evals = normalize_lines(&lines).unwrap();
        assert_eq!(evals, [Some(50), Some(30), Some(10), None, None]);
    }

    #[test]
    fn missing_first_line_is_malformed() {
        let mut lines = top5();
        lines[0] = PvLine::default();
        assert!(matches!(
            normalize_lines(&lines),
            Err(WorkerError::MalformedEval)
        ));
    }

    #[test]
    fn reported_line_without_score_is_malformed() {
        let mut lines = top5();
        lines[1].cp = None;
        assert!(matches!(
            normalize_lines(&lines),
            Err(WorkerError::MalformedEval)
        ));
    }

    #[test]
    fn mating_move_is_scored_without_engine_output() {
        // 1. f3 e5 2. g4 Qh4#
        let mut board = Board::default();
        for san in ["f3", "e5", "g4"] {
            board = board.make_move_new(find_san_move(&board, san).unwrap());
        }
        let mating = find_san_move(&board, "Qh4#").unwrap();
        let after = board.make_move_new(mating);
        assert_eq!(terminal_played_eval(&after), Some(MATE_DELIVERED));
    }

    #[test]
    fn stalemating_move_is_scored_as_a_draw_without_engine_output() {
        let before = Board::from_str("k7/8/8/1Q6/8/8/8/7K w - - 0 1").unwrap();
        let played = find_san_move(&before, "Qb6").unwrap();
        let after = before.make_move_new(played);
        assert_eq!(terminal_played_eval(&after), Some(0));
    }

    #[test]
    fn ordinary_positions_still_go_to_the_engine() {
        let board = Board::default();
        let after = board.make_move_new(find_san_move(&board, "e4").unwrap());
        assert_eq!(terminal_played_eval(&after), None);
    }

    #[test]
    fn mate_lines_normalize_into_the_reserved_band() {
        let mut lines = top5();
        lines[0] = PvLine {
            first: Some("d8h4".to_string()),
            cp: None,
            mate: Some(1),
        };
        let evals = normalize_lines(&lines).unwrap();
        assert_eq!(evals[0], Some(MATE_DELIVERED));
    }
}
