//! Integration test: PGN ingestion through board replay.
//!
//! Exercises the parse → resolve → replay path on a real game without
//! needing an engine or a database.

use std::collections::HashSet;

use chess::Board;
use reanalysis_worker::board_utils::{find_san_move, is_checkmate, uci};
use reanalysis_worker::db::color_tag;
use reanalysis_worker::pgn;

const SCHOLARS_MATE: &str = r#"[Event "Casual Rapid game"]
[Site "https://lichess.org/Ab12Cd34"]
[White "Scholar"]
[Black "Victim"]
[Result "1-0"]
[Variant "Standard"]

1. e4 { [%clk 0:10:00] } e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0
"#;

#[test]
fn pgn_parses_and_replays_to_checkmate() {
    let working_set = pgn::load_working_set(SCHOLARS_MATE);
    assert_eq!(working_set.len(), 1);

    let game = &working_set["Ab12Cd34"];
    assert_eq!(game.white, "scholar");
    assert_eq!(game.black, "victim");
    assert_eq!(game.moves.len(), 7);

    let mut board = Board::default();
    for san in &game.moves {
        let mv = find_san_move(&board, san).unwrap_or_else(|e| panic!("{san}: {e}"));
        board = board.make_move_new(mv);
    }
    assert!(is_checkmate(&board));
}

#[test]
fn resumability_keys_are_unique_per_game() {
    let working_set = pgn::load_working_set(SCHOLARS_MATE);
    let game = &working_set["Ab12Cd34"];

    // Walk the same ply indexing the reanalyzer uses and check that no
    // (color, number) pair repeats.
    let mut board = Board::default();
    let mut keys = HashSet::new();
    for (ply, san) in game.moves.iter().enumerate() {
        let color = color_tag(board.side_to_move());
        let number = ply / 2 + 1;
        assert!(keys.insert((color, number)), "duplicate key {color}{number}");

        let mv = find_san_move(&board, san).unwrap();
        board = board.make_move_new(mv);
    }
    assert_eq!(keys.len(), game.moves.len());
}

#[test]
fn final_move_of_the_mainline_is_the_mating_move() {
    let working_set = pgn::load_working_set(SCHOLARS_MATE);
    let game = &working_set["Ab12Cd34"];

    let mut board = Board::default();
    for san in &game.moves[..game.moves.len() - 1] {
        let mv = find_san_move(&board, san).unwrap();
        board = board.make_move_new(mv);
    }
    assert!(!is_checkmate(&board));

    let mating = find_san_move(&board, game.moves.last().unwrap()).unwrap();
    assert_eq!(uci(mating), "h5f7");
    assert!(is_checkmate(&board.make_move_new(mating)));
}
