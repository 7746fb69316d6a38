//! PGN parsing utilities — lightweight regex-based parser.
//!
//! Splits a multi-game PGN export into games, keeps only standard-variant
//! lichess games (the game id comes from the Site header), and extracts the
//! SAN mainline with comments, variations and NAGs stripped.

use std::collections::HashMap;

use regex::Regex;

/// One game as read from the input file, before any board validation
#[derive(Debug, Clone)]
pub struct RawGame {
    /// External game identifier (8-char lichess id)
    pub id: String,
    /// White player username, lowercased
    pub white: String,
    /// Black player username, lowercased
    pub black: String,
    /// SAN mainline moves
    pub moves: Vec<String>,
}

/// Extract the lichess game id from a Site header value.
pub fn game_id(site: &str) -> Option<String> {
    let re = Regex::new(
        r"^(https?://)?([a-z]+\.)?lichess\.org/([A-Za-z0-9]{8})([A-Za-z0-9]{4})?([/#\?].*)?$",
    )
    .ok()?;
    Some(re.captures(site)?.get(3)?.as_str().to_string())
}

/// Extract a string value from a PGN header (e.g. Site, Variant).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
pub fn extract_moves(pgn: &str) -> Vec<String> {
    // Remove headers
    let header_re = Regex::new(r"\[[^\]]*\]").unwrap();
    let no_headers = header_re.replace_all(pgn, "");

    // Remove comments
    let comment_re = Regex::new(r"\{[^}]*\}").unwrap();
    let no_comments = comment_re.replace_all(&no_headers, "");

    // Remove variations
    let variation_re = Regex::new(r"\([^)]*\)").unwrap();
    let no_variations = variation_re.replace_all(&no_comments, "");

    // Extract moves
    let move_re =
        Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O").unwrap();

    move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split a PGN file into per-game chunks. A game starts at an `[Event` tag
/// and runs until the next one.
fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.starts_with("[Event ") && !current.trim().is_empty() {
            games.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        games.push(current);
    }
    games
}

/// Parse one game chunk into a RawGame, or None if it is not a
/// standard-variant lichess game.
fn parse_game(chunk: &str) -> Option<RawGame> {
    let site = extract_header(chunk, "Site")?;
    let id = game_id(&site)?;

    if extract_header(chunk, "Variant").as_deref() != Some("Standard") {
        return None;
    }

    let white = extract_header(chunk, "White")?.to_lowercase();
    let black = extract_header(chunk, "Black")?.to_lowercase();
    let moves = extract_moves(chunk);

    Some(RawGame {
        id,
        white,
        black,
        moves,
    })
}

/// Build the working set from a PGN export: game id to game, later
/// occurrences of the same id winning.
pub fn load_working_set(text: &str) -> HashMap<String, RawGame> {
    let mut working_set = HashMap::new();
    for chunk in split_games(text) {
        if let Some(game) = parse_game(&chunk) {
            working_set.insert(game.id.clone(), game);
        }
    }
    working_set
}
