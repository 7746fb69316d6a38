//! Board helpers: SAN resolution against legal moves, UCI formatting,
//! terminal-position checks.

use chess::{Board, ChessMove, File, MoveGen, Piece, Rank, Square};

use crate::error::WorkerError;

/// Format a move in UCI notation (source, destination, optional promotion)
pub fn uci(mv: ChessMove) -> String {
    let promo = mv
        .get_promotion()
        .map(|p| match p {
            Piece::Queen => "q",
            Piece::Rook => "r",
            Piece::Bishop => "b",
            Piece::Knight => "n",
            _ => "",
        })
        .unwrap_or("");
    format!("{}{}{}", mv.get_source(), mv.get_dest(), promo)
}

/// Side to move has no legal moves and is in check
pub fn is_checkmate(board: &Board) -> bool {
    MoveGen::new_legal(board).len() == 0 && board.checkers().popcnt() > 0
}

/// Side to move has no legal moves and is not in check
pub fn is_stalemate(board: &Board) -> bool {
    MoveGen::new_legal(board).len() == 0 && board.checkers().popcnt() == 0
}

/// Resolve a SAN token to the unique legal move it denotes.
pub fn find_san_move(board: &Board, san: &str) -> Result<ChessMove, WorkerError> {
    let clean: String = san
        .chars()
        .filter(|c| !matches!(c, '+' | '#' | '!' | '?'))
        .collect();

    if clean == "O-O" || clean == "0-0" {
        return find_castle(board, true, san);
    }
    if clean == "O-O-O" || clean == "0-0-0" {
        return find_castle(board, false, san);
    }

    let bytes = clean.as_bytes();
    if bytes.is_empty() {
        return Err(WorkerError::Analysis(format!("Empty SAN: {san}")));
    }

    let (piece, rest) = if bytes[0].is_ascii_uppercase() {
        let p = match bytes[0] {
            b'K' => Piece::King,
            b'Q' => Piece::Queen,
            b'R' => Piece::Rook,
            b'B' => Piece::Bishop,
            b'N' => Piece::Knight,
            _ => {
                return Err(WorkerError::Analysis(format!(
                    "Unknown piece: {}",
                    bytes[0] as char
                )))
            }
        };
        (p, &clean[1..])
    } else {
        (Piece::Pawn, clean.as_str())
    };

    // Promotion suffix
    let (rest, promotion) = if let Some(eq_pos) = rest.find('=') {
        let promo_piece = match rest.as_bytes().get(eq_pos + 1) {
            Some(b'Q') => Some(Piece::Queen),
            Some(b'R') => Some(Piece::Rook),
            Some(b'B') => Some(Piece::Bishop),
            Some(b'N') => Some(Piece::Knight),
            _ => None,
        };
        (&rest[..eq_pos], promo_piece)
    } else {
        (rest, None)
    };

    let rest = rest.replace('x', "");
    let rest_bytes = rest.as_bytes();
    if rest_bytes.len() < 2 {
        return Err(WorkerError::Analysis(format!("SAN too short: {san}")));
    }

    let dest_file = rest_bytes[rest_bytes.len() - 2];
    let dest_rank = rest_bytes[rest_bytes.len() - 1];
    if !(b'a'..=b'h').contains(&dest_file) || !(b'1'..=b'8').contains(&dest_rank) {
        return Err(WorkerError::Analysis(format!(
            "Invalid destination in SAN: {san}"
        )));
    }
    let dest = Square::make_square(
        Rank::from_index((dest_rank - b'1') as usize),
        File::from_index((dest_file - b'a') as usize),
    );

    // Whatever precedes the destination square disambiguates the source
    let disambig = &rest[..rest.len() - 2];

    let mut candidates: Vec<ChessMove> = MoveGen::new_legal(board)
        .filter(|m| {
            m.get_dest() == dest
                && board.piece_on(m.get_source()) == Some(piece)
                && m.get_promotion() == promotion
        })
        .collect();

    if candidates.len() > 1 && !disambig.is_empty() {
        let disambig_bytes = disambig.as_bytes();
        candidates.retain(|m| {
            let src = m.get_source();
            for &b in disambig_bytes {
                if (b'a'..=b'h').contains(&b) {
                    if src.get_file().to_index() != (b - b'a') as usize {
                        return false;
                    }
                } else if (b'1'..=b'8').contains(&b)
                    && src.get_rank().to_index() != (b - b'1') as usize
                {
                    return false;
                }
            }
            true
        });
    }

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(WorkerError::Analysis(format!(
            "No legal move matches SAN: {san}"
        ))),
        n => Err(WorkerError::Analysis(format!(
            "Ambiguous SAN: {san} ({n} candidates)"
        ))),
    }
}

/// Castling appears in the legal move list as a two-file king move.
fn find_castle(board: &Board, kingside: bool, san: &str) -> Result<ChessMove, WorkerError> {
    MoveGen::new_legal(board)
        .find(|m| {
            let src = m.get_source();
            let dst = m.get_dest();
            board.piece_on(src) == Some(Piece::King)
                && src.get_file() == File::E
                && dst.get_file() == if kingside { File::G } else { File::C }
        })
        .ok_or_else(|| WorkerError::Analysis(format!("Illegal castle: {san}")))
}
