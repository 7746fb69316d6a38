//! Evaluation normalization — pure functions only.
//!
//! Folds UCI mate distances and centipawn scores into one bounded integer
//! scale. Mate scores occupy a reserved band (|v| >= 29000) strictly outside
//! the clamped centipawn range, with closer mates further from zero.

use crate::error::WorkerError;

/// Absolute bound of the normalized scale.
pub const MATE_BOUND: i32 = 30_000;

/// Largest magnitude an ordinary centipawn score may take.
pub const CP_CEILING: i32 = 29_000;

/// Score for a played move that itself delivers checkmate: mate distance 1
/// from the mover's perspective. Assigned without consulting the engine.
pub const MATE_DELIVERED: i32 = MATE_BOUND - 1;

/// Normalize a raw engine evaluation, relative to the side to move.
///
/// Mate in `m` for the mover maps to `30000 - m`; mate against the mover
/// (`m <= 0`) maps to `-30000 - m`. Centipawn scores are clamped to
/// [-29000, 29000]. An evaluation carrying neither field is a transient
/// engine glitch and fails with [`WorkerError::MalformedEval`] — it must
/// never be confused with a legal score of zero.
pub fn normalize(cp: Option<i32>, mate: Option<i32>) -> Result<i32, WorkerError> {
    if let Some(m) = mate {
        return Ok(if m > 0 { MATE_BOUND - m } else { -MATE_BOUND - m });
    }
    match cp {
        Some(c) => Ok(c.clamp(-CP_CEILING, CP_CEILING)),
        None => Err(WorkerError::MalformedEval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_for_mover_outranks_all_centipawn_scores() {
        for m in 1..50 {
            let v = normalize(None, Some(m)).unwrap();
            assert!(v > CP_CEILING, "mate in {m} gave {v}");
        }
    }

    #[test]
    fn closer_mates_score_higher() {
        assert!(normalize(None, Some(1)).unwrap() > normalize(None, Some(2)).unwrap());
        assert!(normalize(None, Some(2)).unwrap() > normalize(None, Some(10)).unwrap());
    }

    #[test]
    fn mate_against_mover_is_below_centipawn_floor() {
        for m in [0, -1, -5, -30] {
            let v = normalize(None, Some(m)).unwrap();
            assert!(v < -CP_CEILING, "mate {m} gave {v}");
        }
        // Closer mates against are more negative.
        assert!(normalize(None, Some(-1)).unwrap() < normalize(None, Some(-2)).unwrap());
    }

    #[test]
    fn centipawns_are_clamped() {
        assert_eq!(normalize(Some(35), None).unwrap(), 35);
        assert_eq!(normalize(Some(-120), None).unwrap(), -120);
        assert_eq!(normalize(Some(50_000), None).unwrap(), CP_CEILING);
        assert_eq!(normalize(Some(-50_000), None).unwrap(), -CP_CEILING);
    }

    #[test]
    fn mate_takes_precedence_over_cp() {
        // Some engines emit both; the mate field wins.
        assert_eq!(normalize(Some(500), Some(3)).unwrap(), MATE_BOUND - 3);
    }

    #[test]
    fn missing_payload_is_an_error_not_zero() {
        let err = normalize(None, None).unwrap_err();
        assert!(matches!(err, WorkerError::MalformedEval));
    }
}
