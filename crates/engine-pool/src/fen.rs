//! Structural FEN validation.
//!
//! Checks shape only: rank count, square counts, side-to-move token, king
//! count, and castling token. Move legality is out of scope.

use crate::EngineError;

/// Validate a FEN string structurally.
///
/// Accepts 4 to 6 space-separated fields. The board field must have exactly
/// 8 ranks, each summing to 8 squares; there must be exactly one king per
/// side; the side-to-move token must be `w` or `b`; the castling token must
/// be `-` or a subset of `KQkq` without repeats.
pub fn validate(fen: &str) -> Result<(), EngineError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if fields.len() < 4 || fields.len() > 6 {
        return Err(invalid(format!("expected 4-6 fields, got {}", fields.len())));
    }

    let ranks: Vec<&str> = fields[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(invalid(format!("expected 8 ranks, got {}", ranks.len())));
    }

    let mut white_kings = 0u32;
    let mut black_kings = 0u32;
    for (idx, rank) in ranks.iter().enumerate() {
        let mut squares = 0u32;
        for c in rank.chars() {
            if let Some(d) = c.to_digit(10) {
                if d == 0 || d > 8 {
                    return Err(invalid(format!("bad skip count '{}' in rank {}", c, idx + 1)));
                }
                squares += d;
            } else if "pnbrqkPNBRQK".contains(c) {
                squares += 1;
                match c {
                    'K' => white_kings += 1,
                    'k' => black_kings += 1,
                    _ => {}
                }
            } else {
                return Err(invalid(format!("invalid piece '{}' in rank {}", c, idx + 1)));
            }
        }
        if squares != 8 {
            return Err(invalid(format!(
                "rank {} covers {} squares, expected 8",
                idx + 1,
                squares
            )));
        }
    }

    if white_kings != 1 || black_kings != 1 {
        return Err(invalid(format!(
            "expected one king per side, got {} white and {} black",
            white_kings, black_kings
        )));
    }

    match fields[1] {
        "w" | "b" => {}
        other => return Err(invalid(format!("bad side-to-move token '{}'", other))),
    }

    let castling = fields[2];
    if castling != "-" {
        let mut seen = [false; 4];
        for c in castling.chars() {
            let slot = match c {
                'K' => 0,
                'Q' => 1,
                'k' => 2,
                'q' => 3,
                other => return Err(invalid(format!("bad castling token '{}'", other))),
            };
            if seen[slot] {
                return Err(invalid(format!("repeated castling right '{}'", c)));
            }
            seen[slot] = true;
        }
    }

    Ok(())
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidPosition(message)
}
