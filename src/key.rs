//! Canonical position identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode};

use crate::error::CoachError;

/// Identity of a board state, used as the lookup key for the practice index,
/// the book and the advice caches.
///
/// It is the first four FEN fields: piece placement, side to move, castling
/// rights and the en-passant square (only when a capture there is legal).
/// Move counters are dropped, so the same position reached along different
/// paths always produces the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn from_position(pos: &Chess) -> Self {
        let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal);
        PositionKey(normalize_fen(&fen.to_string()))
    }

    /// The key as a full FEN with zeroed counters, for collaborators that want FEN.
    pub fn to_fen(&self) -> String {
        format!("{} 0 1", self.0)
    }

    /// Rebuild a position from the key. Counters start fresh.
    pub fn to_position(&self) -> Result<Chess, CoachError> {
        position_from_fen(&self.to_fen())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a full FEN into a standard-chess position.
pub fn position_from_fen(fen: &str) -> Result<Chess, CoachError> {
    let fen = Fen::from_str(fen.trim()).map_err(|e| CoachError::Fen(e.to_string()))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| CoachError::Fen(e.to_string()))
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
