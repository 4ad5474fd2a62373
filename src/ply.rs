use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::{san::SanPlus, uci::Uci, CastlingMode, Chess, Move};

use crate::error::CoachError;

/// A single legal transition, as the rest of the crate passes it around.
///
/// The UCI form (standard castling mode) carries from-square, to-square and
/// promotion, and is what equality and hashing use. The SAN, with its check or
/// mate suffix, is kept for display and was rendered against the position the
/// move was made from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ply {
    #[serde(with = "crate::chess_serde::uci_serde")]
    pub uci: Uci,
    pub san: String,
}

impl Ply {
    pub fn from_move(pos: &Chess, m: &Move) -> Self {
        Ply {
            uci: m.to_uci(CastlingMode::Standard),
            san: SanPlus::from_move(pos.clone(), m).to_string(),
        }
    }

    /// Parse a move typed by a person, either SAN (`Nf3`) or UCI (`g1f3`),
    /// and check it against the legal moves of `pos`.
    pub fn parse(pos: &Chess, text: &str) -> Result<Self, CoachError> {
        let text = text.trim();
        let illegal = || CoachError::IllegalMove(text.to_string());

        if let Ok(san) = SanPlus::from_str(text) {
            if let Ok(m) = san.san.to_move(pos) {
                return Ok(Ply::from_move(pos, &m));
            }
        }
        let uci = Uci::from_str(text).map_err(|_| illegal())?;
        let m = uci.to_move(pos).map_err(|_| illegal())?;
        Ok(Ply::from_move(pos, &m))
    }

    /// Resolve against `pos`. Fails if the move is not legal there.
    pub fn to_move(&self, pos: &Chess) -> Result<Move, CoachError> {
        self.uci
            .to_move(pos)
            .map_err(|_| CoachError::IllegalMove(self.uci.to_string()))
    }
}

impl PartialEq for Ply {
    fn eq(&self, other: &Self) -> bool {
        self.uci == other.uci
    }
}

impl Eq for Ply {}

impl Hash for Ply {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uci.hash(state);
    }
}

impl fmt::Display for Ply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.san)
    }
}
