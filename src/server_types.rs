#[cfg(feature = "server")]
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, uci::Uci, CastlingMode, Chess, Position};

use crate::engine::{search, CancelToken, EngineConfig, SearchRequest};

/// Ask the engine for a move.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MoveRequest {
    /// The position to move from, as FEN.
    pub fen: String,

    /// Difficulty, 1 to 5. Out-of-range values are clamped.
    #[serde(default = "default_level")]
    pub level: u8,

    /// What random number to give to the engine for its move choice?
    /// If None, it will be generated.
    pub seed: Option<u64>,
}

fn default_level() -> u8 {
    3
}

/// General engine info.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineInfo {
    /// The engine's algorithm ID.
    pub id: String,

    /// A human-readable description of what the engine does.
    pub description: String,

    pub min_level: u8,
    pub max_level: u8,
}

impl EngineInfo {
    pub fn current() -> Self {
        EngineInfo {
            id: String::from("opening-coach-alphabeta"),
            description: String::from(
                "Iterative-deepening alpha-beta over material and piece-square tables. \
                 Lower levels search shallower and pick among near-equal moves at random.",
            ),
            min_level: EngineConfig::MIN_LEVEL,
            max_level: EngineConfig::MAX_LEVEL,
        }
    }
}

/// Errors relating to a submitted request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MoveRequestError {
    /// The FEN could not be parsed or does not describe a legal position.
    InvalidPosition { reason: String },

    /// The side to move is checkmated or stalemated.
    NoLegalMoves,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MoveResponse {
    /// The move that the engine chose.
    #[serde(with = "crate::chess_serde::uci_serde")]
    pub r#move: Uci,

    pub san: String,

    /// Centipawns from the mover's point of view.
    pub evaluation: i32,

    /// Deepest completed search iteration.
    pub depth: u8,

    /// The game state after this move was played.
    #[serde(with = "crate::chess_serde::position_serde")]
    pub game_after: Chess,

    /// The random number we gave to the engine.
    pub seed_used: u64,
}

#[derive(Clone, Debug)]
pub enum MoveResult {
    RequestError(MoveRequestError),
    Ok(MoveResponse),
}

impl MoveRequest {
    /// Run the search this request describes.
    pub fn answer(&self, cancel: &CancelToken) -> MoveResult {
        let position: Chess = match self
            .fen
            .trim()
            .parse::<Fen>()
            .map_err(|e| e.to_string())
            .and_then(|fen| {
                fen.into_position(CastlingMode::Standard)
                    .map_err(|e| e.to_string())
            }) {
            Ok(position) => position,
            Err(reason) => {
                return MoveResult::RequestError(MoveRequestError::InvalidPosition { reason })
            }
        };

        let seed_used = self.seed.unwrap_or_else(rand::random);
        let request = SearchRequest {
            position: position.clone(),
            config: EngineConfig::level(self.level),
            seed: seed_used,
            generation: 0,
        };
        let result = search(&request, cancel);

        let Some(ply) = result.best_move else {
            return MoveResult::RequestError(MoveRequestError::NoLegalMoves);
        };
        let game_after = match ply.to_move(&position) {
            Ok(m) => {
                let mut after = position;
                after.play_unchecked(&m);
                after
            }
            Err(_) => return MoveResult::RequestError(MoveRequestError::NoLegalMoves),
        };

        MoveResult::Ok(MoveResponse {
            r#move: ply.uci,
            san: ply.san,
            evaluation: result.evaluation,
            depth: result.depth,
            game_after,
            seed_used,
        })
    }
}

#[cfg(feature = "server")]
impl IntoResponse for MoveResult {
    fn into_response(self) -> axum::response::Response {
        match self {
            MoveResult::RequestError(what) => (StatusCode::BAD_REQUEST, Json(what)).into_response(),
            MoveResult::Ok(what) => (StatusCode::OK, Json(what)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_level() {
        let request: MoveRequest = serde_json::from_str(
            r#"{"fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", "seed": null}"#,
        )
        .unwrap();
        assert_eq!(request.level, 3);
        assert_eq!(request.seed, None);
    }

    #[test]
    fn answers_with_the_seed_it_used() {
        let request = MoveRequest {
            fen: String::from("6k1/5ppp/8/8/8/8/5PPP/4Q1K1 w - - 0 1"),
            level: 5,
            seed: Some(42),
        };
        let MoveResult::Ok(response) = request.answer(&CancelToken::new()) else {
            panic!("expected a move");
        };
        assert_eq!(response.r#move.to_string(), "e1e8");
        assert_eq!(response.san, "Qe8#");
        assert_eq!(response.seed_used, 42);
    }

    #[test]
    fn rejects_bad_positions() {
        let garbage = MoveRequest {
            fen: String::from("not a position"),
            level: 1,
            seed: None,
        };
        assert!(matches!(
            garbage.answer(&CancelToken::new()),
            MoveResult::RequestError(MoveRequestError::InvalidPosition { .. })
        ));

        let mated = MoveRequest {
            fen: String::from("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"),
            level: 1,
            seed: Some(0),
        };
        assert!(matches!(
            mated.answer(&CancelToken::new()),
            MoveResult::RequestError(MoveRequestError::NoLegalMoves)
        ));
    }
}
