//! Local opponent: static evaluation plus iterative-deepening alpha-beta
//! search, scaled by difficulty level.

mod cancel;
mod config;
pub mod eval;
mod search;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use search::{search, MoveOrigin, SearchRequest, SearchResult, MATE_SCORE};
