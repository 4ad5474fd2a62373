use axum::{routing::get, Json, Router};
use tracing::{debug, warn};

use crate::engine::CancelToken;
use crate::server_types::{EngineInfo, MoveRequest, MoveRequestError, MoveResult};

/// HTTP front for the search engine: `GET /` describes it, `POST /` with a
/// [`MoveRequest`] asks it for a move.
pub fn serve_engine() -> Router {
    Router::new().route("/", get(get_info).post(handle_move))
}

async fn get_info() -> Json<EngineInfo> {
    Json(EngineInfo::current())
}

async fn handle_move(Json(request): Json<MoveRequest>) -> MoveResult {
    debug!(fen = %request.fen, level = request.level, "move requested");
    match tokio::task::spawn_blocking(move || request.answer(&CancelToken::new())).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "search task failed");
            MoveResult::RequestError(MoveRequestError::InvalidPosition {
                reason: String::from("search failed"),
            })
        }
    }
}
