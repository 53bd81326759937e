mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam))
        .route("/:exam_id", get(handlers::get_exam))
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/attempts", get(handlers::list_exam_attempts))
        .route("/:exam_id/open", post(handlers::open_attempt))
        .route("/:exam_id/start", post(handlers::start_attempt))
        .route("/:exam_id/submit", post(handlers::submit_attempt))
}

#[cfg(test)]
mod tests;
