//! HTTP surface of the websocket server: router composition and CORS.
//!
//! Only two routes exist: `/ws` (websocket upgrade) and `/cors`
//! (preflight probe).

pub mod cors;

use axum::Router;
use axum::middleware;
use axum::routing::{get, options};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router for one running server.
///
/// The CORS layer answers every `OPTIONS` request itself, so on `/cors`
/// it sits inside [`cors::no_content`], which turns its empty 200 into
/// the advertised 204.
pub fn build_router(state: AppState) -> Router {
    let cors = cors::cors_layer(state.config.cors_max_age);
    Router::new()
        .route("/ws", get(ws_handler).layer(cors.clone()))
        .route(
            "/cors",
            options(cors::preflight_handler)
                .layer(cors)
                .layer(middleware::map_response(cors::no_content)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
