//! CORS policy and the `/cors` preflight endpoint.

use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tower_http::cors::{Any, CorsLayer};

/// Browser-friendly policy: any origin, GET/POST/OPTIONS, a fixed header
/// allow-list, and preflight answers cached for `max_age`.
#[must_use]
pub fn cors_layer(max_age: Duration) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ORIGIN,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-custom-header"),
            AUTHORIZATION,
        ])
        .max_age(max_age)
}

/// `OPTIONS /cors` — empty 204 response.
pub async fn preflight_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Rewrites a successful empty preflight answer to 204.
pub async fn no_content(mut response: Response) -> Response {
    if response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
