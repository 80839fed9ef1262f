//! Web server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use emoticon_core::service::EmoticonService;

/// Shared application state.
pub struct AppState {
    pub service: Arc<EmoticonService>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state)
}
