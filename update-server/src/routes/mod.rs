pub mod updates;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(updates::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
