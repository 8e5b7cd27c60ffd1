use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated endpoints. The menu tree served here never contains hidden
/// nodes; the service asks the repository for visible rows only.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(handlers::health))
        // GET /menus?layout=N
        // Language comes from Accept-Language, falling back to the configured default.
        .route("/menus", get(handlers::get_public_menu))
}
