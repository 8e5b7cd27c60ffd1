use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// Menu administration. Every handler takes `AuthUser`, so anonymous requests are
/// rejected with 401 before reaching the service; write permission (403) is the
/// access gate's decision.
///
/// Static segments (`integrity`, `rebuild`, `layouts`) take precedence over `{id}`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/menus?layout=N  |  POST /admin/menus
        .route(
            "/menus",
            get(handlers::get_admin_menu).post(handlers::create_menu_node),
        )
        // GET /admin/menus/integrity?layout=N
        .route("/menus/integrity", get(handlers::check_menu_integrity))
        // PUT /admin/menus/rebuild
        .route("/menus/rebuild", put(handlers::rebuild_menu))
        // DELETE /admin/menus/layouts/{layout}
        .route("/menus/layouts/{layout}", delete(handlers::clear_menu_layout))
        // GET | PATCH | DELETE /admin/menus/{id}
        .route(
            "/menus/{id}",
            get(handlers::get_menu_node)
                .patch(handlers::update_menu_node)
                .delete(handlers::delete_menu_node),
        )
        // PUT /admin/menus/{id}/position
        .route("/menus/{id}/position", put(handlers::move_menu_node))
}
