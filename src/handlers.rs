use crate::{
    AppState,
    auth::AuthUser,
    error::MenuError,
    localized::requested_language,
    menu::MenuService,
    models::{
        AdminMenuNode, DeletedNodes, IntegrityReport, MenuNode, MenuNodePatch, MoveMenuNode,
        NewMenuNode, PublicMenuNode, RebuildRequest, UserProfile,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// --- Query / Error Structs ---

/// LayoutQuery
///
/// `?layout=N` selector shared by the tree and integrity endpoints.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct LayoutQuery {
    /// Menu layout (placement slot) number.
    pub layout: i16,
}

/// ErrorBody
///
/// JSON body of every failed menu request.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `cycle_detected`.
    pub error: String,
    pub message: String,
}

impl MenuError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            MenuError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            MenuError::LayoutMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "layout_mismatch"),
            MenuError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            MenuError::CycleDetected { .. } => (StatusCode::CONFLICT, "cycle_detected"),
            MenuError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            MenuError::AccessDenied(_) => (StatusCode::FORBIDDEN, "access_denied"),
            MenuError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        }
    }
}

/// MenuError → HTTP
///
/// Storage failures are logged with their cause and reported without it.
impl IntoResponse for MenuError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            MenuError::Storage(cause) => {
                tracing::error!(error = %cause, "menu storage failure");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: kind.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// get_public_menu
///
/// [Public Route] The visible tree of a layout, names resolved for the request's
/// `Accept-Language` (configured default language when absent).
#[utoipa::path(
    get,
    path = "/menus",
    params(LayoutQuery),
    responses((status = 200, description = "Public menu tree", body = [PublicMenuNode]))
)]
pub async fn get_public_menu(
    State(menus): State<MenuService>,
    Query(query): Query<LayoutQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<PublicMenuNode>>, MenuError> {
    let header = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let lang = requested_language(header, menus.default_language()).to_string();
    let tree = menus.public_tree(query.layout, &lang).await?;
    Ok(Json(tree))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The current principal and whether it may edit menus.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current profile", body = UserProfile),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Profile store unavailable")
    )
)]
pub async fn get_me(
    principal: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, StatusCode> {
    // The extractor just loaded this profile; it can only vanish in a race with a delete.
    let user = state
        .repo
        .get_user(principal.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %principal.id, "profile lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    let can_edit_menus = state.gate.can_mutate_menus(&principal);
    Ok(Json(UserProfile {
        id: user.id,
        email: user.email,
        role: user.role,
        can_edit_menus,
    }))
}

// --- Admin Handlers ---

/// get_admin_menu
///
/// [Admin Route] Full tree of a layout with bounds, depth and raw name maps.
#[utoipa::path(
    get,
    path = "/admin/menus",
    params(LayoutQuery),
    responses(
        (status = 200, description = "Admin menu tree", body = [AdminMenuNode]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_admin_menu(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Query(query): Query<LayoutQuery>,
) -> Result<Json<Vec<AdminMenuNode>>, MenuError> {
    Ok(Json(menus.admin_tree(&principal, query.layout).await?))
}

/// get_menu_node
///
/// [Admin Route] A single node with its raw name map and bounds. Hidden nodes are
/// 404 for principals that may not read hidden content.
#[utoipa::path(
    get,
    path = "/admin/menus/{id}",
    responses(
        (status = 200, description = "Menu node", body = MenuNode),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_menu_node(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Path(id): Path<i64>,
) -> Result<Json<MenuNode>, MenuError> {
    Ok(Json(menus.get(&principal, id).await?))
}

/// create_menu_node
///
/// [Admin Route] Appends a node as the last child of `parent_id` (or last root).
///
/// Bounds are assigned by the store. A parent in another layout is 422, as is a
/// parent already at the maximum nesting depth.
#[utoipa::path(
    post,
    path = "/admin/menus",
    request_body = NewMenuNode,
    responses(
        (status = 201, description = "Created", body = MenuNode),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 404, description = "Parent not found", body = ErrorBody),
        (status = 422, description = "Invalid payload, layout mismatch or too deep", body = ErrorBody)
    )
)]
pub async fn create_menu_node(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Json(payload): Json<NewMenuNode>,
) -> Result<(StatusCode, Json<MenuNode>), MenuError> {
    let node = menus.create(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// update_menu_node
///
/// [Admin Route] Changes name, properties or visibility. Structure is untouched.
#[utoipa::path(
    patch,
    path = "/admin/menus/{id}",
    request_body = MenuNodePatch,
    responses(
        (status = 200, description = "Updated", body = MenuNode),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn update_menu_node(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Path(id): Path<i64>,
    Json(payload): Json<MenuNodePatch>,
) -> Result<Json<MenuNode>, MenuError> {
    Ok(Json(menus.update(&principal, id, payload).await?))
}

/// move_menu_node
///
/// [Admin Route] Re-parents a node with its subtree.
///
/// `parent_id: null` makes it a root; `position` picks its slot among the new
/// siblings (appended when absent or past the end). Moving under its own descendant
/// is 409 and leaves the tree unchanged.
#[utoipa::path(
    put,
    path = "/admin/menus/{id}/position",
    request_body = MoveMenuNode,
    responses(
        (status = 200, description = "Moved", body = MenuNode),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 409, description = "Cycle or concurrent update", body = ErrorBody),
        (status = 422, description = "Layout mismatch or too deep", body = ErrorBody)
    )
)]
pub async fn move_menu_node(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Path(id): Path<i64>,
    Json(payload): Json<MoveMenuNode>,
) -> Result<Json<MenuNode>, MenuError> {
    Ok(Json(menus.move_node(&principal, id, payload).await?))
}

/// delete_menu_node
///
/// [Admin Route] Deletes a node and all of its descendants.
#[utoipa::path(
    delete,
    path = "/admin/menus/{id}",
    responses(
        (status = 200, description = "Deleted", body = DeletedNodes),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_menu_node(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedNodes>, MenuError> {
    Ok(Json(menus.delete(&principal, id).await?))
}

/// clear_menu_layout
///
/// [Admin Route] Removes every node of a layout.
#[utoipa::path(
    delete,
    path = "/admin/menus/layouts/{layout}",
    responses(
        (status = 200, description = "Cleared", body = DeletedNodes),
        (status = 403, description = "Not an editor", body = ErrorBody)
    )
)]
pub async fn clear_menu_layout(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Path(layout): Path<i16>,
) -> Result<Json<DeletedNodes>, MenuError> {
    Ok(Json(menus.clear(&principal, layout).await?))
}

/// rebuild_menu
///
/// [Admin Route] Replaces a whole layout with the submitted forest, atomically.
///
/// The whole forest is validated first; the 422 message names the offending path.
/// The response is the tree exactly as committed.
#[utoipa::path(
    put,
    path = "/admin/menus/rebuild",
    request_body = RebuildRequest,
    responses(
        (status = 200, description = "Rebuilt tree", body = [AdminMenuNode]),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 422, description = "Invalid forest", body = ErrorBody)
    )
)]
pub async fn rebuild_menu(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Json(payload): Json<RebuildRequest>,
) -> Result<Json<Vec<AdminMenuNode>>, MenuError> {
    Ok(Json(menus.rebuild(&principal, payload).await?))
}

/// check_menu_integrity
///
/// [Admin Route] Verifies the nested-set invariants of a layout.
#[utoipa::path(
    get,
    path = "/admin/menus/integrity",
    params(LayoutQuery),
    responses((status = 200, description = "Integrity report", body = IntegrityReport))
)]
pub async fn check_menu_integrity(
    principal: AuthUser,
    State(menus): State<MenuService>,
    Query(query): Query<LayoutQuery>,
) -> Result<Json<IntegrityReport>, MenuError> {
    Ok(Json(menus.integrity(&principal, query.layout).await?))
}
