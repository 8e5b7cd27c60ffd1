use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Menu core.
pub mod error;
pub mod localized;
pub mod menu;
pub mod models;

// Persistence and policy.
pub mod access;
pub mod memory;
pub mod repository;

// HTTP surface.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod routes;

use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use access::{AccessGate, AccessGateState, RoleGate};
pub use config::AppConfig;
pub use error::{MenuError, MenuResult};
pub use localized::LocalizedText;
pub use memory::InMemoryRepository;
pub use menu::MenuService;
pub use repository::{PostgresRepository, Repository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::get_public_menu, handlers::get_me,
        handlers::get_admin_menu, handlers::get_menu_node, handlers::create_menu_node,
        handlers::update_menu_node, handlers::move_menu_node, handlers::delete_menu_node,
        handlers::clear_menu_layout, handlers::rebuild_menu, handlers::check_menu_integrity
    ),
    components(
        schemas(
            models::MenuNode, models::NewMenuNode, models::MenuNodePatch, models::MoveMenuNode,
            models::MenuItemInput, models::RebuildRequest, models::AdminMenuNode,
            models::PublicMenuNode, models::DeletedNodes, models::IntegrityReport,
            models::NavTarget, models::UserProfile, handlers::ErrorBody,
        )
    ),
    tags(
        (name = "cms-menus", description = "Multilingual CMS menu API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for every service the handlers need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-process in tests.
    pub repo: RepositoryState,
    /// Menu permission policy.
    pub gate: AccessGateState,
    pub config: AppConfig,
}

impl AppState {
    /// Wires a repository with a `RoleGate` built from `config.menu_editor_roles`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let gate = std::sync::Arc::new(RoleGate::new(config.menu_editor_roles.clone()));
        Self { repo, gate, config }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AccessGateState {
    fn from_ref(app_state: &AppState) -> AccessGateState {
        app_state.gate.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for MenuService {
    fn from_ref(app_state: &AppState) -> MenuService {
        MenuService::new(
            app_state.repo.clone(),
            app_state.gate.clone(),
            app_state.config.default_language.clone(),
        )
    }
}

/// auth_middleware
///
/// Rejects the request unless `AuthUser` can be extracted (401, or 500 when the
/// profile store is down).
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, auth layers, docs and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
