use cms_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects and migrates Postgres, then serves
/// the HTTP API.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // Fails fast on missing production secrets.
    let config = AppConfig::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cms_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    tracing::info!(
        default_language = %config.default_language,
        editor_roles = ?config.menu_editor_roles,
        "menu policy loaded"
    );

    let listen_addr = config.listen_addr.clone();
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(&listen_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check APP_ADDR.");

    tracing::info!("Listening on {}", listen_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", listen_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
