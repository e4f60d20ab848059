use clinic_actions::{
    AppState, action_routes,
    config::{AppConfig, Env},
    create_router,
    models::{Actor, Role},
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging and storage, and serves the HTTP API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise verbose local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clinic_actions=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Storage
    let repo = match config.db_url.as_deref() {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let postgres = PostgresRepository::new(pool);

            // LOCAL-ONLY: create tables for the dockerized database.
            if config.env == Env::Local {
                postgres
                    .ensure_schema()
                    .await
                    .expect("FATAL: Failed to create the local schema.");
            }
            Arc::new(postgres) as RepositoryState
        }
        None => {
            let demo_actors = [
                Actor::new("patient-1", "Demo Patient", Role::Patient),
                Actor::new("doctor-1", "Demo Doctor", Role::Doctor),
                Actor::new("receptionist-1", "Demo Receptionist", Role::Receptionist),
            ];
            tracing::warn!(
                "DATABASE_URL not set: using the in-memory repository with demo actors {:?}",
                demo_actors.iter().map(|a| a.id.as_str()).collect::<Vec<_>>()
            );
            Arc::new(InMemoryRepository::with_actors(demo_actors)) as RepositoryState
        }
    };

    // 4. State and routing table, built once.
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState { repo, config };
    let routes = action_routes();
    let app = create_router(app_state, &routes);

    // 5. Serve
    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
