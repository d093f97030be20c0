use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use auth_service::auth::TokenService;
use auth_service::cache::{InMemoryCache, NoopCache, TokenCache};
use auth_service::configuration::get_configuration;
use auth_service::housekeeper::Housekeeper;
use auth_service::startup::run;
use auth_service::storage::{InMemoryStore, PostgresStore, Store};
use auth_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let store: Arc<dyn Store> = if configuration.database.in_memory {
        tracing::warn!("Using in-memory store; all state is lost on exit");
        Arc::new(InMemoryStore::new())
    } else {
        tracing::info!("Attempting to connect to database");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&configuration.database.connection_string())
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Database connection error",
                )
            })?;

        let store = PostgresStore::new(pool);
        store.migrate().await.map_err(|e| {
            tracing::error!("Failed to migrate the database: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
        })?;
        tracing::info!("Database ready");
        Arc::new(store)
    };

    let cache: Arc<dyn TokenCache> = if configuration.cache.enabled {
        Arc::new(InMemoryCache::new())
    } else {
        Arc::new(NoopCache)
    };

    let service = Arc::new(
        TokenService::new(store.clone(), &configuration.jwt)
            .with_cache(cache, configuration.cache.timeout())
            .with_span(tracing::info_span!("token_service")),
    );

    let housekeeper = Housekeeper::spawn(
        store,
        configuration.housekeeping.interval(),
        tracing::info_span!("housekeeper"),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, service.clone())?;
    let result = server.await;

    housekeeper.shutdown().await;
    service.close().await;
    tracing::info!("Shutdown complete");

    result
}
