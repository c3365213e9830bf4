use std::sync::Arc;

use lottery_api::config::Config;
use lottery_api::db::{MemStorage, SharedStorage, SqliteStorage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lottery api server...");

    dotenvy::dotenv().ok();

    let config = Config::from_env().expect("Invalid server configuration");

    let store: SharedStorage = match &config.database_url {
        Some(url) => {
            let store = SqliteStorage::connect(url)
                .await
                .expect("Failed to open database");
            tracing::info!("Database connection established.");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using seeded in-memory store.");
            Arc::new(MemStorage::seeded())
        }
    };

    let addr = config.addr();
    let app = lottery_api::app(store);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server.");
}
