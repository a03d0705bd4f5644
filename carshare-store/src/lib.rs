pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;

use carshare_core::{DocumentStore, LogNotifier, MemoryStore, Notifier};
use std::sync::Arc;
use tracing::info;

pub use app_config::{Config, StoreBackend};
pub use database::PgDocumentStore;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaNotifier};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Messaging error: {0}")]
    Messaging(String),
}

/// Build the document store selected by `store.backend`, running migrations
/// for Postgres.
pub async fn connect(config: &Config) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgDocumentStore::connect(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
            info!("Connected to Postgres document store");
            Ok(Arc::new(store))
        }
    }
}

/// Kafka when configured and compiled in, otherwise log-only delivery
pub fn notifier(config: &Config) -> Result<Arc<dyn Notifier>, StoreError> {
    match &config.kafka {
        #[cfg(feature = "kafka")]
        Some(kafka) => {
            let notifier = KafkaNotifier::new(kafka).map_err(|e| StoreError::Messaging(e.to_string()))?;
            info!("Publishing notifications to Kafka at {}", kafka.brokers);
            Ok(Arc::new(notifier))
        }
        #[cfg(not(feature = "kafka"))]
        Some(kafka) => {
            tracing::warn!("Kafka brokers {} configured but the kafka feature is off; logging notifications", kafka.brokers);
            Ok(Arc::new(LogNotifier))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}
