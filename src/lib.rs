pub mod config;
pub mod models;
pub mod events;
pub mod resilience;
pub mod integrity;
pub mod db;
pub mod pipeline;
pub mod service;

pub use service::{BriefStatus, FilingService, SubmitOutcome};

use tracing_subscriber::EnvFilter;

/// Initialize tracing. Call once from the embedding process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
