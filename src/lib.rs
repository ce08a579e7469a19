//! Dosecall: a medication reminder escalation engine.
//!
//! A patient gets a reminder message at dose time. No answer within 15
//! minutes brings an automated voice call; another silent 15 minutes
//! alerts the caregivers. A reply at any point confirms, snoozes or
//! skips the dose, cancels the remaining timers, and keeps the stock
//! ledger current. [`service::ReminderService`] is the front door.

pub mod config;
pub mod db;
pub mod escalation;
pub mod inbound;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod stock;
pub mod store;
pub mod transport;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Dosecall starting v{}", config::APP_VERSION);
}
