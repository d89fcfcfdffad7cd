//! Market Data Admin - client for a market-data administration backend
//!
//! Browses the data collections of seven domains (bonds, funds, futures,
//! options, currencies, cryptos, stocks), exports and imports them, syncs
//! them from remote databases and follows backend refresh tasks to completion.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod security;
pub mod services;
pub mod state;
pub mod stores;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging on stderr so stdout stays machine readable
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketdata_admin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
