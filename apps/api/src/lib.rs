//! Cover-letter generation backend: a rate-limited workflow queue in front of an
//! LLM provider, plus a token-bucket simulator of that provider's quota.

pub mod config;
pub mod errors;
pub mod llm_client;
pub mod pipeline;
pub mod retry;
pub mod routes;
pub mod simulator;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes structured logging. `RUST_LOG` wins when it parses as a filter;
/// otherwise `level` applies to this library and to the calling binary only.
pub fn init_tracing(binary: &str, level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={level},{binary}={level}",
                env!("CARGO_CRATE_NAME")
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
