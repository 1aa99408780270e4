use crate::config::Config;
use crate::pipeline::WorkContext;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Queue and counters shared with the worker pool.
    pub context: WorkContext,
    pub config: Config,
}
