use std::net::SocketAddr;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::info;

use coverletter_api::config::SimulatorConfig;
use coverletter_api::simulator::{build_router, SimulatorState, TokenBucket};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SimulatorConfig::from_env()?;
    coverletter_api::init_tracing(env!("CARGO_CRATE_NAME"), &config.rust_log);

    info!(
        capacity = config.capacity,
        refill_secs = config.refill_period.as_secs(),
        generate_delay_ms = config.generate_delay.as_millis() as u64,
        "Starting quota simulator"
    );

    let state = SimulatorState {
        bucket: TokenBucket::start(config.capacity, config.refill_period),
        generate_delay: config.generate_delay,
    };
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
