use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use coverletter_api::config::Config;
use coverletter_api::llm_client::LlmClient;
use coverletter_api::pipeline::{WorkContext, WorkerPool, WorkflowRunner};
use coverletter_api::retry::CallExecutor;
use coverletter_api::routes::build_router;
use coverletter_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    coverletter_api::init_tracing(env!("CARGO_CRATE_NAME"), &config.rust_log);

    info!("Starting cover letter API v{}", env!("CARGO_PKG_VERSION"));

    let llm = LlmClient::new(config.provider_url.clone(), config.gemini_api_key.clone())?;
    info!(
        "LLM client initialized (model: {}, endpoint: {})",
        config.gemini_model,
        llm.endpoint()
    );

    let context = WorkContext::new();
    let policy = config.retry_policy();
    info!(
        strategy = ?policy.strategy(),
        max_attempts = ?config.retry_max_attempts,
        "Retry policy selected"
    );
    let executor = CallExecutor::new(policy, Arc::clone(&context.tracker));
    let runner = WorkflowRunner::new(Arc::new(llm), executor);

    let (shutdown_tx, _) = broadcast::channel(1);
    let workers = WorkerPool::new(config.worker_count, context.clone(), runner).spawn(&shutdown_tx);

    let state = AppState {
        context,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(());
    for worker in workers {
        worker.await?;
    }

    Ok(())
}
