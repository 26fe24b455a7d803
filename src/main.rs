mod backend;
mod config;
mod content;
mod dispatch;
mod gemini;
mod models;
mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backend::GenerationBackend;
use config::AppConfig;
use dispatch::Dispatcher;
use gemini::{GeminiBackend, GeminiClient};
use router::{run_router, RouterState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let config = AppConfig::from_env().context("configuration error")?;
  info!(port = config.port, models = ?config.models, "relay starting up");

  let client = Arc::new(
    GeminiClient::new(&config.base_url, &config.api_key, config.http_timeout)
      .context("failed to build http client")?,
  );
  let backends: Vec<Arc<dyn GenerationBackend>> = config
    .models
    .iter()
    .map(|model| {
      Arc::new(GeminiBackend::new(model.clone(), client.clone())) as Arc<dyn GenerationBackend>
    })
    .collect();
  let dispatcher = Dispatcher::new(backends, config.retry, config.deadline);

  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .with_context(|| format!("failed to bind {addr}"))?;
  info!(%addr, "listening");

  let state = RouterState {
    started_at: Instant::now(),
    config,
    dispatcher,
    gemini: client,
  };
  run_router(listener, state).await
}
