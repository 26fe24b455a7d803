use async_trait::async_trait;
use thiserror::Error;

use crate::content::ContentItem;
use crate::models::ChatTurn;

#[derive(Clone, Default)]
pub struct GenerationRequest {
  pub content: Vec<ContentItem>,
  pub instruction: Option<String>,
  pub history: Vec<ChatTurn>,
}

#[derive(Debug, Error)]
pub enum BackendError {
  #[error("request to backend failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("backend rate limited: {0}")]
  RateLimited(String),
  #[error("backend returned HTTP {status}: {detail}")]
  Upstream { status: u16, detail: String },
  #[error("backend reply was unreadable: {0}")]
  MalformedReply(String),
  #[error("backend reply was empty")]
  EmptyReply,
}

impl BackendError {
  pub fn is_rate_limit(&self) -> bool {
    matches!(self, BackendError::RateLimited(_))
  }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
  fn name(&self) -> &str;
  async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;
}
