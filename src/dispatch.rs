use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::backend::{GenerationBackend, GenerationRequest};

pub const DEGRADED_MESSAGE: &str = "AI service is currently busy.";

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum InputError {
  #[error("message and files are both empty")]
  EmptyInput,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      initial_delay: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  fn delay_for(&self, attempt: u32) -> Duration {
    self
      .initial_delay
      .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)))
  }
}

#[derive(Debug, PartialEq)]
pub enum ChatResult {
  Success { model: String, reply: String },
  Degraded { message: &'static str },
  Rejected { reason: InputError },
}

pub struct Dispatcher {
  backends: Vec<Arc<dyn GenerationBackend>>,
  retry: RetryPolicy,
  deadline: Duration,
}

impl Dispatcher {
  pub fn new(
    backends: Vec<Arc<dyn GenerationBackend>>,
    retry: RetryPolicy,
    deadline: Duration,
  ) -> Self {
    Self {
      backends,
      retry,
      deadline,
    }
  }

  pub async fn dispatch(&self, request: &GenerationRequest) -> ChatResult {
    if request.content.is_empty() {
      return ChatResult::Rejected {
        reason: InputError::EmptyInput,
      };
    }
    let started = Instant::now();
    for backend in &self.backends {
      if started.elapsed() >= self.deadline {
        warn!(
          elapsed_ms = started.elapsed().as_millis() as u64,
          "dispatch deadline reached, giving up"
        );
        break;
      }
      let mut attempt = 1u32;
      loop {
        match backend.generate(request).await {
          Ok(reply) => {
            info!(backend = backend.name(), attempt, "backend answered");
            return ChatResult::Success {
              model: backend.name().to_string(),
              reply,
            };
          }
          Err(err) => {
            warn!(backend = backend.name(), attempt, error = %err, "backend attempt failed");
            // Rate limits back off on the same backend; anything else moves on.
            if !err.is_rate_limit() || attempt >= self.retry.max_attempts {
              break;
            }
            let delay = self.retry.delay_for(attempt);
            if started.elapsed() + delay >= self.deadline {
              break;
            }
            sleep(delay).await;
            attempt += 1;
          }
        }
      }
    }
    ChatResult::Degraded {
      message: DEGRADED_MESSAGE,
    }
  }
}
