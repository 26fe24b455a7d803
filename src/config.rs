use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::RetryPolicy;
use crate::gemini::DEFAULT_BASE_URL;

pub const DEFAULT_MODELS: &str = "gemini-2.0-flash,gemini-1.5-flash";
pub const DEFAULT_PORT: u16 = 10000;

#[derive(Clone)]
pub struct AppConfig {
  pub api_key: String,
  pub base_url: String,
  pub port: u16,
  pub models: Vec<String>,
  pub system_instruction: Option<String>,
  pub static_dir: Option<PathBuf>,
  pub retry: RetryPolicy,
  pub deadline: Duration,
  pub http_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("GEMINI_API_KEY is not set; refusing to start without a credential")]
  MissingApiKey,
  #[error("{name} has unusable value {value:?}")]
  Invalid { name: &'static str, value: String },
  #[error("RELAY_MODELS names no models")]
  EmptyRotation,
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(&|name| std::env::var(name).ok())
  }

  fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let api_key = lookup("GEMINI_API_KEY")
      .map(|raw| raw.trim().to_string())
      .filter(|key| !key.is_empty())
      .ok_or(ConfigError::MissingApiKey)?;
    let base_url = lookup("GEMINI_BASE_URL")
      .map(|raw| raw.trim().to_string())
      .filter(|url| !url.is_empty())
      .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let port = parse_or(lookup, "PORT", DEFAULT_PORT)?;
    let models = parse_models(lookup("RELAY_MODELS"))?;
    let system_instruction = lookup("RELAY_SYSTEM_INSTRUCTION").filter(|v| !v.trim().is_empty());
    let static_dir = lookup("RELAY_STATIC_DIR")
      .map(|raw| raw.trim().to_string())
      .filter(|dir| !dir.is_empty())
      .map(PathBuf::from);
    let retry = RetryPolicy {
      max_attempts: parse_or(lookup, "RELAY_MAX_RETRIES", 5u32)?,
      initial_delay: Duration::from_millis(parse_or(lookup, "RELAY_RETRY_DELAY_MS", 1000u64)?),
    };
    let deadline = Duration::from_secs(parse_or(lookup, "RELAY_DEADLINE_SECS", 60u64)?);
    let http_timeout = Duration::from_secs(parse_or(lookup, "RELAY_HTTP_TIMEOUT_SECS", 30u64)?);
    Ok(Self {
      api_key,
      base_url,
      port,
      models,
      system_instruction,
      static_dir,
      retry,
      deadline,
      http_timeout,
    })
  }
}

fn parse_or<T: std::str::FromStr>(
  lookup: &dyn Fn(&str) -> Option<String>,
  name: &'static str,
  default: T,
) -> Result<T, ConfigError> {
  match lookup(name) {
    None => Ok(default),
    Some(raw) => {
      let trimmed = raw.trim();
      if trimmed.is_empty() {
        return Ok(default);
      }
      trimmed.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: trimmed.to_string(),
      })
    }
  }
}

fn parse_models(raw: Option<String>) -> Result<Vec<String>, ConfigError> {
  let list = raw.unwrap_or_else(|| DEFAULT_MODELS.to_string());
  let models: Vec<String> = list
    .split(',')
    .map(str::trim)
    .filter(|name| !name.is_empty())
    .map(str::to_string)
    .collect();
  if models.is_empty() {
    return Err(ConfigError::EmptyRotation);
  }
  Ok(models)
}
