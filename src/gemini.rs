use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, GenerationBackend, GenerationRequest};
use crate::content::ContentItem;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATE_METHOD: &str = "generateContent";
const DETAIL_LIMIT: usize = 240;
const RATE_LIMIT_MARKERS: [&str; 4] = [
  "resource_exhausted",
  "quota",
  "rate limit",
  "too many requests",
];

#[derive(Serialize, Deserialize, Clone)]
struct Content {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(untagged)]
enum Part {
  Text {
    text: String,
  },
  InlineData {
    #[serde(rename = "inlineData")]
    inline_data: InlineData,
  },
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  mime_type: String,
  data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  content: Option<Content>,
}

#[derive(Deserialize)]
struct ModelCatalog {
  #[serde(default)]
  models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
  name: String,
  #[serde(default)]
  supported_generation_methods: Vec<String>,
}

pub struct GeminiClient {
  http: reqwest::Client,
  base_url: String,
  api_key: String,
}

impl GeminiClient {
  pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key: api_key.to_string(),
    })
  }

  pub async fn generate(
    &self,
    model: &str,
    request: &GenerationRequest,
  ) -> Result<String, BackendError> {
    let url = format!("{}/models/{}:{}", self.base_url, model, GENERATE_METHOD);
    let payload = build_payload(request);
    let response = self
      .http
      .post(&url)
      .header(API_KEY_HEADER, &self.api_key)
      .json(&payload)
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify_failure(status.as_u16(), &body));
    }
    let reply: GenerateContentResponse = response
      .json()
      .await
      .map_err(|err| BackendError::MalformedReply(err.to_string()))?;
    reply_text(&reply).ok_or(BackendError::EmptyReply)
  }

  pub async fn list_models(&self) -> Result<Vec<String>, BackendError> {
    let url = format!("{}/models", self.base_url);
    let response = self
      .http
      .get(&url)
      .query(&[("pageSize", "1000")])
      .header(API_KEY_HEADER, &self.api_key)
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify_failure(status.as_u16(), &body));
    }
    let catalog: ModelCatalog = response
      .json()
      .await
      .map_err(|err| BackendError::MalformedReply(err.to_string()))?;
    Ok(generation_capable(catalog))
  }
}

pub struct GeminiBackend {
  model: String,
  client: Arc<GeminiClient>,
}

impl GeminiBackend {
  pub fn new(model: String, client: Arc<GeminiClient>) -> Self {
    Self { model, client }
  }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
  fn name(&self) -> &str {
    &self.model
  }

  async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
    self.client.generate(&self.model, request).await
  }
}

fn build_payload(request: &GenerationRequest) -> GenerateContentRequest {
  let mut contents: Vec<Content> = request
    .history
    .iter()
    .map(|turn| Content {
      role: Some(wire_role(&turn.role).to_string()),
      parts: vec![Part::Text {
        text: turn.text.clone(),
      }],
    })
    .collect();
  contents.push(Content {
    role: Some("user".to_string()),
    parts: request.content.iter().map(wire_part).collect(),
  });
  GenerateContentRequest {
    contents,
    system_instruction: request.instruction.as_ref().map(|text| Content {
      role: None,
      parts: vec![Part::Text { text: text.clone() }],
    }),
  }
}

fn wire_role(role: &str) -> &'static str {
  // Gemini accepts only user/model; front ends also say assistant, ai, bot.
  if role.eq_ignore_ascii_case("user") {
    "user"
  } else {
    "model"
  }
}

fn wire_part(item: &ContentItem) -> Part {
  match item {
    ContentItem::Text(text) => Part::Text { text: text.clone() },
    ContentItem::Image { data, mime } => Part::InlineData {
      inline_data: InlineData {
        mime_type: (*mime).to_string(),
        data: STANDARD.encode(data),
      },
    },
  }
}

fn reply_text(response: &GenerateContentResponse) -> Option<String> {
  let content = response.candidates.first()?.content.as_ref()?;
  let text: String = content
    .parts
    .iter()
    .filter_map(|part| match part {
      Part::Text { text } => Some(text.as_str()),
      _ => None,
    })
    .collect();
  if text.trim().is_empty() {
    None
  } else {
    Some(text)
  }
}

fn classify_failure(status: u16, body: &str) -> BackendError {
  let detail = excerpt(body);
  let lowered = body.to_lowercase();
  if status == 429
    || RATE_LIMIT_MARKERS
      .iter()
      .any(|marker| lowered.contains(marker))
  {
    BackendError::RateLimited(detail)
  } else {
    BackendError::Upstream { status, detail }
  }
}

fn excerpt(body: &str) -> String {
  let trimmed = body.trim();
  if trimmed.chars().count() <= DETAIL_LIMIT {
    trimmed.to_string()
  } else {
    let head: String = trimmed.chars().take(DETAIL_LIMIT).collect();
    format!("{head}...")
  }
}

fn generation_capable(catalog: ModelCatalog) -> Vec<String> {
  catalog
    .models
    .into_iter()
    .filter(|entry| {
      entry
        .supported_generation_methods
        .iter()
        .any(|method| method == GENERATE_METHOD)
    })
    .map(|entry| entry.name)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ChatTurn;
  use serde_json::json;

  fn image_item() -> ContentItem {
    ContentItem::Image {
      data: vec![1, 2, 3],
      mime: "image/png",
    }
  }

  #[test]
  fn payload_puts_history_before_current_turn() {
    let request = GenerationRequest {
      content: vec![ContentItem::Text("now".to_string())],
      instruction: None,
      history: vec![
        ChatTurn {
          role: "user".to_string(),
          text: "earlier".to_string(),
        },
        ChatTurn {
          role: "assistant".to_string(),
          text: "answer".to_string(),
        },
      ],
    };
    let value = serde_json::to_value(build_payload(&request)).expect("serialize");
    let contents = value["contents"].as_array().expect("contents");
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "now");
    assert!(value.get("systemInstruction").is_none());
  }

  #[test]
  fn payload_carries_instruction_when_configured() {
    let request = GenerationRequest {
      content: vec![ContentItem::Text("hi".to_string())],
      instruction: Some("be brief".to_string()),
      history: Vec::new(),
    };
    let value = serde_json::to_value(build_payload(&request)).expect("serialize");
    assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
  }

  #[test]
  fn image_items_serialize_as_inline_data() {
    let value = serde_json::to_value(wire_part(&image_item())).expect("serialize");
    assert_eq!(value["inlineData"]["mimeType"], "image/png");
    assert_eq!(value["inlineData"]["data"], STANDARD.encode([1u8, 2, 3]));
  }

  #[test]
  fn reply_text_concatenates_candidate_parts() {
    let response: GenerateContentResponse = serde_json::from_value(json!({
      "candidates": [{
        "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]}
      }]
    }))
    .expect("parse");
    assert_eq!(reply_text(&response).expect("reply"), "Hello there");
  }

  #[test]
  fn reply_without_candidates_is_empty() {
    let response: GenerateContentResponse = serde_json::from_value(json!({})).expect("parse");
    assert!(reply_text(&response).is_none());
  }

  #[test]
  fn blank_reply_is_empty() {
    let response: GenerateContentResponse = serde_json::from_value(json!({
      "candidates": [{"content": {"parts": [{"text": "   "}]}}]
    }))
    .expect("parse");
    assert!(reply_text(&response).is_none());
  }

  #[test]
  fn status_429_classifies_as_rate_limit() {
    assert!(classify_failure(429, "slow down").is_rate_limit());
  }

  #[test]
  fn quota_body_classifies_as_rate_limit() {
    let body = r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"out of quota"}}"#;
    assert!(classify_failure(400, body).is_rate_limit());
  }

  #[test]
  fn other_failures_keep_status_and_detail() {
    match classify_failure(500, "boom") {
      BackendError::Upstream { status, detail } => {
        assert_eq!(status, 500);
        assert_eq!(detail, "boom");
      }
      other => panic!("expected upstream error, got {other:?}"),
    }
  }

  #[test]
  fn long_error_bodies_are_excerpted() {
    let body = "x".repeat(DETAIL_LIMIT * 2);
    match classify_failure(500, &body) {
      BackendError::Upstream { detail, .. } => {
        assert!(detail.ends_with("..."));
        assert!(detail.chars().count() <= DETAIL_LIMIT + 3);
      }
      other => panic!("expected upstream error, got {other:?}"),
    }
  }

  #[test]
  fn catalog_filters_to_generation_capable_models() {
    let catalog: ModelCatalog = serde_json::from_value(json!({
      "models": [
        {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
        {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
        {"name": "models/unknown"}
      ]
    }))
    .expect("parse");
    assert_eq!(generation_capable(catalog), vec!["models/gemini-2.0-flash"]);
  }
}
