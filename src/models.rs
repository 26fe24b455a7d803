use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct ChatRequest {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub files: Vec<UploadedFile>,
  #[serde(default, rename = "chatHistory")]
  pub chat_history: Vec<ChatTurn>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct UploadedFile {
  #[serde(default)]
  pub preview: String,
  pub r#type: Option<String>,
  pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ChatTurn {
  pub role: String,
  #[serde(alias = "content", alias = "message")]
  pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
  #[serde(rename = "aiResponse")]
  pub ai_response: String,
}

#[derive(Serialize, Deserialize)]
pub struct ModelsResponse {
  pub rotation: Vec<String>,
  pub available: Vec<String>,
}
