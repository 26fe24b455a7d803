use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backend::GenerationRequest;
use crate::config::AppConfig;
use crate::content::normalize;
use crate::dispatch::{ChatResult, Dispatcher};
use crate::gemini::GeminiClient;
use crate::models::{ChatRequest, ChatResponse, ModelsResponse};

pub const MODEL_HEADER: &str = "x-relay-model";

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub struct RouterState {
  pub started_at: Instant,
  pub config: AppConfig,
  pub dispatcher: Dispatcher,
  pub gemini: Arc<GeminiClient>,
}

pub fn build_router(state: Arc<RouterState>) -> Router {
  let mut app = Router::new()
    .route("/", get(status))
    .route("/chat", post(chat))
    .route("/models", get(models));
  if let Some(dir) = &state.config.static_dir {
    // The fallback goes in before the layers so static responses pass through them too.
    app = app.fallback_service(ServeDir::new(dir));
  }
  app
    .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(state)
}

pub async fn run_router(listener: TcpListener, state: RouterState) -> anyhow::Result<()> {
  let app = build_router(Arc::new(state));
  axum::serve(listener, app).await?;
  Ok(())
}

async fn status(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "Online",
    "uptime_ms": uptime
  }))
}

async fn models(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
  match state.gemini.list_models().await {
    Ok(available) => (
      StatusCode::OK,
      Json(ModelsResponse {
        rotation: state.config.models.clone(),
        available,
      }),
    )
      .into_response(),
    Err(err) => {
      warn!(error = %err, "model listing failed");
      error_response(
        StatusCode::BAD_GATEWAY,
        "list_models_failed",
        "Could not reach the model catalog.",
      )
    }
  }
}

async fn chat(
  State(state): State<Arc<RouterState>>,
  Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
  let normalized = normalize(&req.message, &req.files);
  for skip in &normalized.skipped {
    warn!(file = %skip.label, reason = %skip.reason, "dropping attachment");
  }
  if normalized.items.is_empty() {
    return error_response(
      StatusCode::BAD_REQUEST,
      "empty_request",
      "Send a message or at least one readable image.",
    );
  }

  let request = GenerationRequest {
    content: normalized.items,
    instruction: state.config.system_instruction.clone(),
    history: req.chat_history,
  };
  match state.dispatcher.dispatch(&request).await {
    ChatResult::Success { model, reply } => {
      info!(model = %model, "chat served");
      let mut response =
        (StatusCode::OK, Json(ChatResponse { ai_response: reply })).into_response();
      if let Ok(value) = HeaderValue::from_str(&model) {
        response.headers_mut().insert(MODEL_HEADER, value);
      }
      response
    }
    ChatResult::Degraded { message } => (
      StatusCode::SERVICE_UNAVAILABLE,
      Json(ChatResponse {
        ai_response: message.to_string(),
      }),
    )
      .into_response(),
    ChatResult::Rejected { reason } => {
      error_response(StatusCode::BAD_REQUEST, "empty_request", &reason.to_string())
    }
  }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message, "code": code }));
  (status, body).into_response()
}
