//! LLM transport
//!
//! Communication with the Claude API for capability invocations. The router
//! only talks to this through the `LlmTransport` trait, so tests can script
//! responses without touching the network.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Capability;
use crate::models::audit::AiErrorCode;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// ---------------------------------------------------------------------------
/// Error types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("ANTHROPIC_API_KEY is not set")]
  MissingApiKey,

  #[error("network failure: {0}")]
  Network(String),

  #[error("Claude API error: {0}")]
  Api(String),

  #[error("malformed model reply: {0}")]
  Malformed(String),
}

impl TransportError {
  /// The audit-taxonomy code this transport failure maps to. Timeouts are
  /// classified by the caller, which owns the deadline.
  pub fn code(&self) -> AiErrorCode {
    match self {
      TransportError::MissingApiKey => AiErrorCode::ConfigMissing,
      TransportError::Network(_) => AiErrorCode::Network,
      TransportError::Api(_) => AiErrorCode::ProviderError,
      TransportError::Malformed(_) => AiErrorCode::InvalidJson,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Transport trait
/// ---------------------------------------------------------------------------

/// One capability invocation as seen by a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
  pub capability: Capability,
  pub system_prompt: String,
  pub input: String,
  pub model: String,
  pub max_tokens: u32,
}

/// A JSON-producing model backend.
///
/// Implementations must be `Send + Sync` so one transport can serve
/// concurrent detail generation.
#[async_trait]
pub trait LlmTransport: Send + Sync {
  /// Run one generation and return the extracted JSON payload as a string.
  /// The caller parses and schema-checks it.
  async fn generate_json(&self, request: &TransportRequest) -> Result<String, TransportError>;
}

/// ---------------------------------------------------------------------------
/// Messages API wire format
/// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MessagesBody<'a> {
  model: &'a str,
  max_tokens: u32,
  system: &'a str,
  messages: [UserTurn<'a>; 1],
}

#[derive(Serialize)]
struct UserTurn<'a> {
  role: &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct MessagesReply {
  content: Vec<ReplyBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
  Text { text: String },
  #[serde(other)]
  Other,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
  error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude transport
/// ---------------------------------------------------------------------------

pub struct ClaudeTransport {
  client: Client,
  api_key: String,
  base_url: String,
}

impl ClaudeTransport {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      base_url: CLAUDE_API_URL.to_string(),
    }
  }

  /// Create a transport with the API key from the environment.
  pub fn from_env() -> Result<Self, TransportError> {
    let api_key =
      std::env::var("ANTHROPIC_API_KEY").map_err(|_| TransportError::MissingApiKey)?;
    Ok(Self::new(api_key))
  }

  /// Point the transport at a different messages endpoint (local test
  /// servers).
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }
}

#[async_trait]
impl LlmTransport for ClaudeTransport {
  async fn generate_json(&self, request: &TransportRequest) -> Result<String, TransportError> {
    debug!(
      capability = request.capability.as_str(),
      model = %request.model,
      input_len = request.input.len(),
      "calling Claude"
    );

    let body = MessagesBody {
      model: &request.model,
      max_tokens: request.max_tokens,
      system: &request.system_prompt,
      messages: [UserTurn {
        role: "user",
        content: &request.input,
      }],
    };

    let response = self
      .client
      .post(&self.base_url)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .json(&body)
      .send()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    let raw = response
      .text()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;

    if !status.is_success() {
      return Err(match serde_json::from_str::<ApiErrorEnvelope>(&raw) {
        Ok(envelope) => TransportError::Api(envelope.error.message),
        Err(_) => TransportError::Api(format!("status {status}: {raw}")),
      });
    }

    let reply: MessagesReply =
      serde_json::from_str(&raw).map_err(|e| TransportError::Malformed(e.to_string()))?;

    let text = reply
      .content
      .into_iter()
      .find_map(|block| match block {
        ReplyBlock::Text { text } => Some(text),
        ReplyBlock::Other => None,
      })
      .ok_or_else(|| TransportError::Malformed("reply carries no text block".to_string()))?;

    extract_json(&text)
  }
}

/// Pull the JSON object out of a model reply. Models wrap output in markdown
/// fences or surround it with prose often enough that a bare parse is not
/// enough.
fn extract_json(reply: &str) -> Result<String, TransportError> {
  let trimmed = reply.trim();
  if trimmed.starts_with('{') {
    return Ok(trimmed.to_string());
  }

  for opener in ["```json", "```"] {
    if let Some(candidate) = between_fences(reply, opener) {
      return Ok(candidate.to_string());
    }
  }

  // Outermost braces as a last resort.
  match (reply.find('{'), reply.rfind('}')) {
    (Some(open), Some(close)) if open < close => Ok(reply[open..=close].to_string()),
    _ => Err(TransportError::Malformed(
      "no JSON object in reply".to_string(),
    )),
  }
}

/// Body of the first code block opened by `opener`. A plain fence may carry
/// a language tag on its opening line; the body starts after it.
fn between_fences<'a>(reply: &'a str, opener: &str) -> Option<&'a str> {
  let start = reply.find(opener)? + opener.len();
  let rest = &reply[start..];
  let body = match rest.split_once('\n') {
    Some((first_line, tail)) if !first_line.contains('{') => tail,
    _ => rest,
  };
  let end = body.find("```")?;
  Some(body[..end].trim())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn request() -> TransportRequest {
    TransportRequest {
      capability: Capability::SummarizeIntake,
      system_prompt: "You are a coach.".to_string(),
      input: "intake".to_string(),
      model: "claude-sonnet-4-20250514".to_string(),
      max_tokens: 512,
    }
  }

  #[test]
  fn test_extract_json_direct() {
    let json = extract_json(r#"  {"goalSummary": "test"}  "#).unwrap();
    assert_eq!(json, r#"{"goalSummary": "test"}"#);
  }

  #[test]
  fn test_extract_json_json_fence() {
    let reply = "Here you go:\n\n```json\n{\"goalSummary\": \"steady build\"}\n```\n\nAnything else?";
    let json = extract_json(reply).unwrap();
    assert_eq!(json, r#"{"goalSummary": "steady build"}"#);
  }

  #[test]
  fn test_extract_json_plain_fence_skips_language_tag() {
    let reply = "```javascript\n{\"ok\": 1}\n```";
    let json = extract_json(reply).unwrap();
    assert_eq!(json, r#"{"ok": 1}"#);
  }

  #[test]
  fn test_extract_json_outermost_braces() {
    let json = extract_json(r#"The plan is {"goalSummary": "test"} as shown."#).unwrap();
    assert!(json.starts_with('{'));
    assert!(json.ends_with('}'));
  }

  #[test]
  fn test_extract_json_nothing_to_find() {
    assert!(extract_json("no json here").is_err());
  }

  #[test]
  fn test_error_codes_map_to_taxonomy() {
    assert_eq!(TransportError::MissingApiKey.code(), AiErrorCode::ConfigMissing);
    assert_eq!(TransportError::Network("x".into()).code(), AiErrorCode::Network);
    assert_eq!(TransportError::Api("x".into()).code(), AiErrorCode::ProviderError);
    assert_eq!(TransportError::Malformed("x".into()).code(), AiErrorCode::InvalidJson);
  }

  #[tokio::test]
  async fn test_generate_json_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/messages")
      .match_header("x-api-key", "test-key")
      .match_header("anthropic-version", API_VERSION)
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"content":[{"type":"text","text":"```json\n{\"ok\":true}\n```"}]}"#)
      .create_async()
      .await;

    let transport = ClaudeTransport::new("test-key")
      .with_base_url(format!("{}/v1/messages", server.url()));

    let json = transport.generate_json(&request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(json, r#"{"ok":true}"#);
  }

  #[tokio::test]
  async fn test_api_error_becomes_provider_error() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(429)
      .with_body(r#"{"error":{"type":"rate_limit_error","message":"rate limited"}}"#)
      .create_async()
      .await;

    let transport = ClaudeTransport::new("test-key")
      .with_base_url(format!("{}/v1/messages", server.url()));

    let err = transport.generate_json(&request()).await.unwrap_err();

    assert!(matches!(err, TransportError::Api(ref msg) if msg.contains("rate limited")));
    assert_eq!(err.code(), AiErrorCode::ProviderError);
  }

  #[tokio::test]
  async fn test_reply_without_text_block_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(r#"{"content":[{"type":"tool_use"}]}"#)
      .create_async()
      .await;

    let transport = ClaudeTransport::new("test-key")
      .with_base_url(format!("{}/v1/messages", server.url()));

    let err = transport.generate_json(&request()).await.unwrap_err();

    assert_eq!(err.code(), AiErrorCode::InvalidJson);
  }
}
