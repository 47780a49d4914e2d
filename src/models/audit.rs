use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
  Deterministic,
  Llm,
}

impl fmt::Display for AiMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AiMode::Deterministic => write!(f, "deterministic"),
      AiMode::Llm => write!(f, "llm"),
    }
  }
}

impl FromStr for AiMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "deterministic" => Ok(AiMode::Deterministic),
      "llm" => Ok(AiMode::Llm),
      other => Err(format!("unknown AI mode: {}", other)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Error taxonomy for capability invocations
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiErrorCode {
  ConfigMissing,
  Timeout,
  Network,
  InvalidJson,
  SchemaValidationFailed,
  ProviderError,
}

impl AiErrorCode {
  /// Missing credentials cannot be fixed by retrying; everything else can be.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, AiErrorCode::ConfigMissing)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      AiErrorCode::ConfigMissing => "CONFIG_MISSING",
      AiErrorCode::Timeout => "TIMEOUT",
      AiErrorCode::Network => "NETWORK",
      AiErrorCode::InvalidJson => "INVALID_JSON",
      AiErrorCode::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
      AiErrorCode::ProviderError => "PROVIDER_ERROR",
    }
  }
}

/// One append-only record per capability invocation, success or fallback.
/// Hashes cover serialized payloads; raw content is never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInvocationAudit {
  pub capability: String,
  pub spec_version: String,
  pub effective_mode: AiMode,
  pub provider: String,
  pub model: String,
  pub input_hash: String,
  pub output_hash: String,
  pub duration_ms: u64,
  pub retry_count: u32,
  pub fallback_used: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_code: Option<AiErrorCode>,
  pub created_at: DateTime<Utc>,
}
