//! AI capability configuration
//!
//! Resolves the recognized options once at startup from environment-style
//! keys and hands an immutable typed value inward; nothing re-reads ambient
//! state mid-request. Recognized keys:
//!
//! - `TRAINER_AI_MODE`: `deterministic` | `llm` (default `deterministic`)
//! - `TRAINER_AI_MODE_<CAPABILITY>`: per-capability mode override
//! - `TRAINER_AI_MODEL_<CAPABILITY>`: model name for the LLM path
//! - `TRAINER_AI_MAX_TOKENS_<CAPABILITY>`: output token budget (1-8192)
//! - `TRAINER_AI_RATE_LIMIT_<CAPABILITY>`: calls per minute, 0 = unlimited
//! - `TRAINER_AI_RETRIES`: 0-2 (default 1)
//! - `TRAINER_AI_TIMEOUT_SECS`: 1-120 (default 20)
//! - `ANTHROPIC_API_KEY`: required only when a capability runs in llm mode

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::audit::AiMode;

/// ---------------------------------------------------------------------------
/// Defaults and bounds
/// ---------------------------------------------------------------------------

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_RETRIES: u32 = 1;
const MAX_RETRIES: u32 = 2;
const DEFAULT_TIMEOUT_SECS: u32 = 20;
const MAX_TIMEOUT_SECS: u32 = 120;
const MAX_OUTPUT_TOKENS: u32 = 8192;
const MAX_RATE_LIMIT_PER_MINUTE: u32 = 10_000;

/// ---------------------------------------------------------------------------
/// Capabilities
/// ---------------------------------------------------------------------------

/// One discrete AI-assisted operation, independently mode-switchable and
/// independently audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
  SummarizeIntake,
  SuggestDraftPlan,
  GenerateSessionDetail,
  ProposePlanDiff,
}

impl Capability {
  pub const ALL: [Capability; 4] = [
    Capability::SummarizeIntake,
    Capability::SuggestDraftPlan,
    Capability::GenerateSessionDetail,
    Capability::ProposePlanDiff,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Capability::SummarizeIntake => "summarize_intake",
      Capability::SuggestDraftPlan => "suggest_draft_plan",
      Capability::GenerateSessionDetail => "generate_session_detail",
      Capability::ProposePlanDiff => "propose_plan_diff",
    }
  }

  fn env_suffix(&self) -> &'static str {
    match self {
      Capability::SummarizeIntake => "SUMMARIZE_INTAKE",
      Capability::SuggestDraftPlan => "SUGGEST_DRAFT_PLAN",
      Capability::GenerateSessionDetail => "GENERATE_SESSION_DETAIL",
      Capability::ProposePlanDiff => "PROPOSE_PLAN_DIFF",
    }
  }

  fn default_max_tokens(&self) -> u32 {
    match self {
      Capability::SummarizeIntake => 512,
      Capability::SuggestDraftPlan => 4096,
      Capability::GenerateSessionDetail => 1024,
      Capability::ProposePlanDiff => 1024,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("invalid value for {key}: {value:?} (expected {expected})")]
  InvalidValue {
    key: String,
    value: String,
    expected: String,
  },
}

/// ---------------------------------------------------------------------------
/// Typed configuration
/// ---------------------------------------------------------------------------

/// Per-capability knobs. `mode: None` inherits the global mode.
#[derive(Debug, Clone)]
pub struct CapabilitySettings {
  pub mode: Option<AiMode>,
  pub model: String,
  pub max_tokens: u32,
  pub rate_limit_per_minute: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
  pub global_mode: AiMode,
  pub retries: u32,
  pub timeout: Duration,
  pub api_key: Option<String>,
  pub capabilities: BTreeMap<Capability, CapabilitySettings>,
}

impl AiConfig {
  /// Load configuration from the environment, validating every recognized
  /// key. Missing keys fall back to defaults; malformed values are errors.
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();

    let global_mode = parse_mode_var("TRAINER_AI_MODE")?.unwrap_or(AiMode::Deterministic);
    let retries =
      parse_u32_var("TRAINER_AI_RETRIES", 0, MAX_RETRIES)?.unwrap_or(DEFAULT_RETRIES);
    let timeout_secs = parse_u32_var("TRAINER_AI_TIMEOUT_SECS", 1, MAX_TIMEOUT_SECS)?
      .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let api_key = read_var("ANTHROPIC_API_KEY");

    let mut capabilities = BTreeMap::new();
    for capability in Capability::ALL {
      let suffix = capability.env_suffix();
      capabilities.insert(
        capability,
        CapabilitySettings {
          mode: parse_mode_var(&format!("TRAINER_AI_MODE_{suffix}"))?,
          model: read_var(&format!("TRAINER_AI_MODEL_{suffix}"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
          max_tokens: parse_u32_var(&format!("TRAINER_AI_MAX_TOKENS_{suffix}"), 1, MAX_OUTPUT_TOKENS)?
            .unwrap_or_else(|| capability.default_max_tokens()),
          rate_limit_per_minute: parse_u32_var(
            &format!("TRAINER_AI_RATE_LIMIT_{suffix}"),
            0,
            MAX_RATE_LIMIT_PER_MINUTE,
          )?
          .and_then(|v| (v > 0).then_some(v)),
        },
      );
    }

    Ok(Self {
      global_mode,
      retries,
      timeout: Duration::from_secs(timeout_secs as u64),
      api_key,
      capabilities,
    })
  }

  /// All capabilities deterministic with default knobs. Useful as a safe
  /// baseline and in tests.
  pub fn deterministic() -> Self {
    let capabilities = Capability::ALL
      .into_iter()
      .map(|capability| {
        (
          capability,
          CapabilitySettings {
            mode: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: capability.default_max_tokens(),
            rate_limit_per_minute: None,
          },
        )
      })
      .collect();
    Self {
      global_mode: AiMode::Deterministic,
      retries: DEFAULT_RETRIES,
      timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64),
      api_key: None,
      capabilities,
    }
  }

  pub fn effective_mode(&self, capability: Capability) -> AiMode {
    self
      .capabilities
      .get(&capability)
      .and_then(|settings| settings.mode)
      .unwrap_or(self.global_mode)
  }

  /// Settings for one capability, falling back to defaults if the entry is
  /// absent (possible only for hand-built configs).
  pub fn settings(&self, capability: Capability) -> CapabilitySettings {
    self
      .capabilities
      .get(&capability)
      .cloned()
      .unwrap_or(CapabilitySettings {
        mode: None,
        model: DEFAULT_MODEL.to_string(),
        max_tokens: capability.default_max_tokens(),
        rate_limit_per_minute: None,
      })
  }
}

/// ---------------------------------------------------------------------------
/// Env parsing helpers
/// ---------------------------------------------------------------------------

fn read_var(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn parse_mode_var(key: &str) -> Result<Option<AiMode>, ConfigError> {
  match read_var(key) {
    None => Ok(None),
    Some(raw) => raw
      .parse::<AiMode>()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw,
        expected: "deterministic or llm".to_string(),
      }),
  }
}

fn parse_u32_var(key: &str, min: u32, max: u32) -> Result<Option<u32>, ConfigError> {
  match read_var(key) {
    None => Ok(None),
    Some(raw) => match raw.parse::<u32>() {
      Ok(v) if (min..=max).contains(&v) => Ok(Some(v)),
      _ => Err(ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw,
        expected: format!("integer in {min}..={max}"),
      }),
    },
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const ALL_KEYS: [&str; 8] = [
    "TRAINER_AI_MODE",
    "TRAINER_AI_MODE_SUGGEST_DRAFT_PLAN",
    "TRAINER_AI_MODE_PROPOSE_PLAN_DIFF",
    "TRAINER_AI_RETRIES",
    "TRAINER_AI_TIMEOUT_SECS",
    "TRAINER_AI_MAX_TOKENS_SUGGEST_DRAFT_PLAN",
    "TRAINER_AI_RATE_LIMIT_GENERATE_SESSION_DETAIL",
    "ANTHROPIC_API_KEY",
  ];

  #[test]
  #[serial]
  fn test_defaults_when_env_is_empty() {
    temp_env::with_vars_unset(ALL_KEYS, || {
      let config = AiConfig::from_env().unwrap();

      assert_eq!(config.global_mode, AiMode::Deterministic);
      assert_eq!(config.retries, 1);
      assert_eq!(config.timeout, Duration::from_secs(20));
      assert_eq!(config.effective_mode(Capability::SuggestDraftPlan), AiMode::Deterministic);
      assert_eq!(config.settings(Capability::SuggestDraftPlan).max_tokens, 4096);
      assert_eq!(config.settings(Capability::SummarizeIntake).model, DEFAULT_MODEL);
    });
  }

  #[test]
  #[serial]
  fn test_capability_override_beats_global_mode() {
    temp_env::with_vars(
      [
        ("TRAINER_AI_MODE", Some("llm")),
        ("TRAINER_AI_MODE_PROPOSE_PLAN_DIFF", Some("deterministic")),
      ],
      || {
        let config = AiConfig::from_env().unwrap();

        assert_eq!(config.effective_mode(Capability::ProposePlanDiff), AiMode::Deterministic);
        assert_eq!(config.effective_mode(Capability::SummarizeIntake), AiMode::Llm);
      },
    );
  }

  #[test]
  #[serial]
  fn test_unknown_mode_is_rejected() {
    temp_env::with_var("TRAINER_AI_MODE", Some("turbo"), || {
      let result = AiConfig::from_env();
      assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    });
  }

  #[test]
  #[serial]
  fn test_retries_must_stay_in_range() {
    temp_env::with_var("TRAINER_AI_RETRIES", Some("5"), || {
      assert!(AiConfig::from_env().is_err());
    });
    temp_env::with_var("TRAINER_AI_RETRIES", Some("0"), || {
      assert_eq!(AiConfig::from_env().unwrap().retries, 0);
    });
  }

  #[test]
  #[serial]
  fn test_capability_knobs_parse() {
    temp_env::with_vars(
      [
        ("TRAINER_AI_MAX_TOKENS_SUGGEST_DRAFT_PLAN", Some("2000")),
        ("TRAINER_AI_RATE_LIMIT_GENERATE_SESSION_DETAIL", Some("3")),
      ],
      || {
        let config = AiConfig::from_env().unwrap();

        assert_eq!(config.settings(Capability::SuggestDraftPlan).max_tokens, 2000);
        assert_eq!(
          config.settings(Capability::GenerateSessionDetail).rate_limit_per_minute,
          Some(3)
        );
      },
    );
  }

  #[test]
  #[serial]
  fn test_zero_rate_limit_means_unlimited() {
    temp_env::with_var("TRAINER_AI_RATE_LIMIT_GENERATE_SESSION_DETAIL", Some("0"), || {
      let config = AiConfig::from_env().unwrap();
      assert_eq!(
        config.settings(Capability::GenerateSessionDetail).rate_limit_per_minute,
        None
      );
    });
  }
}
