//! AI capability routing
//!
//! Per-capability mode resolution, the attempt state machine, schema
//! validation of model output, deterministic fallback, and audit emission.
//!
//! The router never returns an error to its caller: every method either
//! receives a precomputed deterministic result or can build one without any
//! external dependency, so the fallback path cannot fail. Exactly one audit
//! record is emitted per invocation, success or fallback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{AiConfig, Capability};
use crate::llm::{LlmTransport, TransportRequest};
use crate::models::audit::{AiErrorCode, AiInvocationAudit, AiMode};
use crate::models::brief::{AthleteBrief, IntakePayload};
use crate::models::detail::SessionDetail;
use crate::models::diff::{DraftSnapshot, ProposalDiff, TriggerType};
use crate::models::plan::{
  DraftPlan, Session, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES, PLAN_VERSION,
};
use crate::models::setup::NormalizedSetup;
use crate::redact::redact_pii;
use crate::signals::classify_guidance;

const SPEC_VERSION: &str = "v1";
const PROVIDER_ANTHROPIC: &str = "anthropic";
const PROVIDER_BUILTIN: &str = "builtin";
const MODEL_DETERMINISTIC: &str = "deterministic";
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// ---------------------------------------------------------------------------
/// Audit sink
/// ---------------------------------------------------------------------------

/// Receives every invocation record. Persistence is the sink's problem; the
/// router only guarantees exactly one record per call.
pub trait AuditSink: Send + Sync {
  fn record(&self, audit: AiInvocationAudit);
}

#[derive(Default)]
pub struct MemoryAuditLog {
  records: Mutex<Vec<AiInvocationAudit>>,
}

impl MemoryAuditLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> Vec<AiInvocationAudit> {
    lock_or_recover(&self.records).clone()
  }
}

impl AuditSink for MemoryAuditLog {
  fn record(&self, audit: AiInvocationAudit) {
    lock_or_recover(&self.records).push(audit);
  }
}

/// ---------------------------------------------------------------------------
/// Invocation outcome
/// ---------------------------------------------------------------------------

/// Result of one invocation as seen by the caller. `value` is always
/// structurally valid; `fallback_used` says whether the deterministic path
/// produced it.
#[derive(Debug)]
pub struct Routed<T> {
  pub value: T,
  pub fallback_used: bool,
  pub effective_mode: AiMode,
}

enum AttemptOutcome<T> {
  Success(T),
  RetryableFailure(AiErrorCode),
  TerminalFailure(AiErrorCode),
}

/// ---------------------------------------------------------------------------
/// Router
/// ---------------------------------------------------------------------------

pub struct AiRouter {
  config: AiConfig,
  transport: Option<Arc<dyn LlmTransport>>,
  audit: Arc<dyn AuditSink>,
  rate_windows: Mutex<BTreeMap<Capability, Vec<Instant>>>,
}

impl AiRouter {
  /// `transport: None` is valid; llm-mode calls then fall back with
  /// `CONFIG_MISSING`.
  pub fn new(
    config: AiConfig,
    transport: Option<Arc<dyn LlmTransport>>,
    audit: Arc<dyn AuditSink>,
  ) -> Self {
    Self {
      config,
      transport,
      audit,
      rate_windows: Mutex::new(BTreeMap::new()),
    }
  }

  /// Derive an athlete brief from structured intake.
  pub async fn summarize_intake(&self, intake: &IntakePayload) -> Routed<AthleteBrief> {
    let fallback = deterministic_brief(intake);
    let input = serde_json::to_string(intake).unwrap_or_default();
    self
      .invoke(Capability::SummarizeIntake, input, fallback, validate_brief)
      .await
  }

  /// Suggest a full draft plan for a normalized setup. `fallback` is the
  /// engine-built plan for the same setup.
  pub async fn suggest_draft_plan(
    &self,
    setup: &NormalizedSetup,
    fallback: DraftPlan,
  ) -> Routed<DraftPlan> {
    let input = serde_json::to_string(setup).unwrap_or_default();
    let expected = setup.clone();
    self
      .invoke(Capability::SuggestDraftPlan, input, fallback, move |json| {
        validate_plan(json, &expected)
      })
      .await
  }

  /// Produce block-level detail for one session. `fallback` is the
  /// deterministic skeleton for the same session.
  pub async fn generate_session_detail(
    &self,
    session: &Session,
    brief: Option<&AthleteBrief>,
    fallback: SessionDetail,
  ) -> Routed<SessionDetail> {
    let input = serde_json::json!({
      "session": {
        "discipline": session.discipline,
        "type": session.session_type,
        "durationMinutes": session.duration_minutes,
        "notes": session.notes,
      },
      "brief": brief,
    })
    .to_string();
    let expected_minutes = session.duration_minutes;
    self
      .invoke(
        Capability::GenerateSessionDetail,
        input,
        fallback,
        move |json| validate_detail(json, expected_minutes),
      )
      .await
  }

  /// Propose adaptation ops for fired triggers against a lock-aware
  /// snapshot. `fallback` is the rule-built diff for the same input.
  pub async fn propose_plan_diff(
    &self,
    triggers: &BTreeSet<TriggerType>,
    snapshot: &DraftSnapshot,
    fallback: ProposalDiff,
  ) -> Routed<ProposalDiff> {
    let input = serde_json::json!({
      "triggers": triggers,
      "snapshot": snapshot,
    })
    .to_string();
    self
      .invoke(Capability::ProposePlanDiff, input, fallback, |json| {
        validate_diff(json, snapshot)
      })
      .await
  }

  /// One invocation: mode resolution, rate budget, attempt loop, fallback,
  /// audit.
  async fn invoke<T, F>(
    &self,
    capability: Capability,
    input_json: String,
    fallback: T,
    validate: F,
  ) -> Routed<T>
  where
    T: Serialize + Send,
    F: Fn(&str) -> Result<T, AiErrorCode> + Send + Sync,
  {
    let started = Instant::now();
    let effective_mode = self.config.effective_mode(capability);
    let input_hash = hash_payload(&input_json);

    if effective_mode == AiMode::Deterministic {
      let output = serde_json::to_string(&fallback).unwrap_or_default();
      self.audit.record(AiInvocationAudit {
        capability: capability.as_str().to_string(),
        spec_version: SPEC_VERSION.to_string(),
        effective_mode,
        provider: PROVIDER_BUILTIN.to_string(),
        model: MODEL_DETERMINISTIC.to_string(),
        input_hash,
        output_hash: hash_payload(&output),
        duration_ms: started.elapsed().as_millis() as u64,
        retry_count: 0,
        fallback_used: false,
        error_code: None,
        created_at: Utc::now(),
      });
      return Routed {
        value: fallback,
        fallback_used: false,
        effective_mode,
      };
    }

    let settings = self.config.settings(capability);
    let mut retry_count = 0u32;
    let mut error_code: Option<AiErrorCode> = None;
    let mut llm_value: Option<T> = None;

    let over_budget = settings
      .rate_limit_per_minute
      .is_some_and(|limit| !self.try_acquire_rate_slot(capability, limit));

    if over_budget {
      warn!(
        capability = capability.as_str(),
        "per-minute budget exhausted, skipping transport"
      );
      error_code = Some(AiErrorCode::ProviderError);
    } else {
      let message = format!(
        "{}\n\nRespond with valid JSON matching the OUTPUT FORMAT in your instructions.",
        input_json
      );
      let (redacted, stats) = redact_pii(&message);
      if stats.total() > 0 {
        debug!(
          capability = capability.as_str(),
          redactions = stats.total(),
          "redacted PII from capability input"
        );
      }
      let request = TransportRequest {
        capability,
        system_prompt: system_prompt(capability).to_string(),
        input: redacted,
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
      };

      loop {
        match self.attempt(&request, &validate).await {
          AttemptOutcome::Success(value) => {
            llm_value = Some(value);
            error_code = None;
            break;
          }
          AttemptOutcome::RetryableFailure(code) => {
            warn!(
              capability = capability.as_str(),
              error = code.as_str(),
              "attempt failed"
            );
            error_code = Some(code);
            if retry_count >= self.config.retries {
              break;
            }
            retry_count += 1;
          }
          AttemptOutcome::TerminalFailure(code) => {
            warn!(
              capability = capability.as_str(),
              error = code.as_str(),
              "attempt failed, not retryable"
            );
            error_code = Some(code);
            break;
          }
        }
      }
    }

    let fallback_used = llm_value.is_none();
    let value = match llm_value {
      Some(v) => v,
      None => fallback,
    };
    if fallback_used {
      info!(
        capability = capability.as_str(),
        retry_count, "falling back to deterministic result"
      );
    }
    let output = serde_json::to_string(&value).unwrap_or_default();
    self.audit.record(AiInvocationAudit {
      capability: capability.as_str().to_string(),
      spec_version: SPEC_VERSION.to_string(),
      effective_mode,
      provider: PROVIDER_ANTHROPIC.to_string(),
      model: settings.model.clone(),
      input_hash,
      output_hash: hash_payload(&output),
      duration_ms: started.elapsed().as_millis() as u64,
      retry_count,
      fallback_used,
      error_code,
      created_at: Utc::now(),
    });

    Routed {
      value,
      fallback_used,
      effective_mode,
    }
  }

  async fn attempt<T, F>(&self, request: &TransportRequest, validate: &F) -> AttemptOutcome<T>
  where
    F: Fn(&str) -> Result<T, AiErrorCode>,
  {
    let transport = match &self.transport {
      Some(t) => t,
      None => return AttemptOutcome::TerminalFailure(AiErrorCode::ConfigMissing),
    };
    match timeout(self.config.timeout, transport.generate_json(request)).await {
      Err(_) => AttemptOutcome::RetryableFailure(AiErrorCode::Timeout),
      Ok(Err(transport_err)) => {
        let code = transport_err.code();
        if code.is_retryable() {
          AttemptOutcome::RetryableFailure(code)
        } else {
          AttemptOutcome::TerminalFailure(code)
        }
      }
      Ok(Ok(json)) => match validate(&json) {
        Ok(value) => AttemptOutcome::Success(value),
        Err(code) => AttemptOutcome::RetryableFailure(code),
      },
    }
  }

  fn try_acquire_rate_slot(&self, capability: Capability, limit: u32) -> bool {
    let now = Instant::now();
    let mut windows = lock_or_recover(&self.rate_windows);
    let window = windows.entry(capability).or_default();
    window.retain(|t| now.duration_since(*t) < RATE_WINDOW);
    if (window.len() as u32) < limit {
      window.push(now);
      true
    } else {
      false
    }
  }
}

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

fn hash_payload(payload: &str) -> String {
  hex::encode(Sha256::digest(payload.as_bytes()))
}

fn system_prompt(capability: Capability) -> &'static str {
  match capability {
    Capability::SummarizeIntake => include_str!("prompts/summarize_intake.txt"),
    Capability::SuggestDraftPlan => include_str!("prompts/suggest_draft_plan.txt"),
    Capability::GenerateSessionDetail => include_str!("prompts/generate_session_detail.txt"),
    Capability::ProposePlanDiff => include_str!("prompts/propose_plan_diff.txt"),
  }
}

/// ---------------------------------------------------------------------------
/// Deterministic brief
/// ---------------------------------------------------------------------------

/// Assemble an athlete brief straight from the intake, lifting risk flags
/// from guidance classification. This is both the deterministic mode
/// implementation and the llm-mode fallback for `summarize_intake`.
pub fn deterministic_brief(intake: &IntakePayload) -> AthleteBrief {
  let signals = classify_guidance(intake.guidance.as_deref());
  let mut risk_flags = Vec::new();
  if signals.beginner {
    risk_flags.push("beginner".to_string());
  }
  if signals.injury {
    risk_flags.push("injury-history".to_string());
  }
  if signals.has_travel() {
    risk_flags.push("travel".to_string());
  }
  let goal_summary = if intake.goal_text.trim().is_empty() {
    "General aerobic fitness".to_string()
  } else {
    intake.goal_text.trim().to_string()
  };
  AthleteBrief {
    goal_summary,
    disciplines: intake.disciplines.clone(),
    constraints: intake.constraints.clone(),
    coaching_tone: intake.coaching_tone.clone(),
    risk_flags,
  }
}

/// ---------------------------------------------------------------------------
/// Output schema validation
/// ---------------------------------------------------------------------------

fn validate_brief(json: &str) -> Result<AthleteBrief, AiErrorCode> {
  let brief: AthleteBrief =
    serde_json::from_str(json).map_err(|_| AiErrorCode::InvalidJson)?;
  if brief.goal_summary.trim().is_empty() {
    return Err(AiErrorCode::SchemaValidationFailed);
  }
  Ok(brief)
}

fn validate_plan(json: &str, expected_setup: &NormalizedSetup) -> Result<DraftPlan, AiErrorCode> {
  let plan: DraftPlan = serde_json::from_str(json).map_err(|_| AiErrorCode::InvalidJson)?;
  if plan.version != PLAN_VERSION || plan.setup != *expected_setup || plan.weeks.is_empty() {
    return Err(AiErrorCode::SchemaValidationFailed);
  }
  for (index, week) in plan.weeks.iter().enumerate() {
    if week.week_index != index as u32 {
      return Err(AiErrorCode::SchemaValidationFailed);
    }
    for session in &week.sessions {
      let valid_day = session.day_of_week <= 6
        && expected_setup
          .weekly_availability_days
          .contains(&session.day_of_week);
      let valid_duration = (MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES)
        .contains(&session.duration_minutes);
      if session.week_index != week.week_index || !valid_day || !valid_duration {
        return Err(AiErrorCode::SchemaValidationFailed);
      }
    }
  }
  Ok(plan)
}

fn validate_detail(json: &str, expected_minutes: u32) -> Result<SessionDetail, AiErrorCode> {
  let detail: SessionDetail =
    serde_json::from_str(json).map_err(|_| AiErrorCode::InvalidJson)?;
  if detail.objective.trim().is_empty()
    || detail.structure.is_empty()
    || detail.total_minutes() != expected_minutes
  {
    return Err(AiErrorCode::SchemaValidationFailed);
  }
  Ok(detail)
}

/// Locked or unknown targets invalidate the whole response; `respectsLocks`
/// is recomputed here rather than trusted.
fn validate_diff(json: &str, snapshot: &DraftSnapshot) -> Result<ProposalDiff, AiErrorCode> {
  let mut diff: ProposalDiff =
    serde_json::from_str(json).map_err(|_| AiErrorCode::InvalidJson)?;
  for op in &diff.ops {
    if snapshot.session_locked(op.session_id()) {
      return Err(AiErrorCode::SchemaValidationFailed);
    }
  }
  diff.respects_locks = true;
  Ok(diff)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
