//! Training plan synthesis engine
//!
//! Builds deterministic multi-week endurance plans from a coach's setup,
//! with an optional AI layer routed per capability. The deterministic
//! pipeline (normalize, program policy, schedule, guardrails, humanize) is
//! the source of truth; every AI capability falls back to it and every
//! invocation is audited.

pub mod concurrent;
pub mod config;
pub mod detail;
pub mod diff;
pub mod generate;
pub mod guardrails;
pub mod llm;
pub mod models;
pub mod program;
pub mod redact;
pub mod rounding;
pub mod router;
pub mod scheduler;
pub mod setup;
pub mod signals;
pub mod update;

#[cfg(test)]
mod test_utils;

pub use config::{AiConfig, Capability};
pub use generate::{
  build_plan, generate_draft_plan, synthesize_plan_details, GeneratedPlan, PlanDiagnostics,
  PlanError,
};
pub use models::{
  AiInvocationAudit, AiMode, AthleteBrief, DraftPlan, IntakePayload, NormalizedSetup, PlanSetup,
  ProposalDiff, SessionDetail,
};
pub use router::{AiRouter, AuditSink, MemoryAuditLog, Routed};
pub use setup::normalize_setup;
pub use update::{
  update_draft_plan, DraftStore, MemoryDraftStore, StoreError, UpdateError, UpdateRequest,
};
