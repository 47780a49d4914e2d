use serde::{Deserialize, Serialize};

use super::plan::SessionType;

/// Adaptation triggers, in canonical processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerType {
  Soreness,
  TooHard,
  MissedKeySession,
  LowCompliance,
  HighCompliance,
}

/// ---------------------------------------------------------------------------
/// Draft snapshot (lock-aware view of an existing draft)
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWeek {
  pub week_index: u32,
  pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSession {
  pub id: String,
  pub week_index: u32,
  pub ordinal: u32,
  pub day_of_week: u8,
  #[serde(rename = "type")]
  pub session_type: SessionType,
  pub duration_minutes: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
  pub weeks: Vec<SnapshotWeek>,
  pub sessions: Vec<SnapshotSession>,
}

impl DraftSnapshot {
  pub fn week_locked(&self, week_index: u32) -> bool {
    self
      .weeks
      .iter()
      .any(|w| w.week_index == week_index && w.locked)
  }

  /// True when the session itself or its enclosing week is locked. Unknown
  /// session ids are treated as locked so no op can target them.
  pub fn session_locked(&self, session_id: &str) -> bool {
    match self.sessions.iter().find(|s| s.id == session_id) {
      Some(s) => s.locked || self.week_locked(s.week_index),
      None => true,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Diff operations
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlanDiffOp {
  ReduceDuration {
    session_id: String,
    duration_minutes: u32,
  },
  IncreaseDuration {
    session_id: String,
    duration_minutes: u32,
  },
  SetSessionType {
    session_id: String,
    #[serde(rename = "type")]
    session_type: SessionType,
  },
  RemoveSession {
    session_id: String,
  },
  AnnotateSession {
    session_id: String,
    note: String,
  },
}

impl PlanDiffOp {
  pub fn session_id(&self) -> &str {
    match self {
      PlanDiffOp::ReduceDuration { session_id, .. }
      | PlanDiffOp::IncreaseDuration { session_id, .. }
      | PlanDiffOp::SetSessionType { session_id, .. }
      | PlanDiffOp::RemoveSession { session_id }
      | PlanDiffOp::AnnotateSession { session_id, .. } => session_id,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDiff {
  pub ops: Vec<PlanDiffOp>,
  pub rationale_text: String,
  pub respects_locks: bool,
}
