use serde::{Deserialize, Serialize};

use super::detail::{DetailMode, SessionDetail};
use super::setup::NormalizedSetup;

/// Schema version emitted in every serialized draft plan.
pub const PLAN_VERSION: &str = "v1";

/// Valid range for a single session's duration, in minutes.
pub const MIN_SESSION_MINUTES: u32 = 20;
pub const MAX_SESSION_MINUTES: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
  Run,
  Bike,
  Swim,
  Brick,
}

impl Discipline {
  pub fn as_str(&self) -> &'static str {
    match self {
      Discipline::Run => "run",
      Discipline::Bike => "bike",
      Discipline::Swim => "swim",
      Discipline::Brick => "brick",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
  Endurance,
  Long,
  Brick,
  Technique,
  Tempo,
  Threshold,
}

impl SessionType {
  /// Tempo and threshold count against the weekly intensity-day budget.
  pub fn is_intensity(&self) -> bool {
    matches!(self, SessionType::Tempo | SessionType::Threshold)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      SessionType::Endurance => "endurance",
      SessionType::Long => "long",
      SessionType::Brick => "brick",
      SessionType::Technique => "technique",
      SessionType::Tempo => "tempo",
      SessionType::Threshold => "threshold",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub week_index: u32,
  /// Stable display-sort key after day-based sorting.
  pub ordinal: u32,
  pub day_of_week: u8,
  pub discipline: Discipline,
  #[serde(rename = "type")]
  pub session_type: SessionType,
  pub duration_minutes: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub locked: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail: Option<SessionDetail>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail_input_hash: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail_mode: Option<DetailMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
  pub week_index: u32,
  pub locked: bool,
  pub sessions: Vec<Session>,
}

impl Week {
  pub fn total_minutes(&self) -> u32 {
    self.sessions.iter().map(|s| s.duration_minutes).sum()
  }
}

/// A complete, versioned, not-yet-approved multi-week schedule. Pure value:
/// every transformation returns a new plan rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPlan {
  pub version: String,
  pub setup: NormalizedSetup,
  pub weeks: Vec<Week>,
}

impl DraftPlan {
  pub fn new(setup: NormalizedSetup, weeks: Vec<Week>) -> Self {
    Self {
      version: PLAN_VERSION.to_string(),
      setup,
      weeks,
    }
  }
}
