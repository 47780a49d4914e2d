//! Test utilities and helpers
//!
//! Shared across module tests:
//! - Session and setup factories
//! - Mock brief and snapshot fixtures
//! - A scripted transport for exercising the router without a network

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmTransport, TransportError, TransportRequest};
use crate::models::brief::AthleteBrief;
use crate::models::diff::{DraftSnapshot, SnapshotSession, SnapshotWeek};
use crate::models::plan::{Discipline, Session, SessionType};
use crate::models::setup::{
  DisciplineEmphasis, NormalizedSetup, PlanSetup, RiskTolerance, WeeklyAvailability,
};

/// ---------------------------------------------------------------------------
/// Session factories
/// ---------------------------------------------------------------------------

/// Session with the discipline a setup-free scheduler would pick: bricks stay
/// bricks, technique means swim, everything else runs.
pub fn make_session(
  week_index: usize,
  day_of_week: u8,
  session_type: SessionType,
  duration_minutes: u32,
) -> Session {
  let discipline = match session_type {
    SessionType::Brick => Discipline::Brick,
    SessionType::Technique => Discipline::Swim,
    _ => Discipline::Run,
  };
  make_discipline_session(week_index, day_of_week, discipline, session_type, duration_minutes)
}

pub fn make_discipline_session(
  week_index: usize,
  day_of_week: u8,
  discipline: Discipline,
  session_type: SessionType,
  duration_minutes: u32,
) -> Session {
  Session {
    week_index: week_index as u32,
    ordinal: 0,
    day_of_week,
    discipline,
    session_type,
    duration_minutes,
    notes: None,
    locked: false,
    detail: None,
    detail_input_hash: None,
    detail_mode: None,
  }
}

/// ---------------------------------------------------------------------------
/// Setup fixtures
/// ---------------------------------------------------------------------------

/// Raw setup: 8 weeks, Mon/Wed/Fri/Sat, 300 weekly minutes, long day
/// Saturday.
pub fn mock_plan_setup() -> PlanSetup {
  PlanSetup {
    discipline_emphasis: Some(DisciplineEmphasis::Balanced),
    risk_tolerance: Some(RiskTolerance::Med),
    weekly_availability_days: Some(vec![1, 3, 5, 6]),
    weekly_availability_minutes: Some(WeeklyAvailability::Total(300)),
    max_intensity_days_per_week: Some(2),
    max_doubles_per_week: Some(0),
    long_session_day: Some(6),
    weeks_to_event: Some(8),
    ..PlanSetup::default()
  }
}

/// Normalized form of [`mock_plan_setup`].
pub fn mock_normalized_setup() -> NormalizedSetup {
  NormalizedSetup {
    discipline_emphasis: DisciplineEmphasis::Balanced,
    risk_tolerance: RiskTolerance::Med,
    weekly_availability_days: vec![1, 3, 5, 6],
    weekly_availability_minutes: 300,
    per_day_minutes: None,
    max_intensity_days_per_week: 2,
    max_doubles_per_week: 0,
    long_session_day: Some(6),
    program_policy: None,
    week_minute_overrides: std::collections::BTreeMap::new(),
    discipline_weights: None,
    type_weights: None,
    recovery_cadence: None,
    sessions_per_week: 4,
    week_start_day: 1,
    weeks_to_event: 8,
    start_date: None,
    coach_guidance: None,
  }
}

/// ---------------------------------------------------------------------------
/// Brief and snapshot fixtures
/// ---------------------------------------------------------------------------

pub fn mock_brief() -> AthleteBrief {
  AthleteBrief {
    goal_summary: "Finish a sprint triathlon comfortably".to_string(),
    disciplines: vec![Discipline::Run, Discipline::Bike, Discipline::Swim],
    constraints: vec!["left knee niggles on downhills".to_string()],
    coaching_tone: Some("encouraging, direct".to_string()),
    risk_flags: vec!["injury-history".to_string()],
  }
}

/// Two unlocked weeks; s2 (the week-0 long session) is locked.
pub fn mock_snapshot() -> DraftSnapshot {
  DraftSnapshot {
    weeks: vec![
      SnapshotWeek {
        week_index: 0,
        locked: false,
      },
      SnapshotWeek {
        week_index: 1,
        locked: false,
      },
    ],
    sessions: vec![
      SnapshotSession {
        id: "s1".to_string(),
        week_index: 0,
        ordinal: 0,
        day_of_week: 3,
        session_type: SessionType::Threshold,
        duration_minutes: 60,
        notes: None,
        locked: false,
      },
      SnapshotSession {
        id: "s2".to_string(),
        week_index: 0,
        ordinal: 1,
        day_of_week: 6,
        session_type: SessionType::Long,
        duration_minutes: 120,
        notes: None,
        locked: true,
      },
      SnapshotSession {
        id: "s3".to_string(),
        week_index: 1,
        ordinal: 0,
        day_of_week: 1,
        session_type: SessionType::Endurance,
        duration_minutes: 60,
        notes: None,
        locked: false,
      },
      SnapshotSession {
        id: "s4".to_string(),
        week_index: 1,
        ordinal: 1,
        day_of_week: 3,
        session_type: SessionType::Tempo,
        duration_minutes: 45,
        notes: None,
        locked: false,
      },
    ],
  }
}

/// ---------------------------------------------------------------------------
/// Scripted transport
/// ---------------------------------------------------------------------------

struct ScriptedResponse {
  delay: Option<Duration>,
  result: Result<String, TransportError>,
}

/// Transport that replays queued responses in order and records every
/// request it receives. An exhausted script surfaces as an API error.
#[derive(Default)]
pub struct ScriptedTransport {
  script: Mutex<VecDeque<ScriptedResponse>>,
  requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enqueue_ok(&self, json: &str) {
    self.push(ScriptedResponse {
      delay: None,
      result: Ok(json.to_string()),
    });
  }

  pub fn enqueue_err(&self, error: TransportError) {
    self.push(ScriptedResponse {
      delay: None,
      result: Err(error),
    });
  }

  pub fn enqueue_slow(&self, json: &str, delay: Duration) {
    self.push(ScriptedResponse {
      delay: Some(delay),
      result: Ok(json.to_string()),
    });
  }

  pub fn requests(&self) -> Vec<TransportRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  fn push(&self, response: ScriptedResponse) {
    self.script.lock().unwrap().push_back(response);
  }
}

#[async_trait]
impl LlmTransport for ScriptedTransport {
  async fn generate_json(&self, request: &TransportRequest) -> Result<String, TransportError> {
    self.requests.lock().unwrap().push(request.clone());
    let next = self.script.lock().unwrap().pop_front();
    match next {
      Some(response) => {
        if let Some(delay) = response.delay {
          tokio::time::sleep(delay).await;
        }
        response.result
      }
      None => Err(TransportError::Api("script exhausted".to_string())),
    }
  }
}
