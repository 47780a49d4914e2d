use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::plan::{Discipline, SessionType};

/// ---------------------------------------------------------------------------
/// Clamp bounds (documented ranges for normalized setup fields)
/// ---------------------------------------------------------------------------

pub const MIN_WEEKS: u32 = 1;
pub const MAX_WEEKS: u32 = 52;

pub const MIN_WEEKLY_MINUTES: u32 = 60;
pub const MAX_WEEKLY_MINUTES: u32 = 1680;

pub const MIN_SESSIONS_PER_WEEK: u32 = 1;
pub const MAX_SESSIONS_PER_WEEK: u32 = 14;

pub const MIN_INTENSITY_DAYS: u8 = 1;
pub const MAX_INTENSITY_DAYS: u8 = 3;

pub const MAX_DOUBLES: u8 = 3;

pub const MIN_RECOVERY_EVERY_N: u32 = 2;
pub const MAX_RECOVERY_EVERY_N: u32 = 8;
pub const MIN_RECOVERY_MULTIPLIER: f64 = 0.4;
pub const MAX_RECOVERY_MULTIPLIER: f64 = 1.0;

/// Default week start day (Monday). Days use 0=Sunday .. 6=Saturday.
pub const DEFAULT_WEEK_START_DAY: u8 = 1;

/// ---------------------------------------------------------------------------
/// Setup enums
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisciplineEmphasis {
  Balanced,
  Swim,
  Bike,
  Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
  Low,
  Med,
  High,
}

/// Named program archetypes. Override tables live with the policy logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramPolicy {
  #[serde(rename = "COUCH_TO_5K")]
  CouchTo5k,
  #[serde(rename = "SPRINT_TO_OLYMPIC")]
  SprintToOlympic,
  #[serde(rename = "OLYMPIC_TO_FULL_DISTANCE")]
  OlympicToFullDistance,
  #[serde(rename = "HALF_TO_FULL_MARATHON")]
  HalfToFullMarathon,
  #[serde(rename = "BASE_BUILD")]
  BaseBuild,
}

/// ---------------------------------------------------------------------------
/// Availability and cadence
/// ---------------------------------------------------------------------------

/// Weekly availability minutes, either a single total or a per-day map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeeklyAvailability {
  Total(u32),
  PerDay(BTreeMap<u8, u32>),
}

impl WeeklyAvailability {
  pub fn total(&self) -> u32 {
    match self {
      WeeklyAvailability::Total(m) => *m,
      WeeklyAvailability::PerDay(map) => map.values().sum(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCadence {
  pub every_n: u32,
  pub multiplier: f64,
}

/// ---------------------------------------------------------------------------
/// Raw setup (wire input) and normalized setup (engine input)
/// ---------------------------------------------------------------------------

/// Raw setup as received from the API layer. Everything optional; the
/// normalizer resolves, clamps, and validates before the engine runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSetup {
  pub discipline_emphasis: Option<DisciplineEmphasis>,
  pub risk_tolerance: Option<RiskTolerance>,
  pub weekly_availability_days: Option<Vec<u8>>,
  pub weekly_availability_minutes: Option<WeeklyAvailability>,
  pub max_intensity_days_per_week: Option<u8>,
  pub max_doubles_per_week: Option<u8>,
  pub long_session_day: Option<u8>,
  pub program_policy: Option<String>,
  pub week_minute_overrides: Option<BTreeMap<u32, u32>>,
  pub discipline_weights: Option<BTreeMap<Discipline, f64>>,
  pub type_weights: Option<BTreeMap<SessionType, f64>>,
  pub recovery_cadence: Option<RecoveryCadence>,
  pub sessions_per_week: Option<u32>,
  pub week_start_day: Option<u8>,
  pub weeks_to_event: Option<u32>,
  pub start_date: Option<NaiveDate>,
  pub completion_date: Option<NaiveDate>,
  pub coach_guidance: Option<String>,
}

/// Fully resolved setup. Weekday lists are deduped and sorted, numerics are
/// clamped into their documented bounds, weight maps sum to 1.0. This is the
/// value embedded in serialized draft plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSetup {
  pub discipline_emphasis: DisciplineEmphasis,
  pub risk_tolerance: RiskTolerance,
  pub weekly_availability_days: Vec<u8>,
  pub weekly_availability_minutes: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub per_day_minutes: Option<BTreeMap<u8, u32>>,
  pub max_intensity_days_per_week: u8,
  pub max_doubles_per_week: u8,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub long_session_day: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub program_policy: Option<ProgramPolicy>,
  pub week_minute_overrides: BTreeMap<u32, u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discipline_weights: Option<BTreeMap<Discipline, f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub type_weights: Option<BTreeMap<SessionType, f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub recovery_cadence: Option<RecoveryCadence>,
  pub sessions_per_week: u32,
  pub week_start_day: u8,
  pub weeks_to_event: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coach_guidance: Option<String>,
}

impl NormalizedSetup {
  /// Days ordered relative to the configured week start, e.g. start=1 gives
  /// 1,2,..,6,0. Placement and tie-breaking follow this order.
  pub fn canonical_days(&self) -> Vec<u8> {
    let mut days = self.weekly_availability_days.clone();
    let start = self.week_start_day;
    days.sort_by_key(|d| (7 + *d as i16 - start as i16) % 7);
    days
  }

  pub fn discipline_in_scope(&self, discipline: Discipline) -> bool {
    match &self.discipline_weights {
      Some(weights) => weights.get(&discipline).copied().unwrap_or(0.0) > 0.0,
      None => discipline != Discipline::Brick,
    }
  }
}
