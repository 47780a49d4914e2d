//! Setup validation and normalization
//!
//! Resolves a raw `PlanSetup` into a fully clamped `NormalizedSetup`:
//! - derives the week count from ISO week boundaries when only dates are given
//! - dedupes, sorts, and range-checks weekday lists
//! - clamps numeric fields into their documented bounds
//! - normalizes weight distributions to sum 1.0
//!
//! Malformed input is rejected with a structured error, never coerced.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::models::setup::{
  NormalizedSetup, PlanSetup, ProgramPolicy, RecoveryCadence, DEFAULT_WEEK_START_DAY,
  MAX_DOUBLES, MAX_INTENSITY_DAYS, MAX_RECOVERY_EVERY_N, MAX_RECOVERY_MULTIPLIER,
  MAX_SESSIONS_PER_WEEK, MAX_WEEKLY_MINUTES, MAX_WEEKS, MIN_INTENSITY_DAYS,
  MIN_RECOVERY_EVERY_N, MIN_RECOVERY_MULTIPLIER, MIN_SESSIONS_PER_WEEK, MIN_WEEKLY_MINUTES,
  MIN_WEEKS,
};
use crate::models::setup::{DisciplineEmphasis, RiskTolerance};

#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
  #[error("either weeksToEvent or both startDate and completionDate must be provided")]
  MissingDuration,
  #[error("completionDate {completion} is before startDate {start}")]
  InvalidDateRange {
    start: NaiveDate,
    completion: NaiveDate,
  },
  #[error("weeklyAvailabilityMinutes is required")]
  MissingAvailability,
  #[error("day index {0} is outside 0-6")]
  DayOutOfRange(u8),
  #[error("unknown program policy \"{0}\"")]
  UnknownPolicy(String),
  #[error("{0} weights contain no positive entries")]
  EmptyWeights(&'static str),
}

impl SetupError {
  /// Stable error code surfaced to the API layer.
  pub fn code(&self) -> &'static str {
    "INVALID_SETUP"
  }
}

/// ---------------------------------------------------------------------------
/// Normalization
/// ---------------------------------------------------------------------------

pub fn normalize_setup(raw: &PlanSetup) -> Result<NormalizedSetup, SetupError> {
  let weeks_to_event = resolve_weeks(raw)?;

  let mut days = match &raw.weekly_availability_days {
    Some(list) => {
      for day in list {
        if *day > 6 {
          return Err(SetupError::DayOutOfRange(*day));
        }
      }
      let mut sorted = list.clone();
      sorted.sort_unstable();
      sorted.dedup();
      sorted
    }
    // No restriction given: every day is available.
    None => (0..=6).collect(),
  };
  days.shrink_to_fit();

  let availability = raw
    .weekly_availability_minutes
    .as_ref()
    .ok_or(SetupError::MissingAvailability)?;
  let weekly_minutes = availability
    .total()
    .clamp(MIN_WEEKLY_MINUTES, MAX_WEEKLY_MINUTES);
  let per_day_minutes = match availability {
    crate::models::setup::WeeklyAvailability::PerDay(map) => {
      for day in map.keys() {
        if *day > 6 {
          return Err(SetupError::DayOutOfRange(*day));
        }
      }
      Some(map.clone())
    }
    crate::models::setup::WeeklyAvailability::Total(_) => None,
  };

  if let Some(day) = raw.long_session_day {
    if day > 6 {
      return Err(SetupError::DayOutOfRange(day));
    }
  }
  let week_start_day = match raw.week_start_day {
    Some(day) if day > 6 => return Err(SetupError::DayOutOfRange(day)),
    Some(day) => day,
    None => DEFAULT_WEEK_START_DAY,
  };

  let program_policy = match &raw.program_policy {
    Some(name) => Some(
      name
        .parse::<ProgramPolicy>()
        .map_err(|_| SetupError::UnknownPolicy(name.clone()))?,
    ),
    None => None,
  };

  let week_minute_overrides = raw
    .week_minute_overrides
    .clone()
    .unwrap_or_default()
    .into_iter()
    .filter(|(week, _)| *week < weeks_to_event)
    .map(|(week, minutes)| (week, minutes.clamp(MIN_WEEKLY_MINUTES, MAX_WEEKLY_MINUTES)))
    .collect::<BTreeMap<u32, u32>>();

  let discipline_weights = match &raw.discipline_weights {
    Some(map) => Some(normalize_weights(map, "discipline")?),
    None => None,
  };
  let type_weights = match &raw.type_weights {
    Some(map) => Some(normalize_weights(map, "type")?),
    None => None,
  };

  let recovery_cadence = raw.recovery_cadence.map(|cadence| RecoveryCadence {
    every_n: cadence
      .every_n
      .clamp(MIN_RECOVERY_EVERY_N, MAX_RECOVERY_EVERY_N),
    multiplier: cadence
      .multiplier
      .clamp(MIN_RECOVERY_MULTIPLIER, MAX_RECOVERY_MULTIPLIER),
  });

  let sessions_per_week = raw
    .sessions_per_week
    .unwrap_or(days.len().max(1) as u32)
    .clamp(MIN_SESSIONS_PER_WEEK, MAX_SESSIONS_PER_WEEK);

  Ok(NormalizedSetup {
    discipline_emphasis: raw.discipline_emphasis.unwrap_or(DisciplineEmphasis::Balanced),
    risk_tolerance: raw.risk_tolerance.unwrap_or(RiskTolerance::Med),
    weekly_availability_days: days,
    weekly_availability_minutes: weekly_minutes,
    per_day_minutes,
    max_intensity_days_per_week: raw
      .max_intensity_days_per_week
      .unwrap_or(2)
      .clamp(MIN_INTENSITY_DAYS, MAX_INTENSITY_DAYS),
    max_doubles_per_week: raw.max_doubles_per_week.unwrap_or(0).min(MAX_DOUBLES),
    long_session_day: raw.long_session_day,
    program_policy,
    week_minute_overrides,
    discipline_weights,
    type_weights,
    recovery_cadence,
    sessions_per_week,
    week_start_day,
    weeks_to_event,
    start_date: raw.start_date,
    coach_guidance: raw.coach_guidance.clone(),
  })
}

fn resolve_weeks(raw: &PlanSetup) -> Result<u32, SetupError> {
  if let Some(weeks) = raw.weeks_to_event {
    return Ok(weeks.clamp(MIN_WEEKS, MAX_WEEKS));
  }
  match (raw.start_date, raw.completion_date) {
    (Some(start), Some(completion)) => {
      if completion < start {
        return Err(SetupError::InvalidDateRange { start, completion });
      }
      Ok(iso_week_count(start, completion).clamp(MIN_WEEKS, MAX_WEEKS))
    }
    _ => Err(SetupError::MissingDuration),
  }
}

/// Number of ISO weeks touched by the date range, inclusive on both ends.
fn iso_week_count(start: NaiveDate, completion: NaiveDate) -> u32 {
  let monday_of = |d: NaiveDate| d - chrono::Duration::days(d.weekday().num_days_from_monday() as i64);
  let span_days = (monday_of(completion) - monday_of(start)).num_days();
  (span_days / 7 + 1) as u32
}

/// Drop non-positive entries and rescale the rest to sum 1.0.
fn normalize_weights<K: Ord + Copy>(
  map: &BTreeMap<K, f64>,
  label: &'static str,
) -> Result<BTreeMap<K, f64>, SetupError> {
  let positive: BTreeMap<K, f64> = map
    .iter()
    .filter(|(_, w)| **w > 0.0 && w.is_finite())
    .map(|(k, w)| (*k, *w))
    .collect();
  if positive.is_empty() {
    return Err(SetupError::EmptyWeights(label));
  }
  let sum: f64 = positive.values().sum();
  Ok(positive.into_iter().map(|(k, w)| (k, w / sum)).collect())
}
