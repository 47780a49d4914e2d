//! Program policy archetypes and the weekly minutes curve
//!
//! An archetype overrides setup fields (emphasis, risk, caps, weight
//! distributions, recovery cadence) and contributes a ramp start fraction.
//! The curve itself applies to every plan: ramp across build weeks, recovery
//! dips every Nth week, taper multipliers on the final weeks, explicit
//! per-week overrides winning over all of it.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::plan::{Discipline, SessionType};
use crate::models::setup::{
  DisciplineEmphasis, NormalizedSetup, ProgramPolicy, RecoveryCadence, RiskTolerance,
};

/// ---------------------------------------------------------------------------
/// Archetype profiles
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyProfile {
  pub emphasis: Option<DisciplineEmphasis>,
  pub risk: Option<RiskTolerance>,
  pub max_intensity_days: Option<u8>,
  pub max_doubles: Option<u8>,
  pub discipline_weights: Option<BTreeMap<Discipline, f64>>,
  pub type_weights: Option<BTreeMap<SessionType, f64>>,
  pub recovery: Option<RecoveryCadence>,
  pub beginner: bool,
  /// First build week's minutes as a fraction of weekly availability.
  pub ramp_start_fraction: f64,
}

impl ProgramPolicy {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgramPolicy::CouchTo5k => "COUCH_TO_5K",
      ProgramPolicy::SprintToOlympic => "SPRINT_TO_OLYMPIC",
      ProgramPolicy::OlympicToFullDistance => "OLYMPIC_TO_FULL_DISTANCE",
      ProgramPolicy::HalfToFullMarathon => "HALF_TO_FULL_MARATHON",
      ProgramPolicy::BaseBuild => "BASE_BUILD",
    }
  }

  pub fn profile(&self) -> PolicyProfile {
    match self {
      ProgramPolicy::CouchTo5k => PolicyProfile {
        emphasis: Some(DisciplineEmphasis::Run),
        risk: Some(RiskTolerance::Low),
        max_intensity_days: Some(1),
        max_doubles: Some(0),
        discipline_weights: Some(weights(&[(Discipline::Run, 1.0)])),
        type_weights: Some(type_weights(&[
          (SessionType::Endurance, 0.75),
          (SessionType::Tempo, 0.25),
        ])),
        recovery: Some(RecoveryCadence {
          every_n: 4,
          multiplier: 0.8,
        }),
        beginner: true,
        ramp_start_fraction: 0.5,
      },
      ProgramPolicy::SprintToOlympic => PolicyProfile {
        emphasis: Some(DisciplineEmphasis::Balanced),
        risk: Some(RiskTolerance::Med),
        max_intensity_days: Some(2),
        max_doubles: Some(1),
        discipline_weights: Some(weights(&[
          (Discipline::Run, 0.34),
          (Discipline::Bike, 0.33),
          (Discipline::Swim, 0.33),
        ])),
        type_weights: None,
        recovery: Some(RecoveryCadence {
          every_n: 3,
          multiplier: 0.75,
        }),
        beginner: false,
        ramp_start_fraction: 0.6,
      },
      ProgramPolicy::OlympicToFullDistance => PolicyProfile {
        emphasis: Some(DisciplineEmphasis::Bike),
        risk: Some(RiskTolerance::Med),
        max_intensity_days: Some(2),
        max_doubles: Some(2),
        discipline_weights: Some(weights(&[
          (Discipline::Run, 0.35),
          (Discipline::Bike, 0.45),
          (Discipline::Swim, 0.20),
        ])),
        type_weights: None,
        recovery: Some(RecoveryCadence {
          every_n: 3,
          multiplier: 0.7,
        }),
        beginner: false,
        ramp_start_fraction: 0.55,
      },
      ProgramPolicy::HalfToFullMarathon => PolicyProfile {
        emphasis: Some(DisciplineEmphasis::Run),
        risk: Some(RiskTolerance::Med),
        max_intensity_days: Some(2),
        max_doubles: Some(0),
        discipline_weights: Some(weights(&[
          (Discipline::Run, 0.85),
          (Discipline::Bike, 0.15),
        ])),
        type_weights: None,
        recovery: Some(RecoveryCadence {
          every_n: 4,
          multiplier: 0.75,
        }),
        beginner: false,
        ramp_start_fraction: 0.6,
      },
      ProgramPolicy::BaseBuild => PolicyProfile {
        emphasis: None,
        risk: None,
        max_intensity_days: Some(1),
        max_doubles: None,
        discipline_weights: None,
        type_weights: Some(type_weights(&[
          (SessionType::Endurance, 0.8),
          (SessionType::Tempo, 0.2),
        ])),
        recovery: Some(RecoveryCadence {
          every_n: 4,
          multiplier: 0.8,
        }),
        beginner: false,
        ramp_start_fraction: 0.7,
      },
    }
  }

  pub fn implies_beginner(&self) -> bool {
    self.profile().beginner
  }
}

impl FromStr for ProgramPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "COUCH_TO_5K" => Ok(ProgramPolicy::CouchTo5k),
      "SPRINT_TO_OLYMPIC" => Ok(ProgramPolicy::SprintToOlympic),
      "OLYMPIC_TO_FULL_DISTANCE" => Ok(ProgramPolicy::OlympicToFullDistance),
      "HALF_TO_FULL_MARATHON" => Ok(ProgramPolicy::HalfToFullMarathon),
      "BASE_BUILD" => Ok(ProgramPolicy::BaseBuild),
      other => Err(format!("unknown program policy: {}", other)),
    }
  }
}

fn weights(entries: &[(Discipline, f64)]) -> BTreeMap<Discipline, f64> {
  entries.iter().copied().collect()
}

fn type_weights(entries: &[(SessionType, f64)]) -> BTreeMap<SessionType, f64> {
  entries.iter().copied().collect()
}

/// ---------------------------------------------------------------------------
/// Policy application
/// ---------------------------------------------------------------------------

/// Apply archetype overrides onto a normalized setup. Archetype-defined
/// fields win over user-supplied values; undefined fields pass through.
pub fn apply_program_policy(setup: &NormalizedSetup) -> NormalizedSetup {
  let policy = match setup.program_policy {
    Some(p) => p,
    None => return setup.clone(),
  };
  let profile = policy.profile();
  let mut out = setup.clone();

  if let Some(emphasis) = profile.emphasis {
    out.discipline_emphasis = emphasis;
  }
  if let Some(risk) = profile.risk {
    out.risk_tolerance = risk;
  }
  if let Some(cap) = profile.max_intensity_days {
    out.max_intensity_days_per_week = cap;
  }
  if let Some(cap) = profile.max_doubles {
    out.max_doubles_per_week = cap;
  }
  if let Some(weights) = profile.discipline_weights {
    out.discipline_weights = Some(weights);
  }
  if let Some(weights) = profile.type_weights {
    out.type_weights = Some(weights);
  }
  if let Some(recovery) = profile.recovery {
    out.recovery_cadence = Some(recovery);
  }
  out
}

/// ---------------------------------------------------------------------------
/// Weekly minutes curve
/// ---------------------------------------------------------------------------

/// Taper length by plan length: nothing under 4 weeks, up to 3 final weeks
/// for plans of 10 or more.
pub fn taper_week_count(total_weeks: u32) -> usize {
  match total_weeks {
    0..=3 => 0,
    4..=5 => 1,
    6..=9 => 2,
    _ => 3,
  }
}

fn taper_multipliers(taper_len: usize) -> &'static [f64] {
  match taper_len {
    1 => &[0.70],
    2 => &[0.75, 0.55],
    3 => &[0.80, 0.65, 0.50],
    _ => &[],
  }
}

/// Target minutes per week, before any travel reduction. Length equals
/// `weeks_to_event`.
pub fn weekly_minutes_curve(setup: &NormalizedSetup) -> Vec<u32> {
  let total = setup.weeks_to_event as usize;
  let avail = setup.weekly_availability_minutes as f64;
  let taper_len = taper_week_count(setup.weeks_to_event).min(total.saturating_sub(1));
  let build = total - taper_len;
  let ramp_start = setup
    .program_policy
    .map(|p| p.profile().ramp_start_fraction)
    .unwrap_or(1.0);

  let mut curve = Vec::with_capacity(total);
  for w in 0..build {
    let frac = if build <= 1 {
      1.0
    } else {
      w as f64 / (build - 1) as f64
    };
    let mut minutes = avail * (ramp_start + (1.0 - ramp_start) * frac);
    if let Some(cadence) = setup.recovery_cadence {
      if cadence.every_n > 0 && (w as u32 + 1) % cadence.every_n == 0 {
        minutes *= cadence.multiplier;
      }
    }
    curve.push(minutes.round() as u32);
  }
  for multiplier in taper_multipliers(taper_len) {
    curve.push((avail * multiplier).round() as u32);
  }

  for (week, minutes) in &setup.week_minute_overrides {
    if let Some(slot) = curve.get_mut(*week as usize) {
      *slot = *minutes;
    }
  }
  curve
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::mock_normalized_setup;

  #[test]
  fn test_taper_week_count_buckets() {
    assert_eq!(taper_week_count(1), 0);
    assert_eq!(taper_week_count(3), 0);
    assert_eq!(taper_week_count(4), 1);
    assert_eq!(taper_week_count(5), 1);
    assert_eq!(taper_week_count(6), 2);
    assert_eq!(taper_week_count(9), 2);
    assert_eq!(taper_week_count(10), 3);
    assert_eq!(taper_week_count(52), 3);
  }

  #[test]
  fn test_flat_curve_with_taper() {
    // 8-week plan, no policy: flat 300 through week 5, taper weeks 6-7
    let setup = mock_normalized_setup();

    let curve = weekly_minutes_curve(&setup);

    assert_eq!(curve.len(), 8);
    assert!(curve[..6].iter().all(|m| *m == 300));
    assert_eq!(curve[6], 225);
    assert_eq!(curve[7], 165);
  }

  #[test]
  fn test_couch_to_5k_ramps_with_dips_then_tapers() {
    let mut setup = mock_normalized_setup();
    setup.weeks_to_event = 12;
    setup.weekly_availability_minutes = 240;
    setup.program_policy = Some(ProgramPolicy::CouchTo5k);
    let setup = apply_program_policy(&setup);

    let curve = weekly_minutes_curve(&setup);

    assert_eq!(curve.len(), 12);
    // Build weeks ramp 120 -> 240; every 4th build week dips
    assert_eq!(curve[0], 120);
    assert_eq!(curve[8], 240);
    assert!(curve[3] < curve[2], "week 3 should dip below trend");
    assert!(curve[4] > curve[3]);
    assert!(curve[7] < curve[6]);
    // Non-dip build weeks strictly increase
    let steady: Vec<u32> = [0usize, 1, 2, 4, 5, 6, 8].iter().map(|w| curve[*w]).collect();
    assert!(steady.windows(2).all(|pair| pair[0] < pair[1]));
    // Final three weeks taper
    assert_eq!(curve[9], 192);
    assert_eq!(curve[10], 156);
    assert_eq!(curve[11], 120);
  }

  #[test]
  fn test_recovery_cadence_without_policy() {
    let mut setup = mock_normalized_setup();
    setup.recovery_cadence = Some(RecoveryCadence {
      every_n: 3,
      multiplier: 0.5,
    });

    let curve = weekly_minutes_curve(&setup);

    assert_eq!(curve[2], 150);
    assert_eq!(curve[5], 150);
    assert_eq!(curve[0], 300);
    assert_eq!(curve[4], 300);
  }

  #[test]
  fn test_explicit_week_override_wins() {
    let mut setup = mock_normalized_setup();
    setup.week_minute_overrides.insert(2, 111);
    setup.week_minute_overrides.insert(7, 99);

    let curve = weekly_minutes_curve(&setup);

    assert_eq!(curve[2], 111);
    assert_eq!(curve[7], 99, "override beats taper");
  }

  #[test]
  fn test_single_week_plan_has_no_taper() {
    let mut setup = mock_normalized_setup();
    setup.weeks_to_event = 1;

    let curve = weekly_minutes_curve(&setup);

    assert_eq!(curve, vec![300]);
  }

  #[test]
  fn test_policy_overrides_replace_setup_fields() {
    let mut setup = mock_normalized_setup();
    setup.max_intensity_days_per_week = 3;
    setup.program_policy = Some(ProgramPolicy::CouchTo5k);

    let applied = apply_program_policy(&setup);

    assert_eq!(applied.discipline_emphasis, DisciplineEmphasis::Run);
    assert_eq!(applied.risk_tolerance, RiskTolerance::Low);
    assert_eq!(applied.max_intensity_days_per_week, 1);
    assert_eq!(applied.max_doubles_per_week, 0);
    let weights = applied.discipline_weights.unwrap();
    assert_eq!(weights.len(), 1);
    assert!((weights[&Discipline::Run] - 1.0).abs() < 1e-9);
  }

  #[test]
  fn test_base_build_keeps_user_emphasis() {
    let mut setup = mock_normalized_setup();
    setup.discipline_emphasis = DisciplineEmphasis::Swim;
    setup.program_policy = Some(ProgramPolicy::BaseBuild);

    let applied = apply_program_policy(&setup);

    assert_eq!(applied.discipline_emphasis, DisciplineEmphasis::Swim);
    assert_eq!(applied.max_intensity_days_per_week, 1);
  }

  #[test]
  fn test_policy_names_round_trip() {
    for policy in [
      ProgramPolicy::CouchTo5k,
      ProgramPolicy::SprintToOlympic,
      ProgramPolicy::OlympicToFullDistance,
      ProgramPolicy::HalfToFullMarathon,
      ProgramPolicy::BaseBuild,
    ] {
      assert_eq!(policy.as_str().parse::<ProgramPolicy>().unwrap(), policy);
    }
    assert!("MYSTERY_PLAN".parse::<ProgramPolicy>().is_err());
  }
}
