//! Draft plan generation
//!
//! The end-to-end pipeline: normalize the raw setup, apply the program
//! policy, classify guidance, then per week schedule, guardrail, and
//! humanize. Hard constraint violations reject the draft before it can be
//! persisted; soft findings ride along as warnings. Session detail synthesis
//! fans out through the bounded concurrent map, one persisted unit per
//! session.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::concurrent::map_bounded;
use crate::detail::{build_detail, detail_input_hash};
use crate::guardrails::{apply_guardrails, GuardrailContext};
use crate::models::audit::AiMode;
use crate::models::brief::AthleteBrief;
use crate::models::detail::DetailMode;
use crate::models::plan::{Discipline, DraftPlan, Session, Week, MIN_SESSION_MINUTES};
use crate::models::setup::{DisciplineEmphasis, PlanSetup, RiskTolerance};
use crate::program::{apply_program_policy, weekly_minutes_curve};
use crate::rounding::humanize_week_durations;
use crate::router::AiRouter;
use crate::scheduler::{resolve_long_day, schedule_week, WeekInputs, TRAVEL_MINUTES_FACTOR};
use crate::setup::{normalize_setup, SetupError};
use crate::signals::{classify_guidance, travel_week_flags};
use crate::update::{DraftStore, StoreError};

/// Worker cap for session detail fan-out.
pub const DETAIL_CONCURRENCY: usize = 4;

/// A balanced plan where one discipline exceeds this share of scheduled
/// minutes gets flagged.
const UNEVEN_SPLIT_SHARE: f64 = 0.6;

/// ---------------------------------------------------------------------------
/// Diagnostics
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
  UnsatisfiableDistribution,
  NoCapacityForProgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
  RoundingResidual,
  UnevenDisciplineSplit,
  TravelUnanchored,
  EmptyWeek,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanViolation {
  pub code: ViolationCode,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub week_index: Option<u32>,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWarning {
  pub code: WarningCode,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub week_index: Option<u32>,
  pub message: String,
}

/// Violations are fatal; warnings attach to the draft without blocking it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDiagnostics {
  pub violations: Vec<PlanViolation>,
  pub warnings: Vec<PlanWarning>,
}

#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Setup(#[from] SetupError),

  #[error("draft rejected with {} hard violation(s)", diagnostics.violations.len())]
  QualityGate { diagnostics: PlanDiagnostics },
}

/// ---------------------------------------------------------------------------
/// Deterministic pipeline
/// ---------------------------------------------------------------------------

/// Build a complete draft from a raw setup. Pure and synchronous; calling it
/// twice with the same input yields byte-identical serialized plans.
pub fn build_plan(raw: &PlanSetup) -> Result<(DraftPlan, PlanDiagnostics), PlanError> {
  let normalized = normalize_setup(raw)?;
  let signals = classify_guidance(normalized.coach_guidance.as_deref());
  let effective = apply_program_policy(&normalized);
  let curve = weekly_minutes_curve(&effective);
  let travel = travel_week_flags(&signals, &effective);

  let beginner = effective
    .program_policy
    .map(|p| p.implies_beginner())
    .unwrap_or(false)
    || effective.risk_tolerance == RiskTolerance::Low
    || signals.beginner;

  let days = effective.canonical_days();
  let long_day = resolve_long_day(&effective, &days, effective.weeks_to_event);

  let mut violations: Vec<PlanViolation> = Vec::new();
  let mut warnings: Vec<PlanWarning> = Vec::new();

  if effective.program_policy.is_some() && days.is_empty() {
    violations.push(PlanViolation {
      code: ViolationCode::NoCapacityForProgram,
      week_index: None,
      message: "program policy requires sessions but no days are available".to_string(),
    });
  }

  let mut weeks = Vec::with_capacity(curve.len());
  for (week_index, curve_minutes) in curve.iter().enumerate() {
    let traveling = travel.weeks.get(week_index).copied().unwrap_or(false);
    let mut sessions = schedule_week(&WeekInputs {
      setup: &effective,
      week_index: week_index as u32,
      total_weeks: effective.weeks_to_event,
      curve_minutes: *curve_minutes,
      traveling,
      injury: signals.injury,
    });

    let week_target = if traveling {
      (*curve_minutes as f64 * TRAVEL_MINUTES_FACTOR).round() as u32
    } else {
      *curve_minutes
    };
    if !sessions.is_empty() && sessions.len() as u32 * MIN_SESSION_MINUTES > week_target {
      violations.push(PlanViolation {
        code: ViolationCode::UnsatisfiableDistribution,
        week_index: Some(week_index as u32),
        message: format!(
          "week {}: {} sessions cannot fit {} min at the {}-minute floor",
          week_index,
          sessions.len(),
          week_target,
          MIN_SESSION_MINUTES
        ),
      });
    }

    apply_guardrails(
      &mut sessions,
      &GuardrailContext {
        beginner,
        injury: signals.injury,
        week_index,
      },
    );

    let residual = humanize_week_durations(&mut sessions, long_day);
    if residual != 0 {
      warnings.push(PlanWarning {
        code: WarningCode::RoundingResidual,
        week_index: Some(week_index as u32),
        message: format!(
          "week {} total differs from its target by {} min after rounding",
          week_index,
          residual.abs()
        ),
      });
    }
    if sessions.is_empty() {
      warnings.push(PlanWarning {
        code: WarningCode::EmptyWeek,
        week_index: Some(week_index as u32),
        message: format!("week {} has no sessions", week_index),
      });
    }

    weeks.push(Week {
      week_index: week_index as u32,
      locked: false,
      sessions,
    });
  }

  if travel.unanchored {
    warnings.push(PlanWarning {
      code: WarningCode::TravelUnanchored,
      week_index: None,
      message: "travel dates given without a start date; no weeks were reduced".to_string(),
    });
  }
  if let Some(warning) = discipline_split_warning(&weeks, effective.discipline_emphasis) {
    warnings.push(warning);
  }

  let diagnostics = PlanDiagnostics {
    violations,
    warnings,
  };
  if !diagnostics.violations.is_empty() {
    debug!(
      violations = diagnostics.violations.len(),
      "draft failed the quality gate"
    );
    return Err(PlanError::QualityGate { diagnostics });
  }
  Ok((DraftPlan::new(effective, weeks), diagnostics))
}

fn discipline_split_warning(
  weeks: &[Week],
  emphasis: DisciplineEmphasis,
) -> Option<PlanWarning> {
  if emphasis != DisciplineEmphasis::Balanced {
    return None;
  }
  let mut totals: BTreeMap<Discipline, u32> = BTreeMap::new();
  for week in weeks {
    for session in &week.sessions {
      // Bricks are combined work; they belong to neither side of the split.
      if session.discipline != Discipline::Brick {
        *totals.entry(session.discipline).or_insert(0) += session.duration_minutes;
      }
    }
  }
  let sum: u32 = totals.values().sum();
  if sum == 0 {
    return None;
  }
  let (dominant, minutes) = totals.iter().max_by_key(|(_, m)| **m)?;
  let share = *minutes as f64 / sum as f64;
  if share <= UNEVEN_SPLIT_SHARE {
    return None;
  }
  Some(PlanWarning {
    code: WarningCode::UnevenDisciplineSplit,
    week_index: None,
    message: format!(
      "{} carries {:.0}% of scheduled minutes in a balanced plan",
      dominant.as_str(),
      share * 100.0
    ),
  })
}

/// ---------------------------------------------------------------------------
/// Routed generation
/// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeneratedPlan {
  pub plan: DraftPlan,
  pub diagnostics: PlanDiagnostics,
  pub effective_mode: AiMode,
  pub fallback_used: bool,
}

/// Generate a draft through the capability router. The deterministic plan is
/// always built first: it is the fallback, and its quality gate applies in
/// every mode.
pub async fn generate_draft_plan(
  router: &AiRouter,
  raw: &PlanSetup,
) -> Result<GeneratedPlan, PlanError> {
  let (fallback, diagnostics) = build_plan(raw)?;
  let setup = fallback.setup.clone();
  let routed = router.suggest_draft_plan(&setup, fallback).await;
  info!(
    weeks = routed.value.weeks.len(),
    warnings = diagnostics.warnings.len(),
    fallback_used = routed.fallback_used,
    "draft plan generated"
  );
  Ok(GeneratedPlan {
    plan: routed.value,
    diagnostics,
    effective_mode: routed.effective_mode,
    fallback_used: routed.fallback_used,
  })
}

/// ---------------------------------------------------------------------------
/// Session detail fan-out
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailSynthesisReport {
  pub generated: usize,
  pub skipped_coach: usize,
  pub skipped_unchanged: usize,
  pub fallbacks: usize,
  pub failed: usize,
}

/// Generate and persist detail for every session of a stored draft that
/// needs it. Coach-authored detail is never touched, and sessions whose
/// detail inputs are unchanged are skipped. Each unit persists its own
/// result; one unit failing leaves the rest alone.
pub async fn synthesize_plan_details(
  router: Arc<AiRouter>,
  store: Arc<dyn DraftStore>,
  draft_id: &str,
  brief: Option<&AthleteBrief>,
) -> Result<DetailSynthesisReport, StoreError> {
  let plan = store.load_draft(draft_id).await?;

  let mut report = DetailSynthesisReport::default();
  let mut units: Vec<(Session, String)> = Vec::new();
  for week in &plan.weeks {
    for session in &week.sessions {
      if session.detail_mode == Some(DetailMode::Coach) {
        report.skipped_coach += 1;
        continue;
      }
      let hash = detail_input_hash(
        session.discipline,
        session.session_type,
        session.duration_minutes,
        brief,
      );
      if session.detail_input_hash.as_deref() == Some(hash.as_str()) {
        report.skipped_unchanged += 1;
        continue;
      }
      units.push((session.clone(), hash));
    }
  }

  let owned_brief = brief.cloned();
  let owned_draft_id = draft_id.to_string();
  let results = map_bounded(DETAIL_CONCURRENCY, units, move |(session, hash)| {
    let router = Arc::clone(&router);
    let store = Arc::clone(&store);
    let brief = owned_brief.clone();
    let draft_id = owned_draft_id.clone();
    async move {
      let fallback = build_detail(
        session.discipline,
        session.session_type,
        session.duration_minutes,
        brief.as_ref(),
      );
      let routed = router
        .generate_session_detail(&session, brief.as_ref(), fallback)
        .await;
      store
        .save_session_detail(
          &draft_id,
          session.week_index,
          session.ordinal,
          &routed.value,
          &hash,
          DetailMode::Auto,
        )
        .await?;
      Ok::<bool, StoreError>(routed.fallback_used)
    }
  })
  .await;

  for result in results {
    match result {
      Ok(Ok(fallback_used)) => {
        report.generated += 1;
        if fallback_used {
          report.fallbacks += 1;
        }
      }
      Ok(Err(store_error)) => {
        warn!(error = %store_error, "failed to persist session detail");
        report.failed += 1;
      }
      Err(worker_error) => {
        warn!(error = %worker_error, "session detail worker failed");
        report.failed += 1;
      }
    }
  }
  info!(
    generated = report.generated,
    skipped_coach = report.skipped_coach,
    skipped_unchanged = report.skipped_unchanged,
    failed = report.failed,
    "session detail synthesis finished"
  );
  Ok(report)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AiConfig;
  use crate::models::plan::SessionType;
  use crate::models::setup::WeeklyAvailability;
  use crate::router::MemoryAuditLog;
  use crate::test_utils::mock_plan_setup;
  use crate::update::MemoryDraftStore;

  #[test]
  fn test_eight_week_scenario() {
    let (plan, diagnostics) = build_plan(&mock_plan_setup()).unwrap();

    assert_eq!(plan.version, "v1");
    assert_eq!(plan.weeks.len(), 8);
    for week in &plan.weeks {
      for session in &week.sessions {
        assert!([1u8, 3, 5, 6].contains(&session.day_of_week));
      }
    }

    // Week 0 runs at full volume; the final two weeks taper.
    let totals: Vec<u32> = plan.weeks.iter().map(|w| w.total_minutes()).collect();
    assert_eq!(totals[0], 300);
    assert!(totals[..6].iter().all(|t| *t == 300));
    assert_eq!(totals[6], 225);
    assert_eq!(totals[7], 165);

    // Even-week layout straight through the whole pipeline.
    let week0 = &plan.weeks[0];
    let shape: Vec<(u8, SessionType, u32)> = week0
      .sessions
      .iter()
      .map(|s| (s.day_of_week, s.session_type, s.duration_minutes))
      .collect();
    assert_eq!(
      shape,
      vec![
        (1, SessionType::Technique, 60),
        (3, SessionType::Threshold, 60),
        (5, SessionType::Endurance, 60),
        (6, SessionType::Long, 120),
      ]
    );
    assert_eq!(week0.sessions[3].discipline, Discipline::Bike);

    assert!(diagnostics.violations.is_empty());
    assert!(diagnostics.warnings.is_empty());
  }

  #[test]
  fn test_generation_is_byte_deterministic() {
    let raw = mock_plan_setup();

    let (first, _) = build_plan(&raw).unwrap();
    let (second, _) = build_plan(&raw).unwrap();

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn test_couch_to_5k_scenario() {
    let mut raw = mock_plan_setup();
    raw.weeks_to_event = Some(12);
    raw.weekly_availability_minutes = Some(WeeklyAvailability::Total(240));
    raw.program_policy = Some("COUCH_TO_5K".to_string());

    let (plan, _) = build_plan(&raw).unwrap();

    assert_eq!(plan.weeks.len(), 12);
    assert_eq!(plan.setup.discipline_emphasis, DisciplineEmphasis::Run);
    assert_eq!(plan.setup.max_intensity_days_per_week, 1);
    // Run-only archetype: no swim technique, no bricks.
    for week in &plan.weeks {
      for session in &week.sessions {
        assert_eq!(session.discipline, Discipline::Run);
        assert!(!matches!(
          session.session_type,
          SessionType::Technique | SessionType::Brick
        ));
      }
    }
    // Volume rises from the start to the ramp peak, then tapers off.
    let totals: Vec<u32> = plan.weeks.iter().map(|w| w.total_minutes()).collect();
    assert!(totals[8] > totals[0]);
    assert!(totals[11] < totals[8]);
  }

  #[test]
  fn test_travel_week_mention_reduces_volume() {
    let mut raw = mock_plan_setup();
    raw.coach_guidance = Some("away for work in week 2".to_string());

    let (plan, diagnostics) = build_plan(&raw).unwrap();

    let totals: Vec<u32> = plan.weeks.iter().map(|w| w.total_minutes()).collect();
    assert_eq!(totals[0], 300);
    assert_eq!(totals[1], 225, "travel week keeps three quarters");
    assert_eq!(totals[2], 300);
    assert!(diagnostics
      .warnings
      .iter()
      .all(|w| w.code != WarningCode::TravelUnanchored));
  }

  #[test]
  fn test_unanchored_travel_warns_without_reducing() {
    let mut raw = mock_plan_setup();
    raw.coach_guidance = Some("traveling June 3-10".to_string());
    raw.start_date = None;

    let (plan, diagnostics) = build_plan(&raw).unwrap();

    let totals: Vec<u32> = plan.weeks.iter().map(|w| w.total_minutes()).collect();
    assert!(totals[..6].iter().all(|t| *t == 300));
    assert!(diagnostics
      .warnings
      .iter()
      .any(|w| w.code == WarningCode::TravelUnanchored));
  }

  #[test]
  fn test_unsatisfiable_distribution_rejected() {
    let mut raw = mock_plan_setup();
    raw.weeks_to_event = Some(1);
    raw.weekly_availability_days = Some(vec![0, 1, 2, 3, 4, 5, 6]);
    raw.weekly_availability_minutes = Some(WeeklyAvailability::Total(60));
    raw.sessions_per_week = Some(7);

    let err = build_plan(&raw).unwrap_err();

    match err {
      PlanError::QualityGate { diagnostics } => {
        assert!(diagnostics
          .violations
          .iter()
          .any(|v| v.code == ViolationCode::UnsatisfiableDistribution));
      }
      other => panic!("expected quality gate rejection, got {other:?}"),
    }
  }

  #[test]
  fn test_program_with_no_capacity_rejected() {
    let mut raw = mock_plan_setup();
    raw.weekly_availability_days = Some(vec![]);
    raw.program_policy = Some("BASE_BUILD".to_string());

    let err = build_plan(&raw).unwrap_err();

    match err {
      PlanError::QualityGate { diagnostics } => {
        assert!(diagnostics
          .violations
          .iter()
          .any(|v| v.code == ViolationCode::NoCapacityForProgram));
      }
      other => panic!("expected quality gate rejection, got {other:?}"),
    }
  }

  #[test]
  fn test_uneven_split_warning_on_skewed_weights() {
    let mut raw = mock_plan_setup();
    let mut weights = BTreeMap::new();
    weights.insert(Discipline::Run, 0.9);
    weights.insert(Discipline::Bike, 0.1);
    raw.discipline_weights = Some(weights);

    let (_, diagnostics) = build_plan(&raw).unwrap();

    assert!(diagnostics
      .warnings
      .iter()
      .any(|w| w.code == WarningCode::UnevenDisciplineSplit));
  }

  #[tokio::test]
  async fn test_generate_draft_plan_deterministic_mode() {
    let audit = Arc::new(MemoryAuditLog::new());
    let router = AiRouter::new(AiConfig::deterministic(), None, audit.clone());
    let raw = mock_plan_setup();

    let generated = generate_draft_plan(&router, &raw).await.unwrap();
    let (expected, _) = build_plan(&raw).unwrap();

    assert!(!generated.fallback_used);
    assert_eq!(generated.effective_mode, AiMode::Deterministic);
    assert_eq!(generated.plan, expected);
    assert_eq!(audit.records().len(), 1);
  }

  #[tokio::test]
  async fn test_synthesize_details_covers_every_session() {
    let router = Arc::new(AiRouter::new(
      AiConfig::deterministic(),
      None,
      Arc::new(MemoryAuditLog::new()),
    ));
    let store = Arc::new(MemoryDraftStore::new());
    let (plan, _) = build_plan(&mock_plan_setup()).unwrap();
    let session_count: usize = plan.weeks.iter().map(|w| w.sessions.len()).sum();
    store.insert_draft("draft-1", plan);

    let report = synthesize_plan_details(Arc::clone(&router), store.clone(), "draft-1", None)
      .await
      .unwrap();

    assert_eq!(report.generated, session_count);
    assert_eq!(report.failed, 0);
    assert_eq!(report.fallbacks, 0);

    let stored = store.load_draft("draft-1").await.unwrap();
    for week in &stored.weeks {
      for session in &week.sessions {
        let detail = session.detail.as_ref().expect("detail synthesized");
        assert_eq!(detail.total_minutes(), session.duration_minutes);
        assert_eq!(session.detail_mode, Some(DetailMode::Auto));
        assert!(session.detail_input_hash.is_some());
      }
    }

    // Second pass is a no-op: inputs unchanged.
    let second = synthesize_plan_details(router, store, "draft-1", None)
      .await
      .unwrap();
    assert_eq!(second.generated, 0);
    assert_eq!(second.skipped_unchanged, session_count);
  }

  #[tokio::test]
  async fn test_synthesize_details_skips_coach_sessions() {
    let router = Arc::new(AiRouter::new(
      AiConfig::deterministic(),
      None,
      Arc::new(MemoryAuditLog::new()),
    ));
    let store = Arc::new(MemoryDraftStore::new());
    let (mut plan, _) = build_plan(&mock_plan_setup()).unwrap();
    plan.weeks[0].sessions[0].detail_mode = Some(DetailMode::Coach);
    let session_count: usize = plan.weeks.iter().map(|w| w.sessions.len()).sum();
    store.insert_draft("draft-1", plan);

    let report = synthesize_plan_details(router, store, "draft-1", None)
      .await
      .unwrap();

    assert_eq!(report.skipped_coach, 1);
    assert_eq!(report.generated, session_count - 1);
  }
}
