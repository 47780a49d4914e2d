//! Session detail synthesis
//!
//! Builds the deterministic block skeleton for a session (warm-up / main /
//! cool-down, with a transition-split main for bricks), reflows existing
//! detail when only the duration changes, merges athlete-brief cues without
//! touching coach-authored text, and applies coach block edits.
//!
//! Invariant: block minutes always re-sum to the session duration after a
//! build or reflow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::brief::AthleteBrief;
use crate::models::detail::{BlockType, DetailBlock, DetailMode, SessionDetail};
use crate::models::plan::{Discipline, SessionType};
use crate::rounding::apportion;

const WARMUP_FRACTION: f64 = 0.20;
const WARMUP_MIN_MINUTES: u32 = 5;
const WARMUP_MAX_MINUTES: u32 = 20;
const COOLDOWN_FRACTION: f64 = 0.10;
const COOLDOWN_MIN_MINUTES: u32 = 5;
const COOLDOWN_MAX_MINUTES: u32 = 15;
const TRANSITION_MINUTES: u32 = 5;
const BRICK_BIKE_SHARE: f64 = 0.60;

#[derive(Debug, Error)]
pub enum DetailError {
  #[error("detail has no block at index {0}")]
  UnknownBlock(usize),
}

/// One coach-authored change to a single block, addressed by index into
/// `SessionDetail::structure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEdit {
  pub block_index: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub steps: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub minutes: Option<u32>,
}

/// ---------------------------------------------------------------------------
/// Skeleton construction
/// ---------------------------------------------------------------------------

/// Build a fresh detail skeleton for a session. When a brief is provided its
/// cues and safety notes are merged in immediately.
pub fn build_detail(
  discipline: Discipline,
  session_type: SessionType,
  duration_minutes: u32,
  brief: Option<&AthleteBrief>,
) -> SessionDetail {
  let warmup = fraction_block(duration_minutes, WARMUP_FRACTION, WARMUP_MIN_MINUTES, WARMUP_MAX_MINUTES);
  let cooldown =
    fraction_block(duration_minutes, COOLDOWN_FRACTION, COOLDOWN_MIN_MINUTES, COOLDOWN_MAX_MINUTES);
  let main_total = duration_minutes.saturating_sub(warmup + cooldown);

  let structure = if session_type == SessionType::Brick {
    brick_structure(warmup, main_total, cooldown)
  } else {
    vec![
      DetailBlock {
        block_type: BlockType::Warmup,
        steps: warmup_steps(discipline, session_type),
        minutes: warmup,
      },
      DetailBlock {
        block_type: BlockType::Main,
        steps: main_steps(discipline, session_type, main_total),
        minutes: main_total,
      },
      DetailBlock {
        block_type: BlockType::Cooldown,
        steps: cooldown_steps(discipline),
        minutes: cooldown,
      },
    ]
  };

  let mut detail = SessionDetail {
    objective: objective_for(discipline, session_type),
    structure,
    targets: targets_for(session_type),
    cues: Vec::new(),
    safety_notes: Vec::new(),
  };
  if let Some(brief) = brief {
    enrich_from_brief(&mut detail, None, brief);
  }
  detail
}

/// Ride first, run second, with a fixed transition between.
fn brick_structure(warmup: u32, main_total: u32, cooldown: u32) -> Vec<DetailBlock> {
  let split = main_total.saturating_sub(TRANSITION_MINUTES);
  let bike = (split as f64 * BRICK_BIKE_SHARE).round() as u32;
  let run = split.saturating_sub(bike);
  vec![
    DetailBlock {
      block_type: BlockType::Warmup,
      steps: warmup_steps(Discipline::Bike, SessionType::Brick),
      minutes: warmup,
    },
    DetailBlock {
      block_type: BlockType::Main,
      steps: vec![
        format!("{bike} min steady ride at planned race effort"),
        "Raise cadence over the final 5 min".to_string(),
      ],
      minutes: bike,
    },
    DetailBlock {
      block_type: BlockType::Transition,
      steps: vec!["Rack the bike, swap shoes, go".to_string()],
      minutes: TRANSITION_MINUTES,
    },
    DetailBlock {
      block_type: BlockType::Main,
      steps: vec![
        format!("{run} min run straight off the bike"),
        "Expect heavy legs for the first 5 min; find rhythm before pace".to_string(),
      ],
      minutes: run,
    },
    DetailBlock {
      block_type: BlockType::Cooldown,
      steps: cooldown_steps(Discipline::Run),
      minutes: cooldown,
    },
  ]
}

fn fraction_block(total: u32, fraction: f64, min: u32, max: u32) -> u32 {
  ((total as f64 * fraction).round() as u32).clamp(min, max)
}

fn warmup_steps(discipline: Discipline, session_type: SessionType) -> Vec<String> {
  let mut steps = vec![
    match discipline {
      Discipline::Run => "Easy jog building to a steady rhythm",
      Discipline::Bike | Discipline::Brick => "Easy spin, gradually raising cadence",
      Discipline::Swim => "Easy freestyle, mixing in backstroke every fourth length",
    }
    .to_string(),
  ];
  if session_type.is_intensity() {
    steps.push(
      match discipline {
        Discipline::Run => "4 x 20 sec strides with full recovery",
        Discipline::Bike | Discipline::Brick => "3 x 1 min fast-pedal spin-ups",
        Discipline::Swim => "4 x 25 build to fast",
      }
      .to_string(),
    );
  }
  steps
}

fn main_steps(discipline: Discipline, session_type: SessionType, minutes: u32) -> Vec<String> {
  match session_type {
    SessionType::Endurance => vec![
      format!("{minutes} min at conversational effort"),
      "Hold an even rhythm; check form every 10 min".to_string(),
    ],
    SessionType::Long => vec![
      format!("{minutes} min steady aerobic work"),
      "Fuel every 30-40 min and keep the back half honest".to_string(),
    ],
    SessionType::Technique => vec![
      "Drill ladder by 50s: catch-up, single-arm, fist".to_string(),
      "100 easy between sets, counting strokes per length".to_string(),
    ],
    SessionType::Tempo => {
      let reps = (minutes / 12).max(1);
      vec![
        format!("{reps} x 8 min at tempo effort, 3 min easy between"),
        "Comfortably hard: full sentences become short phrases".to_string(),
      ]
    }
    SessionType::Threshold => {
      let reps = (minutes / 10).clamp(1, 5);
      vec![
        format!("{reps} x 6 min at threshold effort, 2 min easy between"),
        "Even effort across reps; the last should feel like the first".to_string(),
      ]
    }
    SessionType::Brick => vec![format!(
      "{minutes} min alternating {} and run segments",
      discipline.as_str()
    )],
  }
}

fn cooldown_steps(discipline: Discipline) -> Vec<String> {
  vec![
    match discipline {
      Discipline::Run | Discipline::Brick => "Walk-jog until heart rate settles",
      Discipline::Bike => "Light spin in a low gear",
      Discipline::Swim => "Easy lengths, any stroke",
    }
    .to_string(),
    "Loose stretching for anything that feels tight".to_string(),
  ]
}

fn objective_for(discipline: Discipline, session_type: SessionType) -> String {
  let noun = match discipline {
    Discipline::Run => "run",
    Discipline::Bike => "ride",
    Discipline::Swim => "swim",
    Discipline::Brick => "brick",
  };
  match session_type {
    SessionType::Endurance => format!("Build the aerobic base with an easy {noun}"),
    SessionType::Long => format!("Extend aerobic endurance with a long {noun}"),
    SessionType::Brick => "Practice riding into running at race effort".to_string(),
    SessionType::Technique => "Sharpen stroke mechanics at low effort".to_string(),
    SessionType::Tempo => format!("Raise sustainable pace with a tempo {noun}"),
    SessionType::Threshold => format!("Lift the sustainable ceiling with a threshold {noun}"),
  }
}

fn targets_for(session_type: SessionType) -> BTreeMap<String, String> {
  let (rpe, zone) = match session_type {
    SessionType::Endurance => ("3-4 / 10", "Z2"),
    SessionType::Long => ("4-5 / 10", "Z2"),
    SessionType::Technique => ("2-3 / 10", "Z1-Z2"),
    SessionType::Tempo => ("6-7 / 10", "Z3"),
    SessionType::Threshold => ("7-8 / 10", "Z4"),
    SessionType::Brick => ("5-6 / 10", "Z2-Z3"),
  };
  BTreeMap::from([
    ("rpe".to_string(), rpe.to_string()),
    ("zone".to_string(), zone.to_string()),
  ])
}

/// ---------------------------------------------------------------------------
/// Reflow, enrichment, coach edits
/// ---------------------------------------------------------------------------

/// Re-size existing blocks proportionally to a new session duration. Steps,
/// targets, cues, and objective are untouched, which is what preserves
/// coach-authored text across duration changes.
pub fn reflow_detail(detail: &mut SessionDetail, new_total_minutes: u32) {
  if detail.structure.is_empty() {
    return;
  }
  let weights: Vec<f64> = detail.structure.iter().map(|b| b.minutes as f64).collect();
  let minutes = apportion(&weights, new_total_minutes);
  for (block, m) in detail.structure.iter_mut().zip(minutes) {
    block.minutes = m;
  }
}

/// Append cues and safety notes derived from the brief. Idempotent, and a
/// no-op for coach-authored detail. Returns whether anything was added.
pub fn enrich_from_brief(
  detail: &mut SessionDetail,
  mode: Option<DetailMode>,
  brief: &AthleteBrief,
) -> bool {
  if mode == Some(DetailMode::Coach) {
    return false;
  }
  let mut changed = false;
  if let Some(tone) = brief.coaching_tone.as_deref() {
    changed |= push_unique(&mut detail.cues, format!("Coaching emphasis: {tone}"));
  }
  for constraint in &brief.constraints {
    changed |= push_unique(&mut detail.cues, format!("Plan around: {constraint}"));
  }
  for flag in &brief.risk_flags {
    let note = match flag.as_str() {
      "injury-history" => "Injury history on file: stop if pain changes how you move".to_string(),
      "beginner" => "New to structured training: finish every session able to talk".to_string(),
      other => format!("Flagged: {other}"),
    };
    changed |= push_unique(&mut detail.safety_notes, note);
  }
  changed
}

fn push_unique(list: &mut Vec<String>, entry: String) -> bool {
  if list.iter().any(|existing| existing == &entry) {
    false
  } else {
    list.push(entry);
    true
  }
}

/// Apply coach block edits and an optional objective override. Every index is
/// validated before anything is written, so a bad edit leaves the detail
/// untouched. Returns the new block-minute total so the caller can sync the
/// session duration.
pub fn apply_coach_edits(
  detail: &mut SessionDetail,
  edits: &[BlockEdit],
  objective: Option<&str>,
) -> Result<u32, DetailError> {
  for edit in edits {
    if edit.block_index >= detail.structure.len() {
      return Err(DetailError::UnknownBlock(edit.block_index));
    }
  }
  for edit in edits {
    let block = &mut detail.structure[edit.block_index];
    if let Some(steps) = &edit.steps {
      block.steps = steps.clone();
    }
    if let Some(minutes) = edit.minutes {
      block.minutes = minutes;
    }
  }
  if let Some(objective) = objective {
    detail.objective = objective.to_string();
  }
  Ok(detail.total_minutes())
}

/// Lowercase-hex SHA-256 over the inputs that shape a detail. Stored next to
/// the detail so regeneration can be skipped when nothing relevant changed.
pub fn detail_input_hash(
  discipline: Discipline,
  session_type: SessionType,
  duration_minutes: u32,
  brief: Option<&AthleteBrief>,
) -> String {
  let fingerprint = brief.map(AthleteBrief::fingerprint).unwrap_or_default();
  let payload = format!(
    "{}|{}|{}|{}",
    discipline.as_str(),
    session_type.as_str(),
    duration_minutes,
    fingerprint
  );
  hex::encode(Sha256::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::mock_brief;

  #[test]
  fn test_blocks_sum_to_duration() {
    for duration in [20, 45, 60, 90, 135, 240] {
      let detail = build_detail(Discipline::Run, SessionType::Endurance, duration, None);
      assert_eq!(detail.total_minutes(), duration, "duration {duration}");
    }
  }

  #[test]
  fn test_warmup_and_cooldown_respect_clamps() {
    let long = build_detail(Discipline::Bike, SessionType::Long, 240, None);
    assert_eq!(long.structure[0].minutes, 20);
    assert_eq!(long.structure[2].minutes, 15);
    assert_eq!(long.structure[1].minutes, 205);

    let short = build_detail(Discipline::Run, SessionType::Endurance, 20, None);
    assert_eq!(short.structure[0].minutes, 5);
    assert_eq!(short.structure[2].minutes, 5);
    assert_eq!(short.structure[1].minutes, 10);
  }

  #[test]
  fn test_brick_layout() {
    let detail = build_detail(Discipline::Brick, SessionType::Brick, 80, None);

    let kinds: Vec<BlockType> = detail.structure.iter().map(|b| b.block_type).collect();
    assert_eq!(
      kinds,
      vec![
        BlockType::Warmup,
        BlockType::Main,
        BlockType::Transition,
        BlockType::Main,
        BlockType::Cooldown,
      ]
    );
    assert_eq!(detail.structure[2].minutes, TRANSITION_MINUTES);
    assert_eq!(detail.total_minutes(), 80);
    assert!(
      detail.structure[1].minutes > detail.structure[3].minutes,
      "ride leg is the longer one"
    );
  }

  #[test]
  fn test_intensity_warmup_gets_activation_step() {
    let threshold = build_detail(Discipline::Run, SessionType::Threshold, 60, None);
    let easy = build_detail(Discipline::Run, SessionType::Endurance, 60, None);

    assert_eq!(threshold.structure[0].steps.len(), 2);
    assert_eq!(easy.structure[0].steps.len(), 1);
  }

  #[test]
  fn test_reflow_resizes_without_touching_text() {
    let mut detail = build_detail(Discipline::Run, SessionType::Endurance, 60, None);
    detail.structure[1].steps = vec!["Coach-authored main set".to_string()];

    reflow_detail(&mut detail, 90);

    // 12/42/6 scales exactly to 18/63/9
    let minutes: Vec<u32> = detail.structure.iter().map(|b| b.minutes).collect();
    assert_eq!(minutes, vec![18, 63, 9]);
    assert_eq!(detail.total_minutes(), 90);
    assert_eq!(detail.structure[1].steps, vec!["Coach-authored main set".to_string()]);
  }

  #[test]
  fn test_reflow_handles_rough_ratios() {
    let mut detail = build_detail(Discipline::Bike, SessionType::Tempo, 75, None);

    reflow_detail(&mut detail, 50);

    assert_eq!(detail.total_minutes(), 50);
  }

  #[test]
  fn test_enrichment_is_idempotent() {
    let mut detail = build_detail(Discipline::Run, SessionType::Endurance, 60, None);
    let brief = mock_brief();

    let first = enrich_from_brief(&mut detail, Some(DetailMode::Auto), &brief);
    let cues_after_first = detail.cues.len();
    let second = enrich_from_brief(&mut detail, Some(DetailMode::Auto), &brief);

    assert!(first);
    assert!(!second);
    assert_eq!(detail.cues.len(), cues_after_first);
  }

  #[test]
  fn test_enrichment_skips_coach_detail() {
    let mut detail = build_detail(Discipline::Run, SessionType::Endurance, 60, None);

    let changed = enrich_from_brief(&mut detail, Some(DetailMode::Coach), &mock_brief());

    assert!(!changed);
    assert!(detail.cues.is_empty());
    assert!(detail.safety_notes.is_empty());
  }

  #[test]
  fn test_coach_edits_apply_and_report_total() {
    let mut detail = build_detail(Discipline::Run, SessionType::Endurance, 60, None);
    let edits = vec![BlockEdit {
      block_index: 1,
      steps: Some(vec!["3 x 10 min progression".to_string()]),
      minutes: Some(50),
    }];

    let total = apply_coach_edits(&mut detail, &edits, Some("Race rehearsal"));

    assert_eq!(total.ok(), Some(12 + 50 + 6));
    assert_eq!(detail.objective, "Race rehearsal");
    assert_eq!(detail.structure[1].steps, vec!["3 x 10 min progression".to_string()]);
  }

  #[test]
  fn test_coach_edit_with_bad_index_changes_nothing() {
    let mut detail = build_detail(Discipline::Run, SessionType::Endurance, 60, None);
    let before = detail.clone();
    let edits = vec![
      BlockEdit { block_index: 0, steps: None, minutes: Some(10) },
      BlockEdit { block_index: 9, steps: None, minutes: Some(10) },
    ];

    let result = apply_coach_edits(&mut detail, &edits, None);

    assert!(matches!(result, Err(DetailError::UnknownBlock(9))));
    assert_eq!(detail, before);
  }

  #[test]
  fn test_input_hash_tracks_inputs() {
    let base = detail_input_hash(Discipline::Run, SessionType::Tempo, 60, None);
    let same = detail_input_hash(Discipline::Run, SessionType::Tempo, 60, None);
    let longer = detail_input_hash(Discipline::Run, SessionType::Tempo, 75, None);
    let with_brief = detail_input_hash(Discipline::Run, SessionType::Tempo, 60, Some(&mock_brief()));

    assert_eq!(base, same);
    assert_ne!(base, longer);
    assert_ne!(base, with_brief);
    assert_eq!(base.len(), 64);
  }
}
