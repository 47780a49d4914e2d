//! Deterministic adaptation proposals
//!
//! Turns fired triggers plus a lock-aware draft snapshot into an ordered list
//! of diff operations with rationale text. Rules scope to the earliest week
//! that still has unlocked sessions; locked sessions and weeks are excluded
//! before any rule runs, and `respectsLocks` is recomputed from the emitted
//! ops afterwards rather than assumed.

use std::collections::BTreeSet;

use crate::models::diff::{DraftSnapshot, PlanDiffOp, ProposalDiff, TriggerType};
use crate::models::plan::{SessionType, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES};

const SORENESS_FACTOR: f64 = 0.8;
const TOO_HARD_FACTOR: f64 = 0.85;
const HIGH_COMPLIANCE_FACTOR: f64 = 1.1;

/// Mutable view of one unlocked session while rules accumulate. Later
/// triggers see the durations and types earlier triggers produced.
struct WorkingSession {
  id: String,
  week_index: u32,
  day_of_week: u8,
  ordinal: u32,
  session_type: SessionType,
  duration_minutes: u32,
  removed: bool,
}

/// Build an ordered diff for the fired triggers. Triggers are processed in
/// their canonical order regardless of how the set was assembled.
pub fn generate_proposal_diff(
  triggers: &BTreeSet<TriggerType>,
  snapshot: &DraftSnapshot,
) -> ProposalDiff {
  let mut working = unlocked_sessions(snapshot);
  let mut ops: Vec<PlanDiffOp> = Vec::new();
  let mut rationale: Vec<String> = Vec::new();

  for trigger in triggers {
    match trigger {
      TriggerType::Soreness => {
        let week = match earliest_active_week(&working) {
          Some(w) => w,
          None => continue,
        };
        let mut touched = 0;
        for session in working
          .iter_mut()
          .filter(|s| !s.removed && s.week_index == week && s.session_type.is_intensity())
        {
          let scaled = scale_duration(session.duration_minutes, SORENESS_FACTOR);
          if scaled < session.duration_minutes {
            session.duration_minutes = scaled;
            ops.push(PlanDiffOp::ReduceDuration {
              session_id: session.id.clone(),
              duration_minutes: scaled,
            });
            ops.push(PlanDiffOp::AnnotateSession {
              session_id: session.id.clone(),
              note: "Reduced for reported soreness; keep the effort conversational.".to_string(),
            });
            touched += 1;
          }
        }
        if touched > 0 {
          rationale.push(format!(
            "Soreness reported: trimmed {} intensity session(s) in week {} by 20%.",
            touched,
            week + 1
          ));
        }
      }
      TriggerType::TooHard => {
        let week = match earliest_active_week(&working) {
          Some(w) => w,
          None => continue,
        };
        let mut touched = 0;
        for session in working
          .iter_mut()
          .filter(|s| !s.removed && s.week_index == week && s.session_type.is_intensity())
        {
          let scaled = scale_duration(session.duration_minutes, TOO_HARD_FACTOR);
          if scaled < session.duration_minutes {
            session.duration_minutes = scaled;
            ops.push(PlanDiffOp::ReduceDuration {
              session_id: session.id.clone(),
              duration_minutes: scaled,
            });
          }
          session.session_type = SessionType::Endurance;
          ops.push(PlanDiffOp::SetSessionType {
            session_id: session.id.clone(),
            session_type: SessionType::Endurance,
          });
          touched += 1;
        }
        if touched > 0 {
          rationale.push(format!(
            "Sessions felt too hard: eased week {} intensity back to endurance effort.",
            week + 1
          ));
        }
      }
      TriggerType::MissedKeySession => {
        let target = working.iter().find(|s| {
          !s.removed && matches!(s.session_type, SessionType::Long | SessionType::Brick)
        });
        if let Some(session) = target {
          ops.push(PlanDiffOp::AnnotateSession {
            session_id: session.id.clone(),
            note: "Last key session was missed; make this the priority session of the week."
              .to_string(),
          });
          rationale
            .push("Missed key session: flagged the next long effort as the weekly priority.".to_string());
        }
      }
      TriggerType::LowCompliance => {
        let week = match earliest_active_week(&working) {
          Some(w) => w,
          None => continue,
        };
        // Drop the latest non-key session; long and brick sessions stay.
        let target = working
          .iter_mut()
          .filter(|s| {
            !s.removed
              && s.week_index == week
              && !matches!(s.session_type, SessionType::Long | SessionType::Brick)
          })
          .last();
        if let Some(session) = target {
          session.removed = true;
          ops.push(PlanDiffOp::RemoveSession {
            session_id: session.id.clone(),
          });
          rationale.push(format!(
            "Low compliance: removed one session from week {} to make the schedule achievable.",
            week + 1
          ));
        }
      }
      TriggerType::HighCompliance => {
        let week = match earliest_active_week(&working) {
          Some(w) => w,
          None => continue,
        };
        let mut touched = 0;
        for session in working.iter_mut().filter(|s| {
          !s.removed && s.week_index == week && s.session_type == SessionType::Endurance
        }) {
          let scaled = scale_duration(session.duration_minutes, HIGH_COMPLIANCE_FACTOR);
          if scaled > session.duration_minutes {
            session.duration_minutes = scaled;
            ops.push(PlanDiffOp::IncreaseDuration {
              session_id: session.id.clone(),
              duration_minutes: scaled,
            });
            touched += 1;
          }
        }
        if touched > 0 {
          rationale.push(format!(
            "High compliance: extended week {} endurance volume by 10%.",
            week + 1
          ));
        }
      }
    }
  }

  // Correctness post-check against the snapshot, not the working set.
  let respects_locks = ops
    .iter()
    .all(|op| !snapshot.session_locked(op.session_id()));

  let rationale_text = if rationale.is_empty() {
    "No unlocked sessions were available to adjust.".to_string()
  } else {
    rationale.join(" ")
  };

  ProposalDiff {
    ops,
    rationale_text,
    respects_locks,
  }
}

fn unlocked_sessions(snapshot: &DraftSnapshot) -> Vec<WorkingSession> {
  let mut working: Vec<WorkingSession> = snapshot
    .sessions
    .iter()
    .filter(|s| !snapshot.session_locked(&s.id))
    .map(|s| WorkingSession {
      id: s.id.clone(),
      week_index: s.week_index,
      day_of_week: s.day_of_week,
      ordinal: s.ordinal,
      session_type: s.session_type,
      duration_minutes: s.duration_minutes,
      removed: false,
    })
    .collect();
  working.sort_by_key(|s| (s.week_index, s.day_of_week, s.ordinal));
  working
}

fn earliest_active_week(working: &[WorkingSession]) -> Option<u32> {
  working
    .iter()
    .filter(|s| !s.removed)
    .map(|s| s.week_index)
    .min()
}

fn scale_duration(minutes: u32, factor: f64) -> u32 {
  let scaled = (minutes as f64 * factor).round() as u32;
  scaled.clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
