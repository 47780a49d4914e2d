//! Safety guardrails
//!
//! Post-processes one scheduled week:
//! - Beginner progression caps: week-bucketed duration ceilings, with early
//!   brick sessions demoted to an endurance ride.
//! - Injury dampening: run intensity work becomes easy running on a short
//!   leash.
//!
//! Guardrails only ever lower a duration or soften a session type; they never
//! raise a duration above its incoming value.

use crate::models::plan::{Discipline, Session, SessionType, MIN_SESSION_MINUTES};

const BEGINNER_RUN_CAPS: [u32; 3] = [45, 55, 70];
const BEGINNER_TECHNIQUE_CAPS: [u32; 3] = [45, 55, 55];
const BEGINNER_DEFAULT_CAPS: [u32; 3] = [70, 90, 90];
const INJURY_RUN_CAP_MINUTES: u32 = 45;
const EARLY_BRICK_LAST_WEEK: usize = 3;
const EARLY_BRICK_DURATION_FACTOR: f64 = 0.70;

/// Signals resolved upstream (program policy, risk tolerance, guidance text)
/// that drive this pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardrailContext {
  pub beginner: bool,
  pub injury: bool,
  pub week_index: usize,
}

/// Apply beginner and injury guardrails to a week's sessions, in that order.
pub fn apply_guardrails(sessions: &mut [Session], ctx: &GuardrailContext) {
  for session in sessions.iter_mut() {
    if ctx.beginner {
      apply_beginner_caps(session, ctx.week_index);
    }
    if ctx.injury {
      apply_injury_damping(session);
    }
  }
}

fn apply_beginner_caps(session: &mut Session, week_index: usize) {
  // Bricks are too much load in the opening weeks; ride easy instead.
  if session.session_type == SessionType::Brick && week_index <= EARLY_BRICK_LAST_WEEK {
    session.session_type = SessionType::Endurance;
    session.discipline = Discipline::Bike;
    let reduced =
      (session.duration_minutes as f64 * EARLY_BRICK_DURATION_FACTOR).round() as u32;
    session.duration_minutes = reduced.max(MIN_SESSION_MINUTES);
  }

  let cap = beginner_cap(session, week_bucket(week_index));
  session.duration_minutes = session.duration_minutes.min(cap);
}

fn week_bucket(week_index: usize) -> usize {
  match week_index {
    0..=1 => 0,
    2..=3 => 1,
    _ => 2,
  }
}

fn beginner_cap(session: &Session, bucket: usize) -> u32 {
  if session.discipline == Discipline::Run {
    BEGINNER_RUN_CAPS[bucket]
  } else if session.discipline == Discipline::Swim
    && session.session_type == SessionType::Technique
  {
    BEGINNER_TECHNIQUE_CAPS[bucket]
  } else {
    BEGINNER_DEFAULT_CAPS[bucket]
  }
}

fn apply_injury_damping(session: &mut Session) {
  if session.discipline == Discipline::Run && session.session_type.is_intensity() {
    session.session_type = SessionType::Endurance;
    session.duration_minutes = session.duration_minutes.min(INJURY_RUN_CAP_MINUTES);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::make_discipline_session;

  #[test]
  fn test_no_signals_pass_through() {
    let mut sessions = vec![
      make_discipline_session(0, 1, Discipline::Run, SessionType::Threshold, 120),
      make_discipline_session(0, 6, Discipline::Bike, SessionType::Long, 180),
    ];

    apply_guardrails(&mut sessions, &GuardrailContext::default());

    assert_eq!(sessions[0].duration_minutes, 120);
    assert_eq!(sessions[0].session_type, SessionType::Threshold);
    assert_eq!(sessions[1].duration_minutes, 180);
  }

  #[test]
  fn test_beginner_run_caps_by_week_bucket() {
    let ctx = |week_index| GuardrailContext {
      beginner: true,
      injury: false,
      week_index,
    };
    for (week, expected) in [(0, 45), (1, 45), (2, 55), (3, 55), (4, 70), (11, 70)] {
      let mut sessions =
        vec![make_discipline_session(week, 3, Discipline::Run, SessionType::Endurance, 120)];

      apply_guardrails(&mut sessions, &ctx(week));

      assert_eq!(sessions[0].duration_minutes, expected, "week {week}");
    }
  }

  #[test]
  fn test_beginner_swim_technique_caps() {
    let mut early =
      vec![make_discipline_session(0, 1, Discipline::Swim, SessionType::Technique, 90)];
    let mut late =
      vec![make_discipline_session(8, 1, Discipline::Swim, SessionType::Technique, 90)];

    apply_guardrails(
      &mut early,
      &GuardrailContext { beginner: true, injury: false, week_index: 0 },
    );
    apply_guardrails(
      &mut late,
      &GuardrailContext { beginner: true, injury: false, week_index: 8 },
    );

    assert_eq!(early[0].duration_minutes, 45);
    assert_eq!(late[0].duration_minutes, 55);
  }

  #[test]
  fn test_beginner_default_caps_cover_bike() {
    let mut early = vec![make_discipline_session(1, 6, Discipline::Bike, SessionType::Long, 180)];
    let mut late = vec![make_discipline_session(4, 6, Discipline::Bike, SessionType::Long, 180)];

    apply_guardrails(
      &mut early,
      &GuardrailContext { beginner: true, injury: false, week_index: 1 },
    );
    apply_guardrails(
      &mut late,
      &GuardrailContext { beginner: true, injury: false, week_index: 4 },
    );

    assert_eq!(early[0].duration_minutes, 70);
    assert_eq!(late[0].duration_minutes, 90);
  }

  #[test]
  fn test_beginner_demotes_early_bricks() {
    let mut sessions =
      vec![make_discipline_session(2, 3, Discipline::Brick, SessionType::Brick, 80)];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: true, injury: false, week_index: 2 },
    );

    assert_eq!(sessions[0].discipline, Discipline::Bike);
    assert_eq!(sessions[0].session_type, SessionType::Endurance);
    assert_eq!(sessions[0].duration_minutes, 56);
  }

  #[test]
  fn test_beginner_keeps_later_bricks() {
    let mut sessions =
      vec![make_discipline_session(4, 3, Discipline::Brick, SessionType::Brick, 80)];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: true, injury: false, week_index: 4 },
    );

    assert_eq!(sessions[0].session_type, SessionType::Brick);
    assert_eq!(sessions[0].duration_minutes, 80);
  }

  #[test]
  fn test_brick_demotion_respects_minimum_duration() {
    let mut sessions =
      vec![make_discipline_session(0, 3, Discipline::Brick, SessionType::Brick, 25)];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: true, injury: false, week_index: 0 },
    );

    assert_eq!(sessions[0].duration_minutes, MIN_SESSION_MINUTES);
  }

  #[test]
  fn test_caps_never_raise_durations() {
    let mut sessions =
      vec![make_discipline_session(8, 3, Discipline::Run, SessionType::Endurance, 30)];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: true, injury: true, week_index: 8 },
    );

    assert_eq!(sessions[0].duration_minutes, 30);
  }

  #[test]
  fn test_injury_demotes_run_intensity() {
    let mut sessions = vec![
      make_discipline_session(5, 1, Discipline::Run, SessionType::Threshold, 60),
      make_discipline_session(5, 4, Discipline::Run, SessionType::Tempo, 50),
    ];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: false, injury: true, week_index: 5 },
    );

    for s in &sessions {
      assert_eq!(s.session_type, SessionType::Endurance);
      assert!(s.duration_minutes <= INJURY_RUN_CAP_MINUTES);
    }
  }

  #[test]
  fn test_injury_leaves_other_disciplines_alone() {
    let mut sessions =
      vec![make_discipline_session(5, 1, Discipline::Bike, SessionType::Threshold, 60)];

    apply_guardrails(
      &mut sessions,
      &GuardrailContext { beginner: false, injury: true, week_index: 5 },
    );

    assert_eq!(sessions[0].session_type, SessionType::Threshold);
    assert_eq!(sessions[0].duration_minutes, 60);
  }
}
