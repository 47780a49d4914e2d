//! Weekly session scheduler
//!
//! The combinatorial core. For one week it:
//! 1. reduces the curve target ~25% when the week overlaps travel
//! 2. computes per-day capacity (1 per day + doubles, round-robin earliest)
//! 3. targets min(requested sessions, total capacity)
//! 4. picks non-adjacent intensity days, excluding the long day
//! 5. seeds swim technique, the long session, and the brick
//! 6. fills remaining slots from weighted round-robin queues
//! 7. places everything on the least-loaded day in canonical order
//!
//! Pure and synchronous; all tie-breaks follow canonical week-start order so
//! identical inputs always produce identical weeks.

use std::collections::VecDeque;

use crate::models::plan::{Discipline, Session, SessionType, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES};
use crate::models::setup::{DisciplineEmphasis, NormalizedSetup, RiskTolerance};
use crate::rounding::apportion;

/// Travel weeks keep ~75% of the curve target.
pub const TRAVEL_MINUTES_FACTOR: f64 = 0.75;

/// Long sessions are only seeded for plans at least this long.
pub const MIN_WEEKS_FOR_LONG_SESSION: u32 = 6;

const LONG_WEIGHT: f64 = 2.0;
const BRICK_WEIGHT: f64 = 1.5;
const FILL_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct WeekInputs<'a> {
  pub setup: &'a NormalizedSetup,
  pub week_index: u32,
  pub total_weeks: u32,
  /// Curve value for this week, before any travel reduction.
  pub curve_minutes: u32,
  pub traveling: bool,
  pub injury: bool,
}

struct Placement {
  day: u8,
  discipline: Discipline,
  session_type: SessionType,
  weight: f64,
}

/// ---------------------------------------------------------------------------
/// Entry point
/// ---------------------------------------------------------------------------

pub fn schedule_week(inputs: &WeekInputs) -> Vec<Session> {
  let setup = inputs.setup;
  let days = setup.canonical_days();
  if days.is_empty() {
    // Zero available days means zero sessions, not an error.
    return Vec::new();
  }

  // 1. Week target minutes
  let target_minutes = if inputs.traveling {
    (inputs.curve_minutes as f64 * TRAVEL_MINUTES_FACTOR).round() as u32
  } else {
    inputs.curve_minutes
  };

  // 2. Per-day capacity: one slot each plus doubles round-robined onto the
  //    earliest days, never more than two sessions on one day.
  let caps = day_capacities(
    days.len(),
    if inputs.traveling {
      0
    } else {
      setup.max_doubles_per_week
    },
  );
  let total_capacity: u32 = caps.iter().sum();

  // 3. Session count
  let target_sessions = setup.sessions_per_week.min(total_capacity) as usize;
  if target_sessions == 0 {
    return Vec::new();
  }

  // 4. Intensity days
  let long_day = resolve_long_day(setup, &days, inputs.total_weeks);
  let intensity_cap = if inputs.traveling || inputs.injury {
    1
  } else {
    setup.max_intensity_days_per_week
  };
  let mut open_intensity_days = pick_intensity_days(&days, long_day, intensity_cap);

  let mut loads = vec![0u32; days.len()];
  let mut placements: Vec<Placement> = Vec::with_capacity(target_sessions);

  // 5. Seeds, in priority order
  seed_swim_technique(setup, &days, &caps, &mut loads, &mut placements, target_sessions);
  seed_long_session(
    inputs,
    long_day,
    &days,
    &caps,
    &mut loads,
    &mut placements,
    target_sessions,
  );
  seed_brick(
    inputs,
    long_day,
    &days,
    &caps,
    &mut loads,
    &mut placements,
    target_sessions,
  );

  // 6-7. Weighted fill onto least-loaded days
  let n_fill = target_sessions.saturating_sub(placements.len());
  let mut discipline_queue = build_discipline_queue(setup, n_fill);
  let rotation = emphasis_rotation(setup.discipline_emphasis);
  let mut rotation_cursor = inputs.week_index as usize % rotation.len();
  let mut type_queue = build_type_queue(setup, n_fill);
  let mut intensity_alternator = 0usize;

  while placements.len() < target_sessions {
    let slot = match least_loaded_slot(&days, &caps, &loads, None) {
      Some(i) => i,
      None => break,
    };
    let day = days[slot];

    let discipline = match discipline_queue.as_mut().and_then(|q| q.pop_front()) {
      Some(d) => d,
      None => match next_in_scope(setup, &rotation, &mut rotation_cursor) {
        Some(d) => d,
        None => break,
      },
    };

    let on_open_intensity_day = open_intensity_days.contains(&day);
    let session_type = match &mut type_queue {
      Some(queue) => {
        let drawn = queue.pop_front().unwrap_or(SessionType::Endurance);
        if drawn.is_intensity() {
          if on_open_intensity_day {
            open_intensity_days.retain(|d| *d != day);
            drawn
          } else {
            // No intensity budget on this day; demote to easy.
            SessionType::Endurance
          }
        } else {
          drawn
        }
      }
      None => {
        if on_open_intensity_day {
          open_intensity_days.retain(|d| *d != day);
          let t = if intensity_alternator % 2 == 0 {
            SessionType::Threshold
          } else {
            SessionType::Tempo
          };
          intensity_alternator += 1;
          t
        } else {
          SessionType::Endurance
        }
      }
    };

    loads[slot] += 1;
    placements.push(Placement {
      day,
      discipline,
      session_type,
      weight: FILL_WEIGHT,
    });
  }

  finish_week(inputs.week_index, &days, placements, target_minutes)
}

/// ---------------------------------------------------------------------------
/// Capacity and intensity-day selection
/// ---------------------------------------------------------------------------

fn day_capacities(n_days: usize, doubles: u8) -> Vec<u32> {
  let mut caps = vec![1u32; n_days];
  let mut assigned = 0u8;
  let mut i = 0usize;
  while assigned < doubles && i < n_days * 2 {
    let idx = i % n_days;
    if caps[idx] < 2 {
      caps[idx] += 1;
      assigned += 1;
    }
    i += 1;
  }
  caps
}

/// The long day is the preferred day when available, else the last canonical
/// day (latest in the week, leaving the most recovery runway). None for plans
/// too short to seed long sessions.
pub(crate) fn resolve_long_day(setup: &NormalizedSetup, days: &[u8], total_weeks: u32) -> Option<u8> {
  if total_weeks < MIN_WEEKS_FOR_LONG_SESSION {
    return None;
  }
  match setup.long_session_day {
    Some(pref) if days.contains(&pref) => Some(pref),
    _ => days.last().copied(),
  }
}

/// Greedy first-fit in canonical order. Adjacency is absolute day-index
/// distance <= 1.
fn pick_intensity_days(days: &[u8], long_day: Option<u8>, cap: u8) -> Vec<u8> {
  let mut chosen: Vec<u8> = Vec::new();
  for day in days {
    if chosen.len() >= cap as usize {
      break;
    }
    if Some(*day) == long_day {
      continue;
    }
    let adjacent = chosen
      .iter()
      .any(|c| (*c as i16 - *day as i16).abs() <= 1);
    if !adjacent {
      chosen.push(*day);
    }
  }
  chosen
}

/// ---------------------------------------------------------------------------
/// Seeds
/// ---------------------------------------------------------------------------

fn seed_swim_technique(
  setup: &NormalizedSetup,
  days: &[u8],
  caps: &[u32],
  loads: &mut [u32],
  placements: &mut Vec<Placement>,
  target: usize,
) {
  if placements.len() >= target || !setup.discipline_in_scope(Discipline::Swim) {
    return;
  }
  if let Some(slot) = first_free_slot(caps, loads) {
    loads[slot] += 1;
    placements.push(Placement {
      day: days[slot],
      discipline: Discipline::Swim,
      session_type: SessionType::Technique,
      weight: FILL_WEIGHT,
    });
  }
}

fn seed_long_session(
  inputs: &WeekInputs,
  long_day: Option<u8>,
  days: &[u8],
  caps: &[u32],
  loads: &mut [u32],
  placements: &mut Vec<Placement>,
  target: usize,
) {
  let long_day = match long_day {
    Some(d) => d,
    None => return,
  };
  if placements.len() >= target {
    return;
  }
  let discipline = match long_discipline(inputs.setup, inputs.week_index) {
    Some(d) => d,
    None => return,
  };
  let slot = days
    .iter()
    .position(|d| *d == long_day)
    .filter(|i| loads[*i] < caps[*i])
    .or_else(|| last_free_slot(caps, loads));
  if let Some(slot) = slot {
    loads[slot] += 1;
    placements.push(Placement {
      day: days[slot],
      discipline,
      session_type: SessionType::Long,
      weight: LONG_WEIGHT,
    });
  }
}

/// Run emphasis keeps the long run; bike emphasis the long ride; otherwise
/// alternate by week parity (even bike, odd run).
fn long_discipline(setup: &NormalizedSetup, week_index: u32) -> Option<Discipline> {
  let by_rule = match setup.discipline_emphasis {
    DisciplineEmphasis::Run => Discipline::Run,
    DisciplineEmphasis::Bike => Discipline::Bike,
    DisciplineEmphasis::Swim | DisciplineEmphasis::Balanced => {
      if week_index % 2 == 0 {
        Discipline::Bike
      } else {
        Discipline::Run
      }
    }
  };
  if setup.discipline_in_scope(by_rule) {
    return Some(by_rule);
  }
  [Discipline::Run, Discipline::Bike]
    .into_iter()
    .find(|d| setup.discipline_in_scope(*d))
}

fn seed_brick(
  inputs: &WeekInputs,
  long_day: Option<u8>,
  days: &[u8],
  caps: &[u32],
  loads: &mut [u32],
  placements: &mut Vec<Placement>,
  target: usize,
) {
  let setup = inputs.setup;
  let risky_enough = matches!(setup.risk_tolerance, RiskTolerance::Med | RiskTolerance::High);
  if !risky_enough
    || inputs.week_index % 2 == 0
    || placements.len() >= target
    || !setup.discipline_in_scope(Discipline::Bike)
    || !setup.discipline_in_scope(Discipline::Run)
  {
    return;
  }
  if let Some(slot) = least_loaded_slot(days, caps, loads, long_day) {
    loads[slot] += 1;
    placements.push(Placement {
      day: days[slot],
      discipline: Discipline::Brick,
      session_type: SessionType::Brick,
      weight: BRICK_WEIGHT,
    });
  }
}

/// ---------------------------------------------------------------------------
/// Fill queues
/// ---------------------------------------------------------------------------

/// Largest-remainder allocation of fill slots across weighted disciplines,
/// interleaved round-robin in canonical order.
fn build_discipline_queue(setup: &NormalizedSetup, n_fill: usize) -> Option<VecDeque<Discipline>> {
  let weights = setup.discipline_weights.as_ref()?;
  let entries: Vec<(Discipline, f64)> = weights
    .iter()
    .filter(|(d, _)| **d != Discipline::Brick)
    .map(|(d, w)| (*d, *w))
    .collect();
  if entries.is_empty() {
    return None;
  }
  let alloc = apportion(
    &entries.iter().map(|(_, w)| *w).collect::<Vec<f64>>(),
    n_fill as u32,
  );
  let mut remaining: Vec<(Discipline, u32)> = entries
    .iter()
    .zip(alloc.iter())
    .map(|((d, _), n)| (*d, *n))
    .collect();
  let mut queue = VecDeque::with_capacity(n_fill);
  while queue.len() < n_fill {
    let mut advanced = false;
    for (discipline, count) in remaining.iter_mut() {
      if *count > 0 {
        queue.push_back(*discipline);
        *count -= 1;
        advanced = true;
      }
    }
    if !advanced {
      break;
    }
  }
  Some(queue)
}

fn build_type_queue(setup: &NormalizedSetup, n_fill: usize) -> Option<VecDeque<SessionType>> {
  let weights = setup.type_weights.as_ref()?;
  // Long and brick sessions are seeded, never filled.
  let entries: Vec<(SessionType, f64)> = weights
    .iter()
    .filter(|(t, _)| !matches!(t, SessionType::Long | SessionType::Brick))
    .map(|(t, w)| (*t, *w))
    .collect();
  if entries.is_empty() {
    return None;
  }
  let alloc = apportion(
    &entries.iter().map(|(_, w)| *w).collect::<Vec<f64>>(),
    n_fill as u32,
  );
  let mut remaining: Vec<(SessionType, u32)> = entries
    .iter()
    .zip(alloc.iter())
    .map(|((t, _), n)| (*t, *n))
    .collect();
  let mut queue = VecDeque::with_capacity(n_fill);
  while queue.len() < n_fill {
    let mut advanced = false;
    for (session_type, count) in remaining.iter_mut() {
      if *count > 0 {
        queue.push_back(*session_type);
        *count -= 1;
        advanced = true;
      }
    }
    if !advanced {
      break;
    }
  }
  Some(queue)
}

fn emphasis_rotation(emphasis: DisciplineEmphasis) -> Vec<Discipline> {
  match emphasis {
    DisciplineEmphasis::Balanced => vec![Discipline::Run, Discipline::Bike, Discipline::Swim],
    DisciplineEmphasis::Run => vec![Discipline::Run, Discipline::Bike, Discipline::Swim],
    DisciplineEmphasis::Bike => vec![Discipline::Bike, Discipline::Run, Discipline::Swim],
    DisciplineEmphasis::Swim => vec![Discipline::Swim, Discipline::Run, Discipline::Bike],
  }
}

fn next_in_scope(
  setup: &NormalizedSetup,
  rotation: &[Discipline],
  cursor: &mut usize,
) -> Option<Discipline> {
  for _ in 0..rotation.len() {
    let d = rotation[*cursor % rotation.len()];
    *cursor += 1;
    if setup.discipline_in_scope(d) {
      return Some(d);
    }
  }
  None
}

/// ---------------------------------------------------------------------------
/// Slot helpers
/// ---------------------------------------------------------------------------

fn first_free_slot(caps: &[u32], loads: &[u32]) -> Option<usize> {
  (0..caps.len()).find(|i| loads[*i] < caps[*i])
}

fn last_free_slot(caps: &[u32], loads: &[u32]) -> Option<usize> {
  (0..caps.len()).rev().find(|i| loads[*i] < caps[*i])
}

fn least_loaded_slot(
  days: &[u8],
  caps: &[u32],
  loads: &[u32],
  exclude_day: Option<u8>,
) -> Option<usize> {
  let mut best: Option<usize> = None;
  for i in 0..days.len() {
    if Some(days[i]) == exclude_day || loads[i] >= caps[i] {
      continue;
    }
    match best {
      None => best = Some(i),
      Some(b) if loads[i] < loads[b] => best = Some(i),
      _ => {}
    }
  }
  best
}

/// ---------------------------------------------------------------------------
/// Assembly
/// ---------------------------------------------------------------------------

fn finish_week(
  week_index: u32,
  days: &[u8],
  mut placements: Vec<Placement>,
  target_minutes: u32,
) -> Vec<Session> {
  if placements.is_empty() {
    return Vec::new();
  }
  let weights: Vec<f64> = placements.iter().map(|p| p.weight).collect();
  let minutes = apportion(&weights, target_minutes);

  let day_position = |day: u8| days.iter().position(|d| *d == day).unwrap_or(days.len());
  let mut indexed: Vec<(usize, Placement, u32)> = placements
    .drain(..)
    .zip(minutes)
    .enumerate()
    .map(|(i, (p, m))| (i, p, m))
    .collect();
  indexed.sort_by_key(|(i, p, _)| (day_position(p.day), *i));

  indexed
    .into_iter()
    .enumerate()
    .map(|(ordinal, (_, p, m))| Session {
      week_index,
      ordinal: ordinal as u32,
      day_of_week: p.day,
      discipline: p.discipline,
      session_type: p.session_type,
      duration_minutes: m.clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES),
      notes: None,
      locked: false,
      detail: None,
      detail_input_hash: None,
      detail_mode: None,
    })
    .collect()
}
