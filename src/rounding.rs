//! Duration humanization
//!
//! Rounds session durations to coach-friendly steps (10 min on the long or
//! brick day and for anything 90+, else 5 min), then walks the rounding error
//! back into the week by nudging sessions in their own step size until the
//! pre-rounding total is restored. Non-long-day sessions are adjusted before
//! long-day ones, smaller steps before larger, and every nudge stays inside
//! the valid duration range.

use crate::models::plan::{Session, SessionType, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES};

const COARSE_STEP: u32 = 10;
const FINE_STEP: u32 = 5;
const COARSE_THRESHOLD_MINUTES: u32 = 90;
const MAX_NUDGE_ITERATIONS: usize = 500;

/// Split `total` across `weights` with largest-remainder allocation. Ties on
/// the fractional part resolve to the lower index.
pub(crate) fn apportion(weights: &[f64], total: u32) -> Vec<u32> {
  if weights.is_empty() {
    return Vec::new();
  }
  let sum: f64 = weights.iter().sum();
  if sum <= 0.0 || !sum.is_finite() {
    let n = weights.len() as u32;
    let base = total / n;
    let extra = (total % n) as usize;
    return (0..weights.len())
      .map(|i| base + u32::from(i < extra))
      .collect();
  }
  let raw: Vec<f64> = weights.iter().map(|w| total as f64 * w / sum).collect();
  let mut out: Vec<u32> = raw.iter().map(|r| r.floor() as u32).collect();
  let assigned: u32 = out.iter().sum();
  let mut remaining = total.saturating_sub(assigned);

  let mut order: Vec<usize> = (0..raw.len()).collect();
  order.sort_by(|a, b| {
    raw[*b]
      .fract()
      .partial_cmp(&raw[*a].fract())
      .unwrap_or(std::cmp::Ordering::Equal)
      .then(a.cmp(b))
  });
  for idx in order {
    if remaining == 0 {
      break;
    }
    out[idx] += 1;
    remaining -= 1;
  }
  out
}

/// ---------------------------------------------------------------------------
/// Week humanization
/// ---------------------------------------------------------------------------

/// Round and re-balance one week's durations in place. Returns the residual
/// (pre-rounding total minus final total); non-zero only when no adjustable
/// session remains, and then never more than one step.
pub fn humanize_week_durations(sessions: &mut [Session], long_day: Option<u8>) -> i64 {
  if sessions.is_empty() {
    return 0;
  }

  let original_total: i64 = sessions.iter().map(|s| s.duration_minutes as i64).sum();

  // Step sizes are fixed from the pre-rounding state so nudging cannot
  // reclassify a session mid-walk.
  let long_slot: Vec<bool> = sessions
    .iter()
    .map(|s| {
      Some(s.day_of_week) == long_day
        || matches!(s.session_type, SessionType::Long | SessionType::Brick)
    })
    .collect();
  let steps: Vec<u32> = sessions
    .iter()
    .zip(&long_slot)
    .map(|(s, is_long)| {
      if *is_long || s.duration_minutes >= COARSE_THRESHOLD_MINUTES {
        COARSE_STEP
      } else {
        FINE_STEP
      }
    })
    .collect();

  for (session, step) in sessions.iter_mut().zip(&steps) {
    let rounded = (session.duration_minutes + step / 2) / step * step;
    session.duration_minutes = rounded.clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES);
  }

  let mut diff =
    original_total - sessions.iter().map(|s| s.duration_minutes as i64).sum::<i64>();

  for _ in 0..MAX_NUDGE_ITERATIONS {
    if diff == 0 {
      break;
    }
    let candidate = if diff > 0 {
      // Nudge the smallest eligible session up.
      sessions
        .iter()
        .enumerate()
        .filter(|(i, s)| {
          steps[*i] as i64 <= diff
            && s.duration_minutes + steps[*i] <= MAX_SESSION_MINUTES
        })
        .min_by_key(|(i, s)| (long_slot[*i], steps[*i], s.duration_minutes, *i))
        .map(|(i, _)| i)
    } else {
      // Nudge the largest eligible session down.
      sessions
        .iter()
        .enumerate()
        .filter(|(i, s)| {
          steps[*i] as i64 <= -diff
            && s.duration_minutes >= MIN_SESSION_MINUTES + steps[*i]
        })
        .min_by_key(|(i, s)| (long_slot[*i], steps[*i], u32::MAX - s.duration_minutes, *i))
        .map(|(i, _)| i)
    };
    let idx = match candidate {
      Some(i) => i,
      None => break,
    };
    if diff > 0 {
      sessions[idx].duration_minutes += steps[idx];
      diff -= steps[idx] as i64;
    } else {
      sessions[idx].duration_minutes -= steps[idx];
      diff += steps[idx] as i64;
    }
  }

  diff
}
