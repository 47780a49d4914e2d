//! Free-text coach guidance classification
//!
//! Parses guidance text once into explicit structured flags (beginner,
//! injury, travel windows) so downstream scheduling never re-reads text.
//! Pure; no I/O.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::setup::NormalizedSetup;

/// ---------------------------------------------------------------------------
/// Classification patterns
/// ---------------------------------------------------------------------------

static BEGINNER_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(beginners?|novice|new to|just start(?:ed|ing)|first (?:5k|10k|race|triathlon|marathon|season)|couch[ -]to[ -][a-z0-9]+|never (?:run|ridden|swum|raced))\b",
  )
  .expect("valid beginner regex")
});

static INJURY_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(injur[a-z]*|pain[a-z]*|sore[a-z]*|aches?|aching|achy|joints?|tendon[a-z]*|sprain[a-z]*|strain[a-z]*|shin splints?|plantar|stress fracture|recovering from)\b",
  )
  .expect("valid injury regex")
});

static TRAVEL_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)\b(travel(?:ing|ling)?|trip|vacation|out of town|on the road|away (?:for|from|on))\b")
    .expect("valid travel regex")
});

static TRAVEL_WEEK_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\bweek\s+(\d{1,2})\b").expect("valid travel week regex"));

static MONTH_DAY_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+(\d{1,2})(?:\s*(?:-|–|to|through)\s*(?:(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+)?(\d{1,2}))?\b",
  )
  .expect("valid month-day regex")
});

static NUMERIC_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\b(\d{1,2})/(\d{1,2})\s*(?:-|–|to|through)\s*(\d{1,2})/(\d{1,2})\b")
    .expect("valid numeric date range regex")
});

/// ---------------------------------------------------------------------------
/// Structured signals
/// ---------------------------------------------------------------------------

/// A travel window as month/day endpoints. Year-free until anchored against
/// the plan's start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelWindow {
  pub start_month: u32,
  pub start_day: u32,
  pub end_month: u32,
  pub end_day: u32,
}

impl TravelWindow {
  /// Anchor against a concrete date. Windows that would fall before the
  /// anchor roll forward one year; a range ending in an earlier month than it
  /// starts (e.g. Dec 28 - Jan 3) crosses the year boundary.
  pub fn resolve(&self, anchor: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let mut start = NaiveDate::from_ymd_opt(anchor.year(), self.start_month, self.start_day)?;
    if start < anchor {
      start = NaiveDate::from_ymd_opt(anchor.year() + 1, self.start_month, self.start_day)?;
    }
    let end_year = if self.end_month < self.start_month {
      start.year() + 1
    } else {
      start.year()
    };
    let end = NaiveDate::from_ymd_opt(end_year, self.end_month, self.end_day)?;
    if end < start {
      return None;
    }
    Some((start, end))
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuidanceSignals {
  pub beginner: bool,
  pub injury: bool,
  /// Date-shaped windows; need a plan start date to map onto week indices.
  pub travel_windows: Vec<TravelWindow>,
  /// One-based "week N" mentions near travel keywords, usable without dates.
  pub travel_week_mentions: Vec<u32>,
}

impl GuidanceSignals {
  pub fn has_travel(&self) -> bool {
    !self.travel_windows.is_empty() || !self.travel_week_mentions.is_empty()
  }
}

/// Per-week travel resolution against a normalized setup.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelSchedule {
  /// One flag per plan week.
  pub weeks: Vec<bool>,
  /// Date-shaped windows existed but no start date was given to anchor them.
  pub unanchored: bool,
}

/// ---------------------------------------------------------------------------
/// Classification
/// ---------------------------------------------------------------------------

pub fn classify_guidance(guidance: Option<&str>) -> GuidanceSignals {
  let text = match guidance {
    Some(t) if !t.trim().is_empty() => t,
    _ => return GuidanceSignals::default(),
  };

  let beginner = BEGINNER_REGEX.is_match(text);
  let injury = INJURY_REGEX.is_match(text);

  let mut travel_windows = Vec::new();
  let mut travel_week_mentions = Vec::new();
  if TRAVEL_REGEX.is_match(text) {
    for caps in MONTH_DAY_REGEX.captures_iter(text) {
      let start_month = match month_index(&caps[1]) {
        Some(m) => m,
        None => continue,
      };
      let start_day: u32 = match caps[2].parse() {
        Ok(d) if (1..=31).contains(&d) => d,
        _ => continue,
      };
      let end_month = caps
        .get(3)
        .and_then(|m| month_index(m.as_str()))
        .unwrap_or(start_month);
      let end_day = caps
        .get(4)
        .and_then(|d| d.as_str().parse::<u32>().ok())
        .filter(|d| (1..=31).contains(d))
        .unwrap_or(start_day);
      travel_windows.push(TravelWindow {
        start_month,
        start_day,
        end_month,
        end_day,
      });
    }
    for caps in NUMERIC_RANGE_REGEX.captures_iter(text) {
      let parsed: Vec<u32> = (1..=4usize).filter_map(|i| caps[i].parse().ok()).collect();
      if let [m1, d1, m2, d2] = parsed[..] {
        if (1..=12).contains(&m1) && (1..=12).contains(&m2) && (1..=31).contains(&d1) && (1..=31).contains(&d2) {
          travel_windows.push(TravelWindow {
            start_month: m1,
            start_day: d1,
            end_month: m2,
            end_day: d2,
          });
        }
      }
    }
    for caps in TRAVEL_WEEK_REGEX.captures_iter(text) {
      if let Ok(n) = caps[1].parse::<u32>() {
        if n >= 1 {
          travel_week_mentions.push(n);
        }
      }
    }
  }

  GuidanceSignals {
    beginner,
    injury,
    travel_windows,
    travel_week_mentions,
  }
}

/// Map signals onto per-week travel flags. "Week N" mentions are one-based
/// and need no dates; date windows need a start date, otherwise they are
/// ignored and reported as unanchored.
pub fn travel_week_flags(signals: &GuidanceSignals, setup: &NormalizedSetup) -> TravelSchedule {
  let week_count = setup.weeks_to_event as usize;
  let mut weeks = vec![false; week_count];

  for mention in &signals.travel_week_mentions {
    let idx = (mention - 1) as usize;
    if idx < week_count {
      weeks[idx] = true;
    }
  }

  let mut unanchored = false;
  if !signals.travel_windows.is_empty() {
    match setup.start_date {
      Some(start_date) => {
        let week0_start = start_of_week(start_date, setup.week_start_day);
        for window in &signals.travel_windows {
          if let Some((w_start, w_end)) = window.resolve(start_date) {
            for (idx, flag) in weeks.iter_mut().enumerate() {
              let ws = week0_start + chrono::Duration::days(7 * idx as i64);
              let we = ws + chrono::Duration::days(6);
              if w_start <= we && w_end >= ws {
                *flag = true;
              }
            }
          }
        }
      }
      None => unanchored = true,
    }
  }

  TravelSchedule { weeks, unanchored }
}

fn start_of_week(date: NaiveDate, week_start_day: u8) -> NaiveDate {
  let dow = date.weekday().num_days_from_sunday() as i64;
  let offset = (7 + dow - week_start_day as i64) % 7;
  date - chrono::Duration::days(offset)
}

fn month_index(name: &str) -> Option<u32> {
  let lower = name.to_lowercase();
  let prefix = lower.get(..3)?;
  match prefix {
    "jan" => Some(1),
    "feb" => Some(2),
    "mar" => Some(3),
    "apr" => Some(4),
    "may" => Some(5),
    "jun" => Some(6),
    "jul" => Some(7),
    "aug" => Some(8),
    "sep" => Some(9),
    "oct" => Some(10),
    "nov" => Some(11),
    "dec" => Some(12),
    _ => None,
  }
}
