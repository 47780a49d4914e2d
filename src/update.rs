//! Draft plan updates
//!
//! Coach-driven edits to a stored draft: lock toggles, session field edits,
//! and block-level detail edits. A request is applied as one batch against a
//! clone of the stored plan; the first failure aborts the whole batch and the
//! stored draft is untouched. Lock checks run against the plan state as the
//! batch has evolved, so unlocking and editing in one request works.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::detail::{
  apply_coach_edits, build_detail, detail_input_hash, reflow_detail, BlockEdit, DetailError,
};
use crate::models::brief::AthleteBrief;
use crate::models::detail::{DetailMode, SessionDetail};
use crate::models::plan::{
  Discipline, DraftPlan, Session, SessionType, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES,
};
use crate::router::lock_or_recover;

/// Ceiling on how long one update batch may take end to end, storage included.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(15);

/// ---------------------------------------------------------------------------
/// Storage
/// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("draft {0} not found")]
  DraftNotFound(String),

  #[error("draft {draft_id} has no session at week {week_index} ordinal {ordinal}")]
  SessionNotFound {
    draft_id: String,
    week_index: u32,
    ordinal: u32,
  },

  #[error("storage backend error: {0}")]
  Backend(String),
}

/// Persistence seam for draft plans. Drafts are stored whole; session detail
/// writes are scoped so concurrent detail workers never clobber each other's
/// sessions.
#[async_trait]
pub trait DraftStore: Send + Sync {
  async fn load_draft(&self, draft_id: &str) -> Result<DraftPlan, StoreError>;

  async fn commit_draft(&self, draft_id: &str, plan: &DraftPlan) -> Result<(), StoreError>;

  async fn save_session_detail(
    &self,
    draft_id: &str,
    week_index: u32,
    ordinal: u32,
    detail: &SessionDetail,
    input_hash: &str,
    mode: DetailMode,
  ) -> Result<(), StoreError>;
}

/// In-memory store keyed by draft id.
#[derive(Default)]
pub struct MemoryDraftStore {
  drafts: Mutex<HashMap<String, DraftPlan>>,
}

impl MemoryDraftStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_draft(&self, draft_id: &str, plan: DraftPlan) {
    lock_or_recover(&self.drafts).insert(draft_id.to_string(), plan);
  }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
  async fn load_draft(&self, draft_id: &str) -> Result<DraftPlan, StoreError> {
    lock_or_recover(&self.drafts)
      .get(draft_id)
      .cloned()
      .ok_or_else(|| StoreError::DraftNotFound(draft_id.to_string()))
  }

  async fn commit_draft(&self, draft_id: &str, plan: &DraftPlan) -> Result<(), StoreError> {
    let mut drafts = lock_or_recover(&self.drafts);
    if !drafts.contains_key(draft_id) {
      return Err(StoreError::DraftNotFound(draft_id.to_string()));
    }
    drafts.insert(draft_id.to_string(), plan.clone());
    Ok(())
  }

  async fn save_session_detail(
    &self,
    draft_id: &str,
    week_index: u32,
    ordinal: u32,
    detail: &SessionDetail,
    input_hash: &str,
    mode: DetailMode,
  ) -> Result<(), StoreError> {
    let mut drafts = lock_or_recover(&self.drafts);
    let plan = drafts
      .get_mut(draft_id)
      .ok_or_else(|| StoreError::DraftNotFound(draft_id.to_string()))?;
    let session = plan
      .weeks
      .iter_mut()
      .find(|w| w.week_index == week_index)
      .and_then(|w| w.sessions.iter_mut().find(|s| s.ordinal == ordinal))
      .ok_or_else(|| StoreError::SessionNotFound {
        draft_id: draft_id.to_string(),
        week_index,
        ordinal,
      })?;
    session.detail = Some(detail.clone());
    session.detail_input_hash = Some(input_hash.to_string());
    session.detail_mode = Some(mode);
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Update requests
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
  pub week_index: u32,
  pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLockEdit {
  pub target: SessionRef,
  pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEdit {
  pub target: SessionRef,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub day_of_week: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discipline: Option<Discipline>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub session_type: Option<SessionType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_minutes: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailEdit {
  pub target: SessionRef,
  pub block_edits: Vec<BlockEdit>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub objective: Option<String>,
}

/// One batch of edits. Lock changes apply before session and detail edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
  #[serde(default)]
  pub week_locks: BTreeMap<u32, bool>,
  #[serde(default)]
  pub session_locks: Vec<SessionLockEdit>,
  #[serde(default)]
  pub session_edits: Vec<SessionEdit>,
  #[serde(default)]
  pub detail_edits: Vec<DetailEdit>,
}

#[derive(Debug, Error)]
pub enum UpdateError {
  #[error("session at week {week_index} ordinal {ordinal} is locked")]
  SessionLocked { week_index: u32, ordinal: u32 },

  #[error("week {0} is locked")]
  WeekLocked(u32),

  #[error("no session at week {week_index} ordinal {ordinal}")]
  UnknownSession { week_index: u32, ordinal: u32 },

  #[error("duration {0} min is outside the 20-240 min range")]
  InvalidDuration(u32),

  #[error("day {0} is outside 0-6")]
  DayOutOfRange(u8),

  #[error(transparent)]
  Detail(#[from] DetailError),

  #[error("update timed out")]
  Timeout,

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl UpdateError {
  pub fn code(&self) -> &'static str {
    match self {
      UpdateError::SessionLocked { .. } => "SESSION_LOCKED",
      UpdateError::WeekLocked(_) => "WEEK_LOCKED",
      UpdateError::UnknownSession { .. } => "UNKNOWN_SESSION",
      UpdateError::InvalidDuration(_) => "INVALID_DURATION",
      UpdateError::DayOutOfRange(_) => "INVALID_DAY",
      UpdateError::Detail(_) => "UNKNOWN_BLOCK",
      UpdateError::Timeout => "TIMEOUT",
      UpdateError::Store(_) => "STORE_ERROR",
    }
  }
}

/// ---------------------------------------------------------------------------
/// Batch application
/// ---------------------------------------------------------------------------

/// Apply an edit batch to a stored draft with the default timeout. Returns
/// the updated plan on success; on any failure the stored draft is unchanged.
pub async fn update_draft_plan(
  store: &dyn DraftStore,
  draft_id: &str,
  request: &UpdateRequest,
  brief: Option<&AthleteBrief>,
) -> Result<DraftPlan, UpdateError> {
  update_draft_plan_with_timeout(store, draft_id, request, brief, DEFAULT_UPDATE_TIMEOUT).await
}

pub async fn update_draft_plan_with_timeout(
  store: &dyn DraftStore,
  draft_id: &str,
  request: &UpdateRequest,
  brief: Option<&AthleteBrief>,
  timeout: Duration,
) -> Result<DraftPlan, UpdateError> {
  match tokio::time::timeout(timeout, apply_update(store, draft_id, request, brief)).await {
    Ok(result) => result,
    Err(_) => Err(UpdateError::Timeout),
  }
}

async fn apply_update(
  store: &dyn DraftStore,
  draft_id: &str,
  request: &UpdateRequest,
  brief: Option<&AthleteBrief>,
) -> Result<DraftPlan, UpdateError> {
  let plan = store.load_draft(draft_id).await?;
  let mut updated = plan.clone();

  // Lock changes land first so a single batch can unlock and then edit.
  for (week_index, locked) in &request.week_locks {
    if let Some(week) = updated.weeks.iter_mut().find(|w| w.week_index == *week_index) {
      week.locked = *locked;
    }
  }
  for lock_edit in &request.session_locks {
    let target = lock_edit.target;
    let week = updated
      .weeks
      .iter_mut()
      .find(|w| w.week_index == target.week_index)
      .ok_or(UpdateError::UnknownSession {
        week_index: target.week_index,
        ordinal: target.ordinal,
      })?;
    if week.locked {
      return Err(UpdateError::WeekLocked(target.week_index));
    }
    let session = week
      .sessions
      .iter_mut()
      .find(|s| s.ordinal == target.ordinal)
      .ok_or(UpdateError::UnknownSession {
        week_index: target.week_index,
        ordinal: target.ordinal,
      })?;
    // A session's own lock never blocks its own toggle.
    session.locked = lock_edit.locked;
  }

  for edit in &request.session_edits {
    let session = editable_session(&mut updated, edit.target)?;
    apply_session_edit(session, edit, brief)?;
  }

  for edit in &request.detail_edits {
    let session = editable_session(&mut updated, edit.target)?;
    apply_detail_edit(session, edit, brief)?;
  }

  store.commit_draft(draft_id, &updated).await?;
  info!(
    draft_id,
    session_edits = request.session_edits.len(),
    detail_edits = request.detail_edits.len(),
    "draft update committed"
  );
  Ok(updated)
}

/// Resolve a target to a mutable session, enforcing week and session locks.
fn editable_session(
  plan: &mut DraftPlan,
  target: SessionRef,
) -> Result<&mut Session, UpdateError> {
  let week = plan
    .weeks
    .iter_mut()
    .find(|w| w.week_index == target.week_index)
    .ok_or(UpdateError::UnknownSession {
      week_index: target.week_index,
      ordinal: target.ordinal,
    })?;
  if week.locked {
    return Err(UpdateError::WeekLocked(target.week_index));
  }
  let session = week
    .sessions
    .iter_mut()
    .find(|s| s.ordinal == target.ordinal)
    .ok_or(UpdateError::UnknownSession {
      week_index: target.week_index,
      ordinal: target.ordinal,
    })?;
  if session.locked {
    return Err(UpdateError::SessionLocked {
      week_index: target.week_index,
      ordinal: target.ordinal,
    });
  }
  Ok(session)
}

fn apply_session_edit(
  session: &mut Session,
  edit: &SessionEdit,
  brief: Option<&AthleteBrief>,
) -> Result<(), UpdateError> {
  if let Some(day) = edit.day_of_week {
    if day > 6 {
      return Err(UpdateError::DayOutOfRange(day));
    }
  }
  if let Some(minutes) = edit.duration_minutes {
    if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&minutes) {
      return Err(UpdateError::InvalidDuration(minutes));
    }
  }

  let new_discipline = edit.discipline.unwrap_or(session.discipline);
  let new_type = edit.session_type.unwrap_or(session.session_type);
  let identity_changed =
    new_discipline != session.discipline || new_type != session.session_type;

  if let Some(day) = edit.day_of_week {
    session.day_of_week = day;
  }
  session.discipline = new_discipline;
  session.session_type = new_type;
  if let Some(notes) = &edit.notes {
    session.notes = Some(notes.clone());
  }

  if identity_changed && session.detail.is_some() {
    if session.detail_mode == Some(DetailMode::Coach) {
      // Coach-authored detail survives an identity change; only the
      // duration reflows below.
      debug!(
        week_index = session.week_index,
        ordinal = session.ordinal,
        "identity change kept coach detail"
      );
    } else {
      session.detail = Some(build_detail(
        new_discipline,
        new_type,
        session.duration_minutes,
        brief,
      ));
    }
  }

  if let Some(minutes) = edit.duration_minutes {
    session.duration_minutes = minutes;
    if let Some(detail) = session.detail.as_mut() {
      reflow_detail(detail, minutes);
    }
  }

  if session.detail.is_some() {
    session.detail_input_hash = Some(detail_input_hash(
      session.discipline,
      session.session_type,
      session.duration_minutes,
      brief,
    ));
  }
  Ok(())
}

fn apply_detail_edit(
  session: &mut Session,
  edit: &DetailEdit,
  brief: Option<&AthleteBrief>,
) -> Result<(), UpdateError> {
  let mut detail = match session.detail.take() {
    Some(detail) => detail,
    None => build_detail(
      session.discipline,
      session.session_type,
      session.duration_minutes,
      brief,
    ),
  };

  let new_total = apply_coach_edits(&mut detail, &edit.block_edits, edit.objective.as_deref())?;
  if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&new_total) {
    return Err(UpdateError::InvalidDuration(new_total));
  }

  session.duration_minutes = new_total;
  session.detail = Some(detail);
  session.detail_mode = Some(DetailMode::Coach);
  session.detail_input_hash = Some(detail_input_hash(
    session.discipline,
    session.session_type,
    new_total,
    brief,
  ));
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
