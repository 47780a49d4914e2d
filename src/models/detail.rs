use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
  Warmup,
  Main,
  Transition,
  Cooldown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailBlock {
  pub block_type: BlockType,
  pub steps: Vec<String>,
  pub minutes: u32,
}

/// Block-level workout detail for one session. Invariant: the block minutes
/// sum to the parent session's durationMinutes after any reflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
  pub objective: String,
  pub structure: Vec<DetailBlock>,
  pub targets: BTreeMap<String, String>,
  pub cues: Vec<String>,
  pub safety_notes: Vec<String>,
}

impl SessionDetail {
  pub fn total_minutes(&self) -> u32 {
    self.structure.iter().map(|b| b.minutes).sum()
  }
}

/// Who last shaped the detail. Coach-authored detail is never overwritten by
/// automated enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailMode {
  Auto,
  Coach,
}
