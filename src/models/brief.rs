use serde::{Deserialize, Serialize};

use super::plan::Discipline;

/// Structured intake captured before plan generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakePayload {
  pub goal_text: String,
  pub disciplines: Vec<Discipline>,
  pub constraints: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coaching_tone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub guidance: Option<String>,
}

/// Read-only derived snapshot of the athlete, consumed by detail synthesis
/// and never written by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteBrief {
  pub goal_summary: String,
  pub disciplines: Vec<Discipline>,
  pub constraints: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coaching_tone: Option<String>,
  pub risk_flags: Vec<String>,
}

impl AthleteBrief {
  /// Stable string used when hashing detail inputs. Field order is the struct
  /// order, so identical briefs always produce identical fingerprints.
  pub fn fingerprint(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}
