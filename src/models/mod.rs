pub mod audit;
pub mod brief;
pub mod detail;
pub mod diff;
pub mod plan;
pub mod setup;

pub use audit::{AiErrorCode, AiInvocationAudit, AiMode};
pub use brief::{AthleteBrief, IntakePayload};
pub use detail::{DetailMode, SessionDetail};
pub use diff::{DraftSnapshot, PlanDiffOp, ProposalDiff, TriggerType};
pub use plan::{Discipline, DraftPlan, Session, SessionType, Week};
pub use setup::{NormalizedSetup, PlanSetup};
