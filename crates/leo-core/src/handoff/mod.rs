//! PLAN-TO-LEAD handoff: setup, the LEAD-final gate run, and the
//! completion path that moves an SD to LEAD approval.

pub mod completion;
pub mod plan_to_lead;
pub mod setup;
pub mod verification;

pub use completion::{cascade_parents, next_commands, Cascade, CompletionPath};
pub use plan_to_lead::{reason_code_for, Collaborators, HandoffOutcome, PlanToLeadExecutor};
pub use setup::{prepare_retrospective, HistoryRetroGenerator, RetroGenerator};
pub use verification::{validate_plan_verification, PlanVerification};
