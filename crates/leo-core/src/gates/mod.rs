//! The LEAD-final gate suite.
//!
//! Each gate is a small struct implementing [`crate::gate::Gate`].
//! External collaborators (sub-agent executor, git, retrospective scorer,
//! prior-gate validators) are injected as trait objects so tests and
//! offline runs can substitute them.

pub mod documentation;
pub mod git;
pub mod prerequisite;
pub mod protocol;
pub mod retrospective;
pub mod sub_agent;
pub mod traceability;
pub mod user_story;

#[cfg(test)]
pub(crate) mod testing;

pub use documentation::DocumentationLinkGate;
pub use git::{GitCliVerifier, GitCommitGate, GitReport, GitVerifier};
pub use prerequisite::PrerequisiteHandoffGate;
pub use protocol::{ProtocolFileReadGate, SdStartGate};
pub use retrospective::{
    HeuristicRetroScorer, LlmRetroScorer, RetroScore, RetroScorer, RetrospectiveGate,
};
pub use sub_agent::{OrchestrationReport, RecordedVerdicts, SubAgentGate, SubAgentOrchestrator};
pub use traceability::{
    PriorGateValidator, TraceabilityGate, TraceabilityScorer, WorkflowRoiGate, WorkflowRoiScorer,
};
pub use user_story::UserStoryGate;
