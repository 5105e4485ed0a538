use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SdType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdType {
    Feature,
    Enhancement,
    Bugfix,
    Infrastructure,
    Database,
    Security,
    Documentation,
    Process,
    Refactor,
}

impl SdType {
    pub fn all() -> &'static [SdType] {
        &[
            SdType::Feature,
            SdType::Enhancement,
            SdType::Bugfix,
            SdType::Infrastructure,
            SdType::Database,
            SdType::Security,
            SdType::Documentation,
            SdType::Process,
            SdType::Refactor,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SdType::Feature => "feature",
            SdType::Enhancement => "enhancement",
            SdType::Bugfix => "bugfix",
            SdType::Infrastructure => "infrastructure",
            SdType::Database => "database",
            SdType::Security => "security",
            SdType::Documentation => "documentation",
            SdType::Process => "process",
            SdType::Refactor => "refactor",
        }
    }

    /// Parse a declared type, tolerating case and surrounding whitespace.
    /// Empty strings are not a type.
    pub fn parse(s: &str) -> Option<SdType> {
        let s = s.trim().to_ascii_lowercase();
        SdType::all().iter().copied().find(|t| t.as_str() == s)
    }

    /// Types that ship no application code and are exempt from code-centric
    /// prerequisites (EXEC-TO-PLAN handoff, git enforcement, traceability).
    pub fn is_non_code(self) -> bool {
        matches!(
            self,
            SdType::Infrastructure | SdType::Documentation | SdType::Process
        )
    }
}

impl fmt::Display for SdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SdType {
    type Err = crate::error::LeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SdType::parse(s).ok_or_else(|| crate::error::LeoError::InvalidSdType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SdStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SdStatus {
    #[default]
    Draft,
    Active,
    InProgress,
    PendingApproval,
    Completed,
    Cancelled,
    #[serde(other)]
    Other,
}

impl SdStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SdStatus::Draft => "draft",
            SdStatus::Active => "active",
            SdStatus::InProgress => "in_progress",
            SdStatus::PendingApproval => "pending_approval",
            SdStatus::Completed => "completed",
            SdStatus::Cancelled => "cancelled",
            SdStatus::Other => "other",
        }
    }
}

impl fmt::Display for SdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HandoffType / HandoffStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandoffType {
    #[serde(rename = "LEAD-TO-PLAN")]
    LeadToPlan,
    #[serde(rename = "PLAN-TO-EXEC")]
    PlanToExec,
    #[serde(rename = "EXEC-TO-PLAN")]
    ExecToPlan,
    #[serde(rename = "PLAN-TO-LEAD")]
    PlanToLead,
}

impl HandoffType {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoffType::LeadToPlan => "LEAD-TO-PLAN",
            HandoffType::PlanToExec => "PLAN-TO-EXEC",
            HandoffType::ExecToPlan => "EXEC-TO-PLAN",
            HandoffType::PlanToLead => "PLAN-TO-LEAD",
        }
    }
}

impl fmt::Display for HandoffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HandoffType {
    type Err = crate::error::LeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "LEAD-TO-PLAN" => Ok(HandoffType::LeadToPlan),
            "PLAN-TO-EXEC" => Ok(HandoffType::PlanToExec),
            "EXEC-TO-PLAN" => Ok(HandoffType::ExecToPlan),
            "PLAN-TO-LEAD" => Ok(HandoffType::PlanToLead),
            _ => Err(crate::error::LeoError::InvalidHandoffType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Accepted,
    Rejected,
    #[default]
    #[serde(other)]
    Other,
}

impl HandoffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoffStatus::Accepted => "accepted",
            HandoffStatus::Rejected => "rejected",
            HandoffStatus::Other => "other",
        }
    }
}

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Immutable,
    Governed,
    Auto,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Immutable => "IMMUTABLE",
            RiskTier::Governed => "GOVERNED",
            RiskTier::Auto => "AUTO",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Upsert => "UPSERT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = crate::error::LeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            "UPSERT" => Ok(Operation::Upsert),
            _ => Err(crate::error::LeoError::InvalidOperation(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    NeedsRevision,
    Reject,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Approve => "APPROVE",
            Recommendation::NeedsRevision => "NEEDS_REVISION",
            Recommendation::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
