pub mod config;
pub mod eligibility;
pub mod handoff;
pub mod init;
pub mod judge;
pub mod protocol;
pub mod risk;
pub mod sd;
pub mod uat;
