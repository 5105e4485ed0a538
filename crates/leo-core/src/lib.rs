pub mod config;
pub mod constitution;
pub mod eligibility;
pub mod error;
pub mod gate;
pub mod gates;
pub mod handoff;
pub mod io;
pub mod judge;
pub mod llm;
pub mod paths;
pub mod protocol;
pub mod records;
pub mod risk;
pub mod score;
pub mod sd_type;
pub mod session;
pub mod store;
pub mod types;
pub mod uat;

pub use error::{LeoError, Result};
