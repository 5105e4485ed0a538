use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeoError {
    #[error("not initialized: run 'leo init'")]
    NotInitialized,

    #[error("strategic directive not found: {0}")]
    SdNotFound(String),

    #[error("no PRD found for strategic directive: {0}")]
    PrdNotFound(String),

    #[error("improvement not found: {0}")]
    ImprovementNotFound(String),

    #[error("UAT result not found: {0}")]
    UatResultNotFound(String),

    #[error("UAT result {id} is {status}, only FAIL results convert")]
    UatNotFailed { id: String, status: String },

    #[error("UAT result {id} was already converted into SD {sd_id}")]
    UatAlreadyConverted { id: String, sd_id: String },

    #[error("SD key {key} is already used by SD {sd_id}")]
    SdKeyTaken { key: String, sd_id: String },

    #[error("invalid SD type: {0}")]
    InvalidSdType(String),

    #[error("invalid handoff type: {0}")]
    InvalidHandoffType(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid version '{0}': expected MAJOR.MINOR[.PATCH]")]
    InvalidVersion(String),

    #[error("store error on '{table}': {message}")]
    Store { table: String, message: String },

    #[error("llm error: {0}")]
    Llm(String),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("protocol document error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl LeoError {
    pub fn store(table: impl Into<String>, message: impl Into<String>) -> Self {
        LeoError::Store {
            table: table.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LeoError>;
