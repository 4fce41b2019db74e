//! Error types for Twinklecast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwinkleError>;

#[derive(Error, Debug)]
pub enum TwinkleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TwinkleError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TwinkleError::InvalidInput(_) => 3,
            TwinkleError::Selection(_) => 3,
            TwinkleError::Publish(PublishError::AuthRejected(_)) => 2,
            TwinkleError::Token(_) => 2,
            TwinkleError::Config(_) => 1,
            TwinkleError::Catalog(_) => 1,
            TwinkleError::Ledger(_) => 1,
            TwinkleError::Publish(_) => 1,
            TwinkleError::Persistence(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Entry already exists: {0}")]
    DuplicateKey(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry is locked and cannot be edited: {0}")]
    Locked(String),

    #[error("Field cannot be changed: {0}")]
    ImmutableField(String),

    #[error("Entry must be locked before export: {0}")]
    NotLocked(String),

    #[error("Export already exists with different content: {0}")]
    ExportConflict(String),
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Invalid selection for {category}: index {index} out of 1..={len}")]
    InvalidSelection {
        category: &'static str,
        index: usize,
        len: usize,
    },

    #[error("No content available in any requested category")]
    EmptyCatalog,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Job already recorded: {0}")]
    DuplicateJob(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job {id} is {status} and cannot be cancelled")]
    NotCancellable { id: String, status: String },
}

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Publisher rejected credentials: {0}")]
    AuthRejected(String),

    #[error("Publishing surface changed: {0}")]
    ElementNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Publisher timed out after {0}s")]
    Timeout(u64),
}

impl PublishError {
    /// Transient errors may be retried by the scheduler; the rest fail
    /// the job immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::NetworkError(_) | PublishError::RateLimited(_) | PublishError::Timeout(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("No short-lived token to exchange")]
    NoShortLivedToken,

    #[error("Credentials required: no usable access token")]
    CredentialsRequired,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}
