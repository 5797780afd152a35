use thiserror::Error;

pub type LoungeResult<T> = Result<T, LoungeError>;

#[derive(Error, Debug)]
pub enum LoungeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Deduction of {requested} exceeds the allowed cap of {cap}")]
    DeductionExceedsCap { requested: u64, cap: u64 },

    #[error("Insufficient balance: requested {requested}, available {balance}")]
    InsufficientBalance { requested: u64, balance: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Operation already in progress: {0}")]
    Busy(String),

    #[error("Achievement already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("Achievement not unlocked: {0}")]
    NotUnlocked(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for LoungeError {
    fn from(err: ::config::ConfigError) -> Self {
        LoungeError::Config(err.to_string())
    }
}

impl LoungeError {
    /// Errors caused by the caller's input, rejected before any write.
    /// Everything else is a store or infrastructure failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LoungeError::Validation(_)
                | LoungeError::DeductionExceedsCap { .. }
                | LoungeError::InsufficientBalance { .. }
                | LoungeError::AlreadyClaimed(_)
                | LoungeError::NotUnlocked(_)
        )
    }
}
