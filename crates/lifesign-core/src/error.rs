//! Error taxonomy. Failures are contained at the smallest possible scope:
//! per-contact > per-user > per-job. Nothing inside a scan tick may crash
//! the process.

use thiserror::Error;

/// Result alias used across all Lifesign crates.
pub type Result<T> = std::result::Result<T, LifesignError>;

#[derive(Debug, Error)]
pub enum LifesignError {
    /// Deadline store (SQLite) failure.
    #[error("store error: {0}")]
    Store(String),

    /// Notification channel failure (push provider or SMTP).
    #[error("channel error: {0}")]
    Channel(String),

    /// Per-contact decryption failure — skip the contact, never the batch.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Pause-engine precondition violation. Surfaced to the caller as a
    /// distinguishable rejection, not a crash.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifesignError {
    /// True for the pause-engine rejection variant.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }
}
