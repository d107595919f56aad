//! Error types for WinUnlock
//!
//! All error types use thiserror for clean error handling.
//! SECURITY: Error messages MUST NOT contain passwords or sensitive data.

use std::time::Duration;

/// Errors from the raw persisted key-value store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Value not found")]
    NotFound,

    #[error("Value has an unexpected type")]
    TypeMismatch,

    #[error("Storage error: {0}")]
    Io(String),
}

/// Errors from the machine-bound data protection primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtectError {
    #[error("Data protection failed: {0}")]
    Failed(String),
}

/// Errors from the credential vault
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("No credential has been provisioned")]
    NotProvisioned,

    #[error("Stored credential could not be decrypted: {0}")]
    DecryptionFailed(String),

    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Errors from the unlock request channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Unlock request storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Errors from building the logon payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Field '{field}' is {len} characters, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Authentication package unavailable: {0}")]
    AuthPackageUnavailable(String),
}

/// Errors from enumerating sessions on the host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionEnumerationError {
    #[error("Session enumeration unavailable: {0}")]
    Unavailable(String),
}

/// Errors from one session monitor cycle
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Session enumeration failed: {0}")]
    Enumeration(#[from] SessionEnumerationError),

    #[error("Unlock channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Forcing the session lock failed: {0}")]
    LockFailed(String),

    #[error("{0} did not complete within {1:?}")]
    Timeout(&'static str, Duration),
}

/// Errors surfaced at the logon plugin boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Unsupported usage scenario")]
    InvalidScenario,

    #[error("Invalid field id {0}")]
    InvalidField(u32),

    #[error("Operation not implemented")]
    NotImplemented,

    #[error("Credential used before initialization")]
    NotInitialized,
}

impl From<StoreError> for ChannelError {
    fn from(err: StoreError) -> Self {
        ChannelError::StorageUnavailable(err.to_string())
    }
}
