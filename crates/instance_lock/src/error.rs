//! Error types for the instance lock subsystem.
//!
//! Admission rejections are not errors; they are returned as
//! [`crate::TransferAbort`] values. Violated internal invariants are
//! programmer errors and abort via assertions instead of flowing through
//! this type.

/// Enumeration of possible instance lock errors.
#[derive(Debug, thiserror::Error)]
pub enum InstanceLockError {
    /// Configuration loading or validation failures
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence engine failures such as a closed writer channel
    #[error("Persistence error: {0}")]
    Persistence(String),
}
