//! Error types for libvirt-storage-attach
//!
//! Provides structured error types for the lock coordinator, topology
//! inspection, attach/detach reconciliation and the storage backend.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Input & Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid volume id: {0}")]
    InvalidVolumeId(String),

    #[error("Duration parse error: {0}")]
    DurationParse(String),

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    // =========================================================================
    // Hypervisor Errors
    // =========================================================================
    #[error("Hypervisor connection error: {0}")]
    Connection(String),

    #[error("Domain not found: {domain}")]
    DomainNotFound { domain: String },

    #[error("Domain XML error: {0}")]
    DomainXml(String),

    // =========================================================================
    // Locking Errors
    // =========================================================================
    #[error("Lock contention on {}", path.display())]
    LockContention { path: PathBuf },

    #[error("pv {volume} is in use, can't be modified by '{requested}' since it's locked by '{owner}'")]
    OwnershipConflict {
        volume: String,
        requested: String,
        owner: String,
    },

    // =========================================================================
    // Device Action Errors
    // =========================================================================
    #[error("Failed to attach {volume} to {domain}: {reason} (stdout: '{stdout}', stderr: '{stderr}')")]
    AttachFailed {
        domain: String,
        volume: String,
        stdout: String,
        stderr: String,
        reason: String,
    },

    #[error("Failed to detach {volume} from {domain}: {reason} (stdout: '{stdout}', stderr: '{stderr}')")]
    DetachFailed {
        domain: String,
        volume: String,
        stdout: String,
        stderr: String,
        reason: String,
    },

    #[error("Unexpected output '{output}' from {command}")]
    UnexpectedOutput { command: String, output: String },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    // =========================================================================
    // Storage Backend Errors
    // =========================================================================
    #[error("Permission denied running {command}: {stderr}")]
    PermissionDenied { command: String, stderr: String },

    #[error("{command} failed: {reason} (stdout: '{stdout}', stderr: '{stderr}')")]
    Backend {
        command: String,
        stdout: String,
        stderr: String,
        reason: String,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exit status for usage and configuration mistakes
pub const EXIT_USAGE: i32 = 2;

/// Exit status for conditions an operator can simply retry (EX_TEMPFAIL)
pub const EXIT_TEMPFAIL: i32 = 75;

impl Error {
    /// Check if this error is transient
    ///
    /// Nothing is retried in-process; this only tells the caller whether
    /// running the same operation again later can succeed unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::LockContention { .. } | Error::Timeout { .. } | Error::Connection(_)
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration(_)
            | Error::Validation(_)
            | Error::InvalidVolumeId(_)
            | Error::DurationParse(_)
            | Error::CapacityParse(_)
            | Error::Yaml(_) => EXIT_USAGE,
            e if e.is_transient() => EXIT_TEMPFAIL,
            _ => 1,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
