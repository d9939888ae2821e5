//! Core Error Types
//!
//! Defines the error taxonomy shared by the resource pool, the probe fan-out
//! and the phase orchestrator. Resource- and network-level variants are
//! caught at the smallest scope and turned into degraded results; only
//! programming errors (stale lease release, checkout after shutdown) and
//! invalid targets reach the caller as hard failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed HTTP exchange.
///
/// The connectivity probe uses this to tell a handshake-layer failure
/// (`Tls`) apart from total unreachability (`Connect`, `Timeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpErrorKind {
    /// The request did not complete within its deadline
    Timeout,
    /// DNS resolution or TCP connect failed
    Connect,
    /// TLS handshake or certificate validation failed
    Tls,
    /// The server answered with an unusable status
    Status,
    /// Anything else (body decoding, redirect loops, ...)
    Other,
}

impl std::fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpErrorKind::Timeout => write!(f, "timeout"),
            HttpErrorKind::Connect => write!(f, "connect"),
            HttpErrorKind::Tls => write!(f, "tls"),
            HttpErrorKind::Status => write!(f, "status"),
            HttpErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Core error type for the WebAudit workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An automation-engine instance or session could not be created
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// The pool has begun shutting down and rejects new checkouts
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// A lease was released that the pool no longer tracks as leased
    #[error("Lease not held: {0}")]
    LeaseNotHeld(String),

    /// A phase exceeded its deadline
    #[error("Phase '{phase}' timed out after {after_ms} ms")]
    PhaseTimeout { phase: String, after_ms: u64 },

    /// A phase aborted with an error or a panic
    #[error("Phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    /// A probe exceeded its deadline
    #[error("Probe '{probe}' timed out after {after_ms} ms")]
    ProbeTimeout { probe: String, after_ms: u64 },

    /// A probe aborted with an error or a panic
    #[error("Probe '{probe}' failed: {reason}")]
    ProbeFailed { probe: String, reason: String },

    /// The foundational probe reported the target as unreachable
    #[error("Target unreachable: {0}")]
    UnreachableTarget(String),

    /// The analysis target is not an auditable URL
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The run was cancelled by its caller
    #[error("Run cancelled")]
    Cancelled,

    /// HTTP exchange failures
    #[error("HTTP {kind} error: {message}")]
    Http { kind: HttpErrorKind, message: String },

    /// Automation engine errors (navigation, evaluation, capture)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an acquisition error
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::AcquisitionFailed(msg.into())
    }

    /// Create an HTTP error of the given kind
    pub fn http(kind: HttpErrorKind, msg: impl Into<String>) -> Self {
        Self::Http {
            kind,
            message: msg.into(),
        }
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-target error
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The HTTP failure class, if this is an HTTP error.
    pub fn http_kind(&self) -> Option<HttpErrorKind> {
        match self {
            Self::Http { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::acquisition("chromium failed to launch");
        assert_eq!(
            err.to_string(),
            "Acquisition failed: chromium failed to launch"
        );
    }

    #[test]
    fn test_timeout_display_includes_phase() {
        let err = CoreError::PhaseTimeout {
            phase: "speed".to_string(),
            after_ms: 30_000,
        };
        assert_eq!(err.to_string(), "Phase 'speed' timed out after 30000 ms");
    }

    #[test]
    fn test_http_kind() {
        let err = CoreError::http(HttpErrorKind::Tls, "bad certificate");
        assert_eq!(err.http_kind(), Some(HttpErrorKind::Tls));
        assert_eq!(err.to_string(), "HTTP tls error: bad certificate");
        assert_eq!(CoreError::ShuttingDown.http_kind(), None);
    }

    #[test]
    fn test_error_conversion() {
        let err = CoreError::config("invalid setting");
        let msg: String = err.into();
        assert!(msg.contains("Configuration error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
