// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for hardware-run orchestration.

use std::fmt;

/// Result type alias for reliability-run operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Remote execution error
    Remote(RemoteError),
    /// Result ledger error
    Ledger(LedgerError),
    /// Validation error
    Validation(ValidationError),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Remote(e) => write!(f, "Remote error: {}", e),
            Error::Ledger(e) => write!(f, "Ledger error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Remote(e) => Some(e),
            Error::Ledger(e) => Some(e),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Error::Remote(e)
    }
}

impl From<LedgerError> for Error {
    fn from(e: LedgerError) -> Self {
        Error::Ledger(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Errors raised by the remote execution service.
///
/// The variants split into two classes: transient errors (rate limits,
/// network faults, timeouts) are retried with backoff; permanent errors
/// (malformed requests, rejected circuits, bad credentials) are not.
#[derive(Debug, Clone)]
pub enum RemoteError {
    /// Service asked us to slow down (HTTP 429)
    RateLimited(String),
    /// Service temporarily unavailable (5xx, connect failure)
    Unavailable(String),
    /// Other transport-level failure
    Http(String),
    /// No terminal status within the allotted time
    Timeout(String),
    /// Malformed request
    InvalidRequest(String),
    /// Authentication failed
    AuthenticationFailed(String),
    /// Backend rejected the circuit or job
    Rejected(String),
    /// Job or backend not found
    NotFound(String),
}

impl RemoteError {
    /// Whether the operation may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited(_)
                | RemoteError::Unavailable(_)
                | RemoteError::Http(_)
                | RemoteError::Timeout(_)
        )
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            RemoteError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            RemoteError::Http(msg) => write!(f, "HTTP error: {}", msg),
            RemoteError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            RemoteError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            RemoteError::AuthenticationFailed(msg) => write!(f, "Authentication failed: {}", msg),
            RemoteError::Rejected(msg) => write!(f, "Rejected by backend: {}", msg),
            RemoteError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Result ledger errors.
#[derive(Debug)]
pub enum LedgerError {
    /// A snapshot was appended for a job whose record is already terminal
    AlreadyTerminal { job_id: String },
    /// A persisted line could not be decoded
    Corrupt { line: usize, message: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::AlreadyTerminal { job_id } => {
                write!(f, "Job {} already has a terminal record", job_id)
            }
            LedgerError::Corrupt { line, message } => {
                write!(f, "Corrupt entry at line {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for LedgerError {}

/// Validation errors.
#[derive(Debug)]
pub enum ValidationError {
    /// Field validation failed
    Field { field: String, message: String },
    /// Outcome counts inconsistent with the requested shots
    ShotMismatch { expected: u64, actual: u64 },
    /// Resource limit exceeded
    ResourceLimit {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
            ValidationError::ShotMismatch { expected, actual } => {
                write!(
                    f,
                    "Shot count mismatch: expected {}, got {}",
                    expected, actual
                )
            }
            ValidationError::ResourceLimit {
                resource,
                limit,
                requested,
            } => {
                write!(
                    f,
                    "Resource limit exceeded for {}: limit={}, requested={}",
                    resource, limit, requested
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
