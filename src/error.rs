//! Error types for stackprobe
//!
//! This module defines the error handling strategy for stackprobe. There are
//! two error types: `HarnessError` (main error enum) and `ConfigError`
//! (configuration-specific).
//!
//! ## Error Handling Philosophy
//!
//! Library code uses `crate::error::Result<T>` which returns `HarnessError`.
//! CLI code uses `anyhow::Result<T>` for top-level error handling. The
//! conversion happens at the CLI boundary using `anyhow::Error::from` to
//! preserve error chains.
//!
//! This split exists because:
//! - Library code benefits from structured error types for programmatic
//!   handling (the poller and the fixture dispatch on `NotFound` specifically)
//! - CLI code benefits from `anyhow`'s context chains and user-friendly display
//!
//! ## When to Use Which Error
//!
//! - `NotFound`: the service answered 404 for the addressed resource.
//!   The deletion poller treats this as success; everything else propagates it.
//!
//! - `UnexpectedResponse`: any other non-2xx answer. Carries the status code
//!   and body for diagnostics.
//!
//! - `Connection`: the request never produced an HTTP response (DNS failure,
//!   refused connection, socket closed mid-body).
//!
//! - `UnexpectedStatus`: the transport succeeded but the resource settled in
//!   a state the caller did not ask for (e.g. a volume entering `error`
//!   while waiting for `available`).
//!
//! - `Timeout`: the status poller exhausted its wall-clock deadline.
//!
//! - `Precheck`: fixture setup cannot proceed (service disabled in config,
//!   referenced image missing). Raised before any resource is created.

use std::time::Duration;
use thiserror::Error;

/// Resource identifier as reported by the service (opaque string).
pub type ResourceId = String;

/// Main error type for stackprobe
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not found: {resource_type} {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: ResourceId,
    },

    #[error("Unexpected response: HTTP {status} - {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Unexpected status for {resource_type} {resource_id}: {status}")]
    UnexpectedStatus {
        resource_type: String,
        resource_id: ResourceId,
        status: String,
    },

    #[error("Timed out after {waited:?}: {reason}")]
    Timeout { waited: Duration, reason: String },

    #[error("Precheck failed: {0}")]
    Precheck(String),

    #[error("Malformed response body: {0}")]
    BadBody(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// True when the service reported the addressed resource as gone.
    ///
    /// The deletion poller treats `NotFound` after a delete call as the
    /// success condition, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarnessError::NotFound { .. })
    }
}
