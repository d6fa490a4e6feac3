//! Error types for es-reindex.
//!
//! Every fatal condition of a run maps onto one [`ErrorKind`], which in turn
//! decides the process exit code. Per-document write failures are not errors
//! at this level: they travel as [`crate::document::DocumentWriteError`]
//! inside a failed bulk outcome and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for es-reindex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a reindex run.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration (REINDEX-001).
    #[error("[REINDEX-001] Configuration error: {0}")]
    Config(String),

    /// The `@file` query could not be read (REINDEX-002).
    #[error("[REINDEX-002] Cannot read query file '{}': {source}", path.display())]
    QueryFile {
        /// Path named after the `@` prefix.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// YAML configuration file could not be parsed (REINDEX-003).
    #[error("[REINDEX-003] Configuration file error: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    /// IO error while reading local inputs (REINDEX-004).
    #[error("[REINDEX-004] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed filter expression (REINDEX-005).
    #[error("[REINDEX-005] Invalid query: {0}")]
    Query(String),

    /// Source index does not exist (REINDEX-006).
    #[error("[REINDEX-006] Index '{0}' not found")]
    IndexNotFound(String),

    /// Network-level failure talking to a cluster (REINDEX-007).
    #[error("[REINDEX-007] Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// Cluster answered with a non-success status (REINDEX-008).
    #[error("[REINDEX-008] Cluster returned HTTP {status}: {reason}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason extracted from the error body.
        reason: String,
    },

    /// Credentials rejected by a cluster (REINDEX-009).
    #[error("[REINDEX-009] Authentication failed: {0}")]
    Authentication(String),

    /// Scroll page did not cover every shard (REINDEX-010).
    #[error("[REINDEX-010] Scroll request succeeded on only {successful} of {total} shards")]
    ShardFailure {
        /// Shards that answered.
        successful: u64,
        /// Shards targeted.
        total: u64,
    },

    /// Cluster reply could not be decoded (REINDEX-011).
    #[error("[REINDEX-011] Malformed cluster response: {0}")]
    Response(String),

    /// A bulk writer worker died unexpectedly (REINDEX-012).
    #[error("[REINDEX-012] Writer worker failed: {0}")]
    Worker(String),

    /// Run stopped through its cancellation token (REINDEX-013).
    #[error("[REINDEX-013] Run cancelled")]
    Cancelled,
}

/// Coarse classification of [`Error`] used for exit codes and propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or configuration, detected before cluster I/O.
    Config,
    /// Malformed query or missing source index.
    Query,
    /// Connectivity or protocol failure with either cluster.
    Transport,
    /// Stopped on request.
    Cancelled,
    /// Bug or panic inside the tool.
    Internal,
}

impl Error {
    /// Returns the error code (e.g., "REINDEX-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "REINDEX-001",
            Self::QueryFile { .. } => "REINDEX-002",
            Self::ConfigFile(_) => "REINDEX-003",
            Self::Io(_) => "REINDEX-004",
            Self::Query(_) => "REINDEX-005",
            Self::IndexNotFound(_) => "REINDEX-006",
            Self::Connection(_) => "REINDEX-007",
            Self::Status { .. } => "REINDEX-008",
            Self::Authentication(_) => "REINDEX-009",
            Self::ShardFailure { .. } => "REINDEX-010",
            Self::Response(_) => "REINDEX-011",
            Self::Worker(_) => "REINDEX-012",
            Self::Cancelled => "REINDEX-013",
        }
    }

    /// Returns the taxonomy entry this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::QueryFile { .. } | Self::ConfigFile(_) | Self::Io(_) => {
                ErrorKind::Config
            }
            Self::Query(_) | Self::IndexNotFound(_) => ErrorKind::Query,
            Self::Connection(_)
            | Self::Status { .. }
            | Self::Authentication(_)
            | Self::ShardFailure { .. }
            | Self::Response(_) => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Worker(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code for a run that ended with this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Internal => 1,
            ErrorKind::Config => 2,
            ErrorKind::Query => 3,
            ErrorKind::Transport => 4,
            ErrorKind::Cancelled => 130,
        }
    }

    /// Returns true if repeating the same request may succeed.
    ///
    /// Only transient transport conditions qualify: timeouts, refused or reset
    /// connections, throttling and gateway errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
