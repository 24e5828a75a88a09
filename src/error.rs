//! Error taxonomy for registry operations.
//!
//! Four kinds of failure reach callers:
//!
//! - [`RegistryError::NotFound`]: the requested identity or version does not
//!   exist. This is an expected outcome, not a fault, and adapters should
//!   check [`RegistryError::is_not_found`] before treating an error as fatal.
//! - [`RegistryError::Validation`]: a submission was malformed. Raised before
//!   any canonical mutation, so a rejected request never leaves a partial write.
//! - [`RegistryError::Io`] / [`RegistryError::Storage`]: the snapshot files
//!   could not be read or written. Fatal for the triggering operation.
//! - [`RegistryError::Config`]: the storage root or config file is unusable.
//!
//! Failures while regenerating the derived exports after a write are not an
//! error variant at all: they are logged with `tracing::warn!` and swallowed
//! by the service, so canonical writes never depend on export health.
//!
//! ```no_run
//! use model_registry::error::{RegistryError, Result, ResultExt as _};
//!
//! fn read_submission(path: &str) -> Result<String> {
//!     let content = std::fs::read_to_string(path).context("Failed to read submission")?;
//!     Ok(content)
//! }
//!
//! match read_submission("model.json") {
//!     Err(RegistryError::Io(e)) => eprintln!("I/O error: {e}"),
//!     Err(e) => eprintln!("{e}"),
//!     Ok(_) => {}
//! }
//! ```

use std::fmt;

/// Main error type for registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Requested identity (or identity + version) is absent
    NotFound { id: String, version: Option<u32> },

    /// Malformed submission, rejected before any write
    Validation(String),

    /// I/O errors on snapshot files
    Io(std::io::Error),

    /// Columnar/row-text encoding errors (Polars, JSON columns, etc.)
    Storage(String),

    /// Configuration errors
    Config(String),

    /// Generic error with context
    Other(String),
}

impl RegistryError {
    pub fn not_found(id: impl Into<String>, version: Option<u32>) -> Self {
        Self::NotFound {
            id: id.into(),
            version,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Prefix the message with `msg`, keeping the error category.
    fn prefixed(self, msg: &str) -> Self {
        match self {
            Self::NotFound { .. } => self,
            Self::Validation(m) => Self::Validation(format!("{msg}: {m}")),
            Self::Io(e) => Self::Storage(format!("{msg}: {e}")),
            Self::Storage(m) => Self::Storage(format!("{msg}: {m}")),
            Self::Config(m) => Self::Config(format!("{msg}: {m}")),
            Self::Other(m) => Self::Other(format!("{msg}: {m}")),
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound {
                id,
                version: Some(v),
            } => write!(f, "Model not found: {id} (version {v})"),
            Self::NotFound { id, version: None } => write!(f, "Model not found: {id}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for RegistryError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RegistryError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().prefixed(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().prefixed(&f()))
    }
}
