//! Error types for FirstParty.
//!
//! Library crates use [`FpdError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all FirstParty operations.
#[derive(Debug, thiserror::Error)]
pub enum FpdError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A request body that is not a valid auction-start request.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A submodule failed while producing its delta.
    #[error("submodule {name} failed: {message}")]
    Submodule { name: String, message: String },

    /// A submodule did not settle within the configured bound.
    #[error("submodule {name} timed out after {after:?}")]
    Timeout { name: String, after: Duration },

    /// A submodule panicked while producing its delta.
    #[error("submodule {name} panicked: {message}")]
    Panicked { name: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FpdError>;

impl FpdError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a submodule failure attributed to `name`.
    pub fn submodule(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Submodule {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
