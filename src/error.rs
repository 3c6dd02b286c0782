//! Error types
//!
//! Two levels:
//! - [`SchemeError`]: anything that goes wrong inside one scheme manager.
//!   During parsing these are caught at the manager boundary, wrapped in a
//!   [`SchemeManagerError`] together with the manager's final status, and
//!   recorded as a disabled scheme manager.
//! - [`ConfigurationError`]: failures of a whole operation (unreadable
//!   configuration root, unknown scheme manager, failed update).

use std::io;
use std::path::PathBuf;

use irma_core::{IdentifierError, IndexError, SchemeManagerId};

use crate::scheme::SchemeManagerStatus;
use crate::signature::SignatureError;
use crate::transport::TransportError;

/// Content hash of a tracked file does not match its signed index entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hash of {path} does not match scheme manager index (expected {expected}, got {actual})")]
pub struct IntegrityError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

/// Errors scoped to a single scheme manager
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("required file {} does not exist", .path.display())]
    Structural { path: PathBuf },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("unsupported {kind} description version {found} (minimum {minimum})")]
    Version {
        kind: &'static str,
        found: u32,
        minimum: u32,
    },

    #[error("malformed description {path}: {reason}")]
    Content { path: String, reason: String },

    #[error("index entry {path} lies outside scheme manager {manager}")]
    UntrustedPath {
        manager: SchemeManagerId,
        path: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SchemeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn content(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Content {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A scheme manager that failed to load, with the status it ended in
#[derive(Debug, thiserror::Error)]
#[error("error parsing scheme manager {}: {}", .manager.name(), .error)]
pub struct SchemeManagerError {
    pub manager: SchemeManagerId,
    pub status: SchemeManagerStatus,
    #[source]
    pub error: SchemeError,
}

/// Errors that abort a configuration-wide operation
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown scheme manager {0}")]
    UnknownSchemeManager(SchemeManagerId),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    SchemeManager(#[from] SchemeManagerError),

    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed timestamp in {}: {reason}", .path.display())]
    Timestamp { path: PathBuf, reason: String },

    #[error("assets configuration {} has no timestamp", .path.display())]
    MissingAssetsTimestamp { path: PathBuf },
}

impl ConfigurationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for manager-scoped operations
pub type SchemeResult<T> = Result<T, SchemeError>;

/// Result type for configuration-wide operations
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
