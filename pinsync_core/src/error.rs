//! Error types for pinsync_core.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using pinsync_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store and synchronization operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON document could not be read or written.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Invalid content identifier string or bytes.
    #[error("Invalid CID: {reason}")]
    InvalidCid { reason: String },

    /// Object not found in store.
    #[error("Object not found: {cid}")]
    ObjectNotFound { cid: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Invalid mutable name.
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    /// Mutable name has never been published.
    #[error("Name not found: {name}")]
    NameNotFound { name: String },

    /// Unknown pin mode string.
    #[error("Invalid pin mode: {mode}")]
    InvalidPinMode { mode: String },

    /// CID is not pinned.
    #[error("Not pinned: {cid}")]
    PinNotFound { cid: String },

    /// Invalid object type.
    #[error("Invalid object type: expected {expected}, got {got}")]
    InvalidObjectType { expected: String, got: String },

    /// Invalid directory link.
    #[error("Invalid link: {reason}")]
    InvalidLink { reason: String },

    /// Two links in one directory node share a name.
    #[error("Duplicate link name: {name}")]
    DuplicateLink { name: String },

    /// A path segment did not match any link.
    #[error("No link named {name} under {parent}")]
    LinkNotFound { parent: String, name: String },

    /// Invalid locator string.
    #[error("Invalid locator {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Manifest could not be used.
    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Compression or decompression failed.
    #[error("Compression error: {reason}")]
    Compression { reason: String },

    /// Operation exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Build record file is absent.
    #[error("Build record not found at {path}")]
    RecordMissing { path: PathBuf },

    /// Configuration value is missing or malformed.
    #[error("Invalid configuration {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A synchronization stage produced no directory at its root.
    #[error("{stage} stage produced an empty tree")]
    EmptyTree { stage: String },

    /// UTF-8 encoding error.
    #[error("UTF-8 error: {source}")]
    Utf8Error {
        #[from]
        source: std::str::Utf8Error,
    },
}

impl Error {
    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidCid error.
    pub fn invalid_cid(reason: impl Into<String>) -> Self {
        Error::InvalidCid {
            reason: reason.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(cid: impl Into<String>) -> Self {
        Error::ObjectNotFound { cid: cid.into() }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidName error.
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Error::InvalidName {
            reason: reason.into(),
        }
    }

    /// Create a NameNotFound error.
    pub fn name_not_found(name: impl Into<String>) -> Self {
        Error::NameNotFound { name: name.into() }
    }

    /// Create an InvalidPinMode error.
    pub fn invalid_pin_mode(mode: impl Into<String>) -> Self {
        Error::InvalidPinMode { mode: mode.into() }
    }

    /// Create a PinNotFound error.
    pub fn pin_not_found(cid: impl Into<String>) -> Self {
        Error::PinNotFound { cid: cid.into() }
    }

    /// Create an InvalidObjectType error.
    pub fn invalid_object_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an InvalidLink error.
    pub fn invalid_link(reason: impl Into<String>) -> Self {
        Error::InvalidLink {
            reason: reason.into(),
        }
    }

    /// Create a DuplicateLink error.
    pub fn duplicate_link(name: impl Into<String>) -> Self {
        Error::DuplicateLink { name: name.into() }
    }

    /// Create a LinkNotFound error.
    pub fn link_not_found(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Error::LinkNotFound {
            parent: parent.into(),
            name: name.into(),
        }
    }

    /// Create an InvalidLocator error.
    pub fn invalid_locator(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidLocator {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidManifest error.
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Error::InvalidManifest {
            reason: reason.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }

    /// Create a Timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a RecordMissing error.
    pub fn record_missing(path: impl Into<PathBuf>) -> Self {
        Error::RecordMissing { path: path.into() }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an EmptyTree error.
    pub fn empty_tree(stage: impl Into<String>) -> Self {
        Error::EmptyTree {
            stage: stage.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
