//! Error handling for the haul library.
//!
//! Admission-time failures ([`Error::Validation`], [`Error::InsufficientStorage`])
//! reject the calling operation before any download item exists. Runtime transfer
//! failures never surface from the manager API directly: they are recorded on the
//! failing item as a [`TransferError`] and the queue keeps going.

use crate::download::DownloadId;

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors that can happen when using haul.
#[derive(Error, Debug)]
pub enum Error {
    /// The destination of a download request is not usable.
    ///
    /// Returned when the destination path is empty, has no file name, or its
    /// parent directory cannot be created.
    #[error("Invalid destination: {0}")]
    Validation(String),

    /// Not enough free space to admit a download.
    #[error("Insufficient storage: {required} bytes required, {available} bytes available")]
    InsufficientStorage {
        /// Bytes the download is expected to need.
        required: u64,
        /// Bytes reported free on the device.
        available: u64,
    },

    /// The download already used every retry it is allowed.
    #[error("Retry limit reached for download {id} after {attempts} retries")]
    RetryExhausted {
        /// Download that cannot be retried.
        id: DownloadId,
        /// Retries already performed.
        attempts: u32,
    },

    /// No download with the given id is tracked by the manager.
    #[error("Download not found: {0}")]
    NotFound(DownloadId),

    /// I/O Error.
    #[error("I/O error")]
    IOError {
        #[from]
        source: io::Error,
    },

    /// Error from the Reqwest library while setting up the HTTP executor.
    #[error("Reqwest Error")]
    Reqwest {
        #[from]
        source: reqwest::Error,
    },

    /// The persisted state could not be encoded or decoded.
    #[error("Serialization error")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Error from an underlying system, typically a stopped manager task.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for operations that can fail with a haul error.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a runtime transfer failure.
///
/// The category only changes the message shown to the user. Whether a failed
/// download may be retried depends on its retry budget alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferErrorKind {
    /// Connection refused, reset, timed out, DNS failure, HTTP error status.
    Network,
    /// Disk full or the destination could not be written.
    Storage,
    /// Access to the destination was denied.
    Permission,
    /// Anything else.
    Unknown,
}

impl TransferErrorKind {
    /// Best-effort classification of a free-form error message.
    ///
    /// Used for I/O errors whose kind carries no category.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if ["network", "connection", "timed out", "timeout", "dns", "unreachable"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            TransferErrorKind::Network
        } else if ["space", "storage", "disk full", "quota"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            TransferErrorKind::Storage
        } else if ["permission", "access", "denied", "unauthorized", "forbidden"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            TransferErrorKind::Permission
        } else {
            TransferErrorKind::Unknown
        }
    }

    /// Human readable summary shown in front of the raw message.
    pub fn summary(&self) -> &'static str {
        match self {
            TransferErrorKind::Network => "Network connection error",
            TransferErrorKind::Storage => "Insufficient storage space",
            TransferErrorKind::Permission => "Storage permission denied",
            TransferErrorKind::Unknown => "Download failed",
        }
    }
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.summary())
    }
}

/// Typed failure reported by a [`TransferExecutor`](crate::transfer::TransferExecutor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransferError {
    /// Failure category.
    pub kind: TransferErrorKind,
    /// Raw message from the executor.
    pub message: String,
}

impl TransferError {
    /// Creates a transfer error of the given kind.
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Network, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Storage, message)
    }

    /// Creates a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Permission, message)
    }

    /// Creates an error of unknown kind.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Unknown, message)
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                TransferErrorKind::Permission
            }
            io::ErrorKind::StorageFull | io::ErrorKind::WriteZero | io::ErrorKind::QuotaExceeded => {
                TransferErrorKind::Storage
            }
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof => TransferErrorKind::Network,
            _ => TransferErrorKind::classify(&e.to_string()),
        };
        Self::new(kind, e.to_string())
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::network(e.to_string())
    }
}

impl From<reqwest_middleware::Error> for TransferError {
    fn from(e: reqwest_middleware::Error) -> Self {
        TransferError::network(e.to_string())
    }
}
