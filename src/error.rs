//! Error taxonomy for the session core
//!
//! Collaborators (stores, decoder, file system) report `anyhow::Error`s with
//! context attached. The orchestrator classifies those into [`SessionError`]
//! and finally into an [`ErrorCode`] the observer can render.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Failures the session core knows how to reason about
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("capture device could not be initialised: {0}")]
    InitializationFailure(String),

    #[error("output file is missing or not writable: {0}")]
    InvalidOutputFile(String),

    #[error("no storage space left")]
    StorageExhausted,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unreadable audio source: {0}")]
    UnreadableSource(String),

    #[error("a file named {0} already exists")]
    NameConflict(String),

    #[error("failed to persist record: {0}")]
    PersistenceFailure(String),

    #[error("queue {0} is closed")]
    QueueClosed(&'static str),
}

impl SessionError {
    /// Pick the taxonomy entry for an arbitrary collaborator error.
    ///
    /// Typed session errors anywhere in the chain win; otherwise io error
    /// kinds are mapped, and everything else becomes `fallback`.
    pub fn classify(err: &anyhow::Error, fallback: fn(String) -> SessionError) -> SessionError {
        for cause in err.chain() {
            if let Some(session) = cause.downcast_ref::<SessionError>() {
                return session.duplicate();
            }
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::PermissionDenied => {
                        return SessionError::PermissionDenied(format!("{:#}", err))
                    }
                    io::ErrorKind::StorageFull => return SessionError::StorageExhausted,
                    io::ErrorKind::AlreadyExists => {
                        return SessionError::NameConflict(io_err.to_string())
                    }
                    _ => {}
                }
            }
        }
        fallback(format!("{:#}", err))
    }

    /// User-visible code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InitializationFailure(_) => ErrorCode::RecorderInit,
            SessionError::InvalidOutputFile(_) => ErrorCode::InvalidOutputFile,
            SessionError::StorageExhausted => ErrorCode::NoSpace,
            SessionError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            SessionError::UnreadableSource(_) => ErrorCode::UnreadableFile,
            SessionError::NameConflict(_) => ErrorCode::RenameConflict,
            SessionError::PersistenceFailure(_) => ErrorCode::PersistenceFailed,
            SessionError::QueueClosed(_) => ErrorCode::StorageAccess,
        }
    }

    // anyhow hands out references only, so classification rebuilds the value.
    fn duplicate(&self) -> SessionError {
        match self {
            SessionError::InitializationFailure(m) => SessionError::InitializationFailure(m.clone()),
            SessionError::InvalidOutputFile(m) => SessionError::InvalidOutputFile(m.clone()),
            SessionError::StorageExhausted => SessionError::StorageExhausted,
            SessionError::PermissionDenied(m) => SessionError::PermissionDenied(m.clone()),
            SessionError::UnreadableSource(m) => SessionError::UnreadableSource(m.clone()),
            SessionError::NameConflict(m) => SessionError::NameConflict(m.clone()),
            SessionError::PersistenceFailure(m) => SessionError::PersistenceFailure(m.clone()),
            SessionError::QueueClosed(q) => SessionError::QueueClosed(q),
        }
    }
}

/// Error codes surfaced to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoSpace,
    PermissionDenied,
    UnreadableFile,
    RenameConflict,
    RenameFailed,
    RecorderInit,
    InvalidOutputFile,
    PersistenceFailed,
    StorageAccess,
    Playback,
}

impl From<&SessionError> for ErrorCode {
    fn from(error: &SessionError) -> Self {
        error.code()
    }
}
