//! Errors shared by the file components.

use std::io;
use std::path::{Path, PathBuf};

use protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while serving or changing the shared tree.
#[derive(Debug, Error)]
pub enum FileError {
    /// The path does not exist, or is hidden by policy.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// The path is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The request would move or remove the shared root.
    #[error("refusing to change the shared root")]
    RootProtected,

    /// The request could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The RPC request was malformed.
    #[error("rpc error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A blocking filesystem task did not complete.
    #[error("filesystem task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    /// Classify an IO error for `path`, mapping `NotFound` to [`FileError::NotFound`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            FileError::NotFound(path.to_path_buf())
        } else {
            FileError::Io(err)
        }
    }

    /// Whether this error means "nothing there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileError::NotFound(_))
    }
}
