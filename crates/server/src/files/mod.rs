//! File layer for path resolution, listing, archiving and mutation.
//!
//! This module provides the filesystem side of the server:
//! - Confinement of request paths to the shared root
//! - Directory listing with the hidden-file policy
//! - Streaming zip archives of whole subtrees
//! - Directory creation, moves, removals and uploads
//!
//! # Security
//!
//! Every path a client sends goes through [`PathResolver::resolve`] before
//! anything else sees it. Resolution is lexical, so `..` can never climb
//! above the root. Enabling symlink following trades that guarantee away
//! for every symlink inside the share.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

pub mod archive;
pub mod browser;
pub mod content;
pub mod error;
pub mod ops;
pub mod resolver;
pub mod transfer;

pub use archive::{attachment_name, content_disposition, ArchiveError, ArchiveStreamer};
pub use browser::{href, humanize, DirectoryLister};
pub use content::{Content, ContentServer};
pub use error::FileError;
pub use ops::MutationOps;
pub use resolver::{resolve_symlinks_or_fallback, PathResolver, ResolvedPath};
pub use transfer::{decode_upload_path, UploadReceiver, UPLOAD_PATH_HEADER};

/// Stat `path`, following symlinks only when `follow_symlinks` is set.
pub(crate) fn stat(path: &Path, follow_symlinks: bool) -> io::Result<Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}
