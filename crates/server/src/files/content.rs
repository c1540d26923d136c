//! Decides whether a request path is served as a file or listed as a
//! directory.

use std::sync::Arc;

use protocol::Listing;

use super::browser::DirectoryLister;
use super::error::FileError;
use super::resolver::{PathResolver, ResolvedPath};
use crate::config::{PolicyFlags, UrlPrefix};

/// What a request path turned out to be.
#[derive(Debug)]
pub enum Content {
    /// A file to stream back as-is.
    File(ResolvedPath),
    /// A directory, already listed.
    Directory(Listing),
}

/// Looks up request paths below the shared root.
pub struct ContentServer {
    resolver: Arc<PathResolver>,
    lister: DirectoryLister,
    policy: PolicyFlags,
}

impl ContentServer {
    /// Create a content server sharing `resolver`.
    pub fn new(resolver: Arc<PathResolver>, prefix: UrlPrefix, policy: PolicyFlags) -> Self {
        let lister = DirectoryLister::new(resolver.clone(), prefix, policy);
        Self {
            resolver,
            lister,
            policy,
        }
    }

    /// Resolve `request_path` and check that it is visible.
    ///
    /// Missing and hidden targets are both [`FileError::NotFound`]. With
    /// symlink following disabled a symlink is never served through, so it
    /// counts as missing too.
    pub fn locate(&self, request_path: &str) -> Result<(ResolvedPath, bool), FileError> {
        let path = self.resolver.resolve(request_path);
        let metadata = super::stat(&path, self.policy.follow_symlinks)
            .map_err(|e| FileError::from_io(e, &path))?;

        if self.policy.skip_hidden && self.resolver.is_hidden(&path) {
            return Err(FileError::NotFound(path.into_path_buf()));
        }
        if metadata.file_type().is_symlink() {
            return Err(FileError::NotFound(path.into_path_buf()));
        }

        Ok((path, metadata.is_dir()))
    }

    /// Serve `request_path`: list it if it is a directory, hand back the
    /// path otherwise.
    pub fn lookup(&self, request_path: &str) -> Result<Content, FileError> {
        let (path, is_dir) = self.locate(request_path)?;

        if is_dir {
            Ok(Content::Directory(self.lister.list(&path)?))
        } else {
            Ok(Content::File(path))
        }
    }
}
