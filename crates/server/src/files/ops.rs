//! Mutating operations: directory creation, moves and removals.
//!
//! Every path argument is resolved before the filesystem is touched. The
//! shared root itself can never be moved, replaced or removed. The
//! read-only policy is not checked here; requests never reach these
//! operations when the server is read-only.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use protocol::{RpcCall, RpcRequest};
use tracing::info;

use super::error::FileError;
use super::resolver::PathResolver;

/// Directory creation, moves and removals below the shared root.
pub struct MutationOps {
    resolver: Arc<PathResolver>,
}

impl MutationOps {
    /// Create mutation operations sharing `resolver`.
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }

    /// Create `path` and any missing ancestors. Succeeds if it already exists.
    pub fn mkdirp(&self, path: &str) -> Result<(), FileError> {
        let target = self.resolver.resolve(path);
        fs::create_dir_all(&target)?;
        info!(path = %target.display(), "created directory");
        Ok(())
    }

    /// Rename `src` to `dst`. No copy fallback across filesystems.
    pub fn move_entry(&self, src: &str, dst: &str) -> Result<(), FileError> {
        let from = self.resolver.resolve(src);
        let to = self.resolver.resolve(dst);
        self.ensure_not_root(&from)?;
        self.ensure_not_root(&to)?;
        fs::rename(&from, &to)?;
        info!(from = %from.display(), to = %to.display(), "moved entry");
        Ok(())
    }

    /// Remove a file, symlink or directory tree. Succeeds if nothing is there.
    pub fn remove(&self, path: &str) -> Result<(), FileError> {
        let target = self.resolver.resolve(path);
        self.ensure_not_root(&target)?;
        remove_all(&target)?;
        info!(path = %target.display(), "removed entry");
        Ok(())
    }

    fn ensure_not_root(&self, path: &Path) -> Result<(), FileError> {
        if self.resolver.is_root(path) {
            return Err(FileError::RootProtected);
        }
        Ok(())
    }

    /// Run an RPC request.
    pub fn dispatch(&self, request: &RpcRequest) -> Result<(), FileError> {
        let call = request.rpc_call()?;
        match call {
            RpcCall::Mkdirp => self.mkdirp(request.arg(call, 0)?),
            RpcCall::Mv => self.move_entry(request.arg(call, 0)?, request.arg(call, 1)?),
            RpcCall::Rm => self.remove(request.arg(call, 0)?),
        }
    }
}

/// Remove `path` whatever it is, treating "already gone" as success.
fn remove_all(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
