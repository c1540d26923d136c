//! Mapping of untrusted request paths onto the shared root.
//!
//! Resolution is lexical: the request path is cleaned as if it were rooted
//! at `/` before it ever touches the filesystem, so no number of `..`
//! segments can climb above the shared root. Only when symlink following is
//! enabled does the filesystem get a say, and then confinement holds only up
//! to the first symlink.

use std::ffi::OsStr;
use std::fs;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};

use crate::config::{PolicyFlags, UrlPrefix};

/// Marker that makes a file name hidden.
pub const HIDDEN_MARKER: char = '.';

/// An absolute path produced by [`PathResolver::resolve`].
///
/// With symlink following disabled it always lies under the shared root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Borrow the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consume into the underlying path.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl Deref for ResolvedPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Resolves client paths against the shared root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical shared root.
    root: PathBuf,
    /// Cleaned segments of the URL prefix.
    prefix_segments: Vec<String>,
    /// Whether to resolve symlinks after joining.
    follow_symlinks: bool,
}

impl PathResolver {
    /// Create a resolver for `root`, which must already be canonical.
    pub fn new(root: PathBuf, prefix: &UrlPrefix, policy: PolicyFlags) -> Self {
        let prefix_segments = clean_segments(prefix.as_str())
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            root,
            prefix_segments,
            follow_symlinks: policy.follow_symlinks,
        }
    }

    /// The shared root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` is the shared root itself.
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Map a URL-decoded request path to a filesystem path.
    ///
    /// Total over all inputs: malformed paths are cleaned, never rejected.
    pub fn resolve(&self, request_path: &str) -> ResolvedPath {
        let segments = clean_segments(request_path);

        // Drop the leading run shared with the prefix. Whatever does not
        // match stays rooted at the share root.
        let shared = segments
            .iter()
            .zip(self.prefix_segments.iter())
            .take_while(|(segment, prefix)| **segment == prefix.as_str())
            .count();

        let mut path = self.root.clone();
        for segment in &segments[shared..] {
            path.push(segment);
        }

        if self.follow_symlinks {
            path = resolve_symlinks_or_fallback(path);
        }

        ResolvedPath(path)
    }

    /// Path of `path` relative to the root, `None` if it lies outside.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Whether `path` names something hidden.
    ///
    /// Every segment below the root counts, so a file inside a hidden
    /// directory is hidden too. The root itself never is. A path that left
    /// the root through a followed symlink is judged by its final name.
    pub fn is_hidden(&self, path: &Path) -> bool {
        match self.relative(path) {
            Some(relative) => relative.components().any(|component| match component {
                Component::Normal(name) => is_hidden_name(name),
                _ => false,
            }),
            None => path.file_name().is_some_and(is_hidden_name),
        }
    }
}

/// Whether a single file name is hidden.
pub fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with(HIDDEN_MARKER)
}

/// Resolve symlinks in `path`, falling back to `path` unchanged on failure.
///
/// Failure is expected for paths that do not exist yet (upload targets,
/// `mkdirp`, the destination of a move).
pub fn resolve_symlinks_or_fallback(path: PathBuf) -> PathBuf {
    match fs::canonicalize(&path) {
        Ok(resolved) => resolved,
        Err(_) => path,
    }
}

/// Lexically clean `path` as though it were rooted at `/`.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment,
/// stopping at the root. Backslashes and drive prefixes are not separators
/// on unix and stay inside their segment; on other platforms they split.
fn clean_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();

    for raw in path.split('/') {
        for component in Path::new(raw).components() {
            match component {
                Component::ParentDir => {
                    segments.pop();
                }
                Component::Normal(name) => {
                    if let Some(name) = name.to_str() {
                        segments.push(name);
                    }
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
    }

    segments
}
