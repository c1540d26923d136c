//! Directory listing with the hidden-file policy.
//!
//! Produces the rows of a directory page, split into folders with a
//! trailing `/` and files with a human readable size and their extension.
//! Enumeration order is whatever the OS returns.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use protocol::{Listing, ListingEntry, FOLDER_KIND};
use tracing::{debug, warn};

use super::error::FileError;
use super::resolver::{is_hidden_name, PathResolver, ResolvedPath};
use crate::config::{PolicyFlags, UrlPrefix};

/// Characters escaped when a file name becomes a link.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Size units, each 1024 times the previous.
const SIZE_UNITS: [&str; 9] = ["B", "k", "M", "G", "T", "P", "E", "Z", "Y"];

/// Shortens a byte count to a human-readable alternative such as `1.5M`.
pub fn humanize(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, SIZE_UNITS[unit])
}

/// Extension of `name` without its dot, empty if there is none.
fn extension(name: &str) -> &str {
    name.rfind('.').map(|dot| &name[dot + 1..]).unwrap_or("")
}

/// Percent-encode a file name for use as a relative link.
pub fn href(name: &str) -> String {
    utf8_percent_encode(name, HREF_ESCAPE).to_string()
}

/// Lists directories below the shared root.
pub struct DirectoryLister {
    resolver: Arc<PathResolver>,
    prefix: UrlPrefix,
    policy: PolicyFlags,
}

impl DirectoryLister {
    /// Create a lister sharing `resolver`.
    pub fn new(resolver: Arc<PathResolver>, prefix: UrlPrefix, policy: PolicyFlags) -> Self {
        Self {
            resolver,
            prefix,
            policy,
        }
    }

    /// Page title for `dir`: `/` for the root, `/a/b/` below it.
    fn title(&self, dir: &Path) -> String {
        let relative = self
            .resolver
            .relative(dir)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| {
                dir.file_name()
                    .map(|name| vec![name.to_string_lossy().into_owned()])
                    .unwrap_or_default()
            });

        if relative.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", relative.join("/"))
        }
    }

    /// List the immediate children of `dir`.
    pub fn list(&self, dir: &ResolvedPath) -> Result<Listing, FileError> {
        let entries = fs::read_dir(dir).map_err(|e| FileError::from_io(e, dir))?;

        let mut listing = Listing {
            title: self.title(dir),
            extra_path: self.prefix.as_str().to_string(),
            read_only: self.policy.read_only,
            folders: Vec::new(),
            files: Vec::new(),
        };

        if !self.resolver.is_root(dir) {
            listing.folders.push(ListingEntry::parent());
        }

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();

            if self.policy.skip_hidden && is_hidden_name(&file_name) {
                continue;
            }

            let name = file_name.to_string_lossy().into_owned();
            let metadata = match super::stat(&entry.path(), self.policy.follow_symlinks) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Removed mid-listing, or a dangling symlink while following.
                    warn!(entry = %entry.path().display(), "skipping unreadable entry: {}", e);
                    continue;
                }
                Err(e) => return Err(FileError::Io(e)),
            };

            if metadata.is_dir() {
                listing.folders.push(ListingEntry {
                    name: format!("{name}/"),
                    href: href(&name),
                    size: String::new(),
                    ext: FOLDER_KIND.to_string(),
                });
            } else {
                listing.files.push(ListingEntry {
                    href: href(&name),
                    size: humanize(metadata.len()),
                    ext: extension(&name).to_string(),
                    name,
                });
            }
        }

        debug!(dir = %dir.display(), rows = listing.len(), "listed directory");
        Ok(listing)
    }
}
