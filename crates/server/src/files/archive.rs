//! Streaming zip archives of whole subtrees.
//!
//! The tree is walked on a blocking thread and handed, entry by entry,
//! through a bounded channel to the zip writer, which writes straight into
//! the response. Entries are stored without compression and sized with data
//! descriptors, so nothing is buffered beyond one copy buffer and the
//! channel.
//!
//! Once the first byte is out there is no way to report an error except by
//! cutting the stream short; the client is left with a truncated archive.

use std::io;
use std::path::{Path, PathBuf};

use async_zip::base::write::ZipFileWriter;
use async_zip::error::ZipError;
use async_zip::{Compression, ZipEntryBuilder};
use futures_util::io::AsyncWrite;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::debug;
use walkdir::WalkDir;

use super::resolver::{is_hidden_name, ResolvedPath};
use crate::config::PolicyFlags;

/// Entries the walker may run ahead of the writer.
const WALK_QUEUE_DEPTH: usize = 32;

/// Unix mode for symlink entries (`S_IFLNK | 0o777`).
const SYMLINK_MODE: u16 = 0o120777;

/// Fallback archive name when the requested one is empty.
const DEFAULT_ARCHIVE_NAME: &str = "archive";

/// Errors that can occur while producing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Walking the tree failed (unreadable directory, dangling or looping
    /// symlink while following).
    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// The zip writer failed, usually because the sink went away.
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The walker thread did not complete.
    #[error("walker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One entry to be written, as found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArchiveEntry {
    /// Header only.
    Directory { name: String },
    /// Header plus the file's bytes.
    File { name: String, path: PathBuf },
    /// Header plus the link target, never the target's bytes.
    Symlink { name: String, target: String },
}

impl ArchiveEntry {
    /// Classify a walked entry, naming it relative to `base`.
    ///
    /// Returns `Ok(None)` for an entry with no name, which only happens when
    /// the filesystem root itself is archived.
    fn from_walk(entry: &walkdir::DirEntry, base: &Path) -> Result<Option<Self>, ArchiveError> {
        let name = archive_path(entry.path(), base);
        if name.is_empty() {
            return Ok(None);
        }

        let file_type = entry.file_type();
        let archived = if file_type.is_dir() {
            ArchiveEntry::Directory {
                name: format!("{name}/"),
            }
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            ArchiveEntry::Symlink {
                name,
                target: target.to_string_lossy().into_owned(),
            }
        } else {
            ArchiveEntry::File {
                name,
                path: entry.path().to_path_buf(),
            }
        };

        Ok(Some(archived))
    }
}

/// `path` relative to `base`, joined with `/` on every platform.
fn archive_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// File name offered to the client: the display name plus `.zip`.
///
/// Quotes, backslashes and control characters are dropped.
pub fn attachment_name(display_name: &str) -> String {
    let cleaned: String = display_name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        format!("{DEFAULT_ARCHIVE_NAME}.zip")
    } else {
        format!("{cleaned}.zip")
    }
}

/// `Content-Disposition` value for an archive download.
///
/// Carries an ASCII `filename` for old clients and the exact UTF-8 name in
/// `filename*`.
pub fn content_disposition(display_name: &str) -> String {
    let name = attachment_name(display_name);
    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let encoded = utf8_percent_encode(&name, NON_ALPHANUMERIC);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

/// Walk `root` depth-first and feed entries to `tx`.
///
/// Stops at the first error (after sending it) or when the receiver is gone.
fn walk_subtree(
    root: PathBuf,
    policy: PolicyFlags,
    tx: mpsc::Sender<Result<ArchiveEntry, ArchiveError>>,
) {
    let base = root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
    let skip_hidden = policy.skip_hidden;

    let walker = WalkDir::new(&root)
        .follow_links(policy.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            !(skip_hidden && entry.depth() > 0 && is_hidden_name(entry.file_name()))
        });

    for item in walker {
        let entry = match item
            .map_err(ArchiveError::from)
            .and_then(|entry| ArchiveEntry::from_walk(&entry, &base))
        {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => continue,
            Err(e) => Err(e),
        };

        let failed = entry.is_err();
        if tx.blocking_send(entry).is_err() || failed {
            return;
        }
    }
}

/// Append one entry to the archive.
async fn write_entry<W>(writer: &mut ZipFileWriter<W>, entry: ArchiveEntry) -> Result<(), ArchiveError>
where
    W: AsyncWrite + Unpin,
{
    match entry {
        ArchiveEntry::Directory { name } => {
            debug!(entry = %name, "archiving directory");
            let builder = ZipEntryBuilder::new(name.into(), Compression::Stored);
            writer.write_entry_whole(builder, &[]).await?;
        }
        ArchiveEntry::File { name, path } => {
            debug!(entry = %name, "archiving file");
            let file = tokio::fs::File::open(&path).await?;
            let builder = ZipEntryBuilder::new(name.into(), Compression::Stored);
            let mut entry_writer = writer.write_entry_stream(builder).await?;
            futures_util::io::copy(&mut file.compat(), &mut entry_writer).await?;
            entry_writer.close().await?;
        }
        ArchiveEntry::Symlink { name, target } => {
            debug!(entry = %name, target = %target, "archiving symlink");
            let builder = ZipEntryBuilder::new(name.into(), Compression::Stored)
                .unix_permissions(SYMLINK_MODE);
            writer.write_entry_whole(builder, target.as_bytes()).await?;
        }
    }
    Ok(())
}

/// Streams subtrees as stored zip archives.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveStreamer {
    policy: PolicyFlags,
}

impl ArchiveStreamer {
    /// Create a streamer applying `policy` during the walk.
    pub fn new(policy: PolicyFlags) -> Self {
        Self { policy }
    }

    /// Write the archive of `subtree` into `sink`, returning the sink.
    ///
    /// Entry names are relative to the parent of `subtree`, so the archive
    /// holds a single top-level folder named after it. Any error aborts the
    /// archive; whatever was already written stays written.
    pub async fn stream<S>(&self, subtree: &ResolvedPath, sink: S) -> Result<S, ArchiveError>
    where
        S: tokio::io::AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::channel(WALK_QUEUE_DEPTH);
        let root = subtree.to_path_buf();
        let policy = self.policy;
        let walker = tokio::task::spawn_blocking(move || walk_subtree(root, policy, tx));

        let mut writer = ZipFileWriter::with_tokio(sink);
        let mut entries = 0usize;
        while let Some(entry) = rx.recv().await {
            write_entry(&mut writer, entry?).await?;
            entries += 1;
        }
        walker.await?;

        let sink = writer.close().await?.into_inner();
        debug!(root = %subtree.display(), entries, "archive complete");
        Ok(sink)
    }
}
