//! Uploads streamed straight to disk.
//!
//! The destination travels in a request header, percent-encoded, and the
//! body arrives as a stream of chunks that are written as they come in.

use std::io;
use std::pin::pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use percent_encoding::percent_decode_str;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::error::FileError;
use super::resolver::PathResolver;

/// Request header carrying the percent-encoded upload destination.
pub const UPLOAD_PATH_HEADER: &str = "fileshare-path";

/// Percent-decode an upload destination header value.
pub fn decode_upload_path(raw: &str) -> Result<String, FileError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| FileError::InvalidRequest(format!("upload path is not UTF-8: {e}")))
}

/// Writes uploaded bodies below the shared root.
pub struct UploadReceiver {
    resolver: Arc<PathResolver>,
}

impl UploadReceiver {
    /// Create a receiver sharing `resolver`.
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }

    /// Stream `chunks` into the file at `destination`, replacing it if it
    /// exists. Returns the number of bytes written.
    ///
    /// The parent directory must already exist. A failed upload removes the
    /// partial file.
    pub async fn receive<S, B, E>(&self, destination: &str, chunks: S) -> Result<u64, FileError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let target = self.resolver.resolve(destination);
        let mut file = tokio::fs::File::create(&target).await?;

        let mut chunks = pin!(chunks);
        let mut written = 0u64;
        let result: Result<(), io::Error> = async {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(io::Error::other)?;
                file.write_all(chunk.as_ref()).await?;
                written += chunk.as_ref().len() as u64;
            }
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %cleanup, "Failed to remove partial upload");
            }
            return Err(FileError::Io(e));
        }

        info!(path = %target.display(), bytes = written, "received upload");
        Ok(written)
    }
}
