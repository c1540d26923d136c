//! # fileshare
//!
//! Share one directory tree over HTTP. A browser can list and download
//! files, upload, create, move and delete entries, and download whole
//! folders as zip archives.
//!
//! ## Overview
//!
//! - **Path confinement**: every request path is mapped below the shared
//!   root by [`files::PathResolver`]; `..` never climbs out
//! - **Listings**: [`files::DirectoryLister`] with the hidden-file policy,
//!   rendered by [`render::PageRenderer`]
//! - **Archives**: [`files::ArchiveStreamer`] streams stored zip entries
//!   straight into the response
//! - **Mutations**: [`files::MutationOps`] and [`files::UploadReceiver`],
//!   disabled as a whole on read-only shares
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileshare::{FileServer, PolicyFlags, ServerSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = ServerSettings::new("/srv/share", "/", PolicyFlags::default())?;
//!     let server = FileServer::bind(settings).await?;
//!     server.run(CancellationToken::new()).await
//! }
//! ```

pub mod config;
pub mod files;
pub mod render;
pub mod router;
pub mod server;

pub use config::{Config, ConfigError, PolicyFlags, ServerSettings, UrlPrefix};
pub use router::{build_router, AppState, HttpError};
pub use server::FileServer;
