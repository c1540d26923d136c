//! Listener lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerSettings;
use crate::router::{build_router, AppState};

/// A bound, not yet serving, file server.
pub struct FileServer {
    listener: TcpListener,
    router: Router,
    settings: ServerSettings,
}

impl FileServer {
    /// Build the router for `settings` and bind its listener.
    ///
    /// Port 0 binds an ephemeral port; see [`FileServer::local_addr`].
    pub async fn bind(settings: ServerSettings) -> Result<Self> {
        let state = AppState::new(&settings).context("Failed to prepare listing template")?;
        let router = build_router(Arc::new(state));

        let listener = TcpListener::bind((settings.bind_host(), settings.port))
            .await
            .with_context(|| {
                format!("Failed to bind {}:{}", settings.bind_host(), settings.port)
            })?;

        Ok(Self {
            listener,
            router,
            settings,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Settings the server was bound with.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(
            root = %self.settings.root.display(),
            prefix = %self.settings.prefix,
            read_only = self.settings.policy.read_only,
            "Serving on http://{}{}",
            addr,
            self.settings.prefix
        );
        if self.settings.policy.follow_symlinks {
            warn!("Symlink following is enabled; links may expose files outside the shared directory");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("HTTP server failed")?;

        info!("Server stopped");
        Ok(())
    }
}
