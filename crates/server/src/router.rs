//! HTTP routing.
//!
//! Maps the prefix-relative endpoints onto the file layer:
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `P`, `P{*path}` | file or directory listing |
//! | GET | `Pzip?zipPath=&zipName=` | zip stream of a subtree |
//! | POST | `Ppost` | multipart upload (`fileshare-path` header) |
//! | POST | `Prpc` | `{"call","args"}` mutation |
//!
//! Anything else is redirected to the prefix. Every failure answers with
//! the body `error`; the detail only goes to the log. Extractors are taken
//! as `Result` so their rejections go through [`HttpError`] too.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{stream, StreamExt};
use percent_encoding::percent_decode_str;
use protocol::RpcRequest;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info_span, warn, Level};

use crate::config::{PolicyFlags, ServerSettings, UrlPrefix};
use crate::files::{
    content_disposition, decode_upload_path, ArchiveStreamer, Content, ContentServer, FileError,
    MutationOps, PathResolver, UploadReceiver, UPLOAD_PATH_HEADER,
};
use crate::render::{PageRenderer, RenderError};

/// Bytes buffered between the archive writer and the response body.
const ARCHIVE_PIPE_CAPACITY: usize = 64 * 1024;

/// Body of every successful mutation.
const OK_BODY: &str = "ok";

/// Body of every failure.
const ERROR_BODY: &str = "error";

/// Errors surfaced by request handlers.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Mutation attempted on a read-only share.
    #[error("share is read-only")]
    Forbidden,

    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// File layer failure.
    #[error(transparent)]
    File(#[from] FileError),

    /// Page rendering failure.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<tokio::task::JoinError> for HttpError {
    fn from(err: tokio::task::JoinError) -> Self {
        HttpError::File(FileError::Task(err))
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<BytesRejection> for HttpError {
    fn from(rejection: BytesRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for HttpError {
    fn from(rejection: MultipartRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl HttpError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Forbidden => StatusCode::FORBIDDEN,
            HttpError::File(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, ERROR_BODY).into_response()
    }
}

/// Shared, immutable state handed to every handler.
pub struct AppState {
    prefix: UrlPrefix,
    policy: PolicyFlags,
    content: ContentServer,
    ops: MutationOps,
    uploads: UploadReceiver,
    archives: ArchiveStreamer,
    renderer: PageRenderer,
}

impl AppState {
    /// Wire the file layer for `settings`.
    pub fn new(settings: &ServerSettings) -> Result<Self, RenderError> {
        let resolver = Arc::new(PathResolver::new(
            settings.root.clone(),
            &settings.prefix,
            settings.policy,
        ));

        Ok(Self {
            prefix: settings.prefix.clone(),
            policy: settings.policy,
            content: ContentServer::new(resolver.clone(), settings.prefix.clone(), settings.policy),
            ops: MutationOps::new(resolver.clone()),
            uploads: UploadReceiver::new(resolver),
            archives: ArchiveStreamer::new(settings.policy),
            renderer: PageRenderer::new()?,
        })
    }
}

/// Build the application router for `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.prefix.clone();
    let writable = middleware::from_fn_with_state(state.clone(), reject_when_read_only);

    Router::new()
        .route(&prefix.route("zip"), get(download_archive))
        .route(
            &prefix.route("rpc"),
            post(rpc).layer(writable.clone()).get(serve_content),
        )
        .route(
            &prefix.route("post"),
            post(upload)
                .layer(DefaultBodyLimit::disable())
                .layer(writable)
                .get(serve_content),
        )
        .route(prefix.as_str(), get(serve_content))
        .route(&prefix.route("{*path}"), get(serve_content))
        .fallback(redirect_to_prefix)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// Turn away mutating requests when the share is read-only.
async fn reject_when_read_only(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    if state.policy.read_only {
        warn!(path = %request.uri().path(), "rejected mutation on read-only share");
        return Err(HttpError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Redirect unknown routes to the listing of the root.
async fn redirect_to_prefix(State(state): State<Arc<AppState>>) -> Response {
    let location = HeaderValue::from_str(state.prefix.as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("/"));
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Serve a file, or render the listing of a directory.
async fn serve_content(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, HttpError> {
    let path = percent_decode_str(request.uri().path())
        .decode_utf8_lossy()
        .into_owned();

    let lookup = state.clone();
    let content = tokio::task::spawn_blocking(move || lookup.content.lookup(&path)).await??;

    match content {
        Content::Directory(listing) => Ok(Html(state.renderer.render(&listing)?).into_response()),
        Content::File(path) => {
            let response = ServeFile::new(path.as_path())
                .oneshot(request)
                .await
                .unwrap_or_else(|never| match never {});
            Ok(response.map(Body::new))
        }
    }
}

/// Query of the archive endpoint.
#[derive(Debug, Deserialize)]
struct ArchiveQuery {
    #[serde(rename = "zipPath")]
    zip_path: String,
    #[serde(rename = "zipName")]
    zip_name: Option<String>,
}

/// Stream a subtree as a zip archive.
///
/// Errors before the first byte are reported normally. After that the body
/// is aborted and the client sees a truncated download.
async fn download_archive(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ArchiveQuery>, QueryRejection>,
) -> Result<Response, HttpError> {
    let Query(query) = query?;
    let lookup = state.clone();
    let zip_path = query.zip_path.clone();
    let (subtree, _) = tokio::task::spawn_blocking(move || lookup.content.locate(&zip_path)).await??;

    let display_name = query.zip_name.unwrap_or_else(|| {
        subtree
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let disposition = HeaderValue::from_str(&content_disposition(&display_name))
        .map_err(|e| HttpError::BadRequest(e.to_string()))?;

    let (reader, writer) = tokio::io::duplex(ARCHIVE_PIPE_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();
    let archives = state.archives;
    tokio::spawn(async move {
        let outcome = archives.stream(&subtree, writer).await.map(drop);
        let _ = done_tx.send(outcome);
    });

    let tail = stream::once(done_rx).filter_map(|outcome| async move {
        match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                error!(error = %e, "archive aborted");
                Some(Err(io::Error::other(e)))
            }
            Err(_) => Some(Err(io::Error::other("archive task dropped"))),
        }
    });
    let body = Body::from_stream(ReaderStream::new(reader).chain(tail));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Run a mutation call.
async fn rpc(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<&'static str, HttpError> {
    let body = body?;
    let request = RpcRequest::from_json(&body).map_err(FileError::from)?;
    tokio::task::spawn_blocking(move || state.ops.dispatch(&request)).await??;
    Ok(OK_BODY)
}

/// Store the first part of a multipart body at the header-named path.
async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<&'static str, HttpError> {
    let mut multipart = multipart?;
    let raw = headers
        .get(UPLOAD_PATH_HEADER)
        .ok_or_else(|| HttpError::BadRequest(format!("missing {UPLOAD_PATH_HEADER} header")))?
        .to_str()
        .map_err(|e| HttpError::BadRequest(e.to_string()))?;
    let destination = decode_upload_path(raw)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::BadRequest(e.to_string()))?
        .ok_or_else(|| HttpError::BadRequest("multipart body has no parts".to_string()))?;

    state.uploads.receive(&destination, field).await?;
    Ok(OK_BODY)
}
