//! End-to-end integration tests for fileshare.
//!
//! These tests run a real listener on an ephemeral port and talk to it over
//! HTTP:
//! - Listing, download and range requests
//! - Path confinement
//! - RPC mutations and uploads, and their read-only gating
//! - Hidden-file policy
//! - Zip archives

use std::fs;
use std::path::{Path, PathBuf};

use async_zip::base::read::mem::ZipFileReader;
use fileshare::{FileServer, PolicyFlags, ServerSettings};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client, StatusCode};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A running server over a temporary share.
struct TestServer {
    base: String,
    root: PathBuf,
    client: Client,
    shutdown: CancellationToken,
    _temp_dir: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    async fn rpc(&self, path: &str, call: &str, args: &[&str]) -> (StatusCode, String) {
        let body = json!({ "call": call, "args": args }).to_string();
        let response = self
            .client
            .post(self.url(path))
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    async fn upload(&self, path: &str, destination: &str, contents: &[u8]) -> (StatusCode, String) {
        let form = Form::new().part(
            "file",
            Part::bytes(contents.to_vec()).file_name("upload.bin"),
        );
        let response = self
            .client
            .post(self.url(path))
            .header("fileshare-path", destination)
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }
}

/// Create the tree used across the tests.
fn create_test_structure(dir: &Path) {
    fs::create_dir_all(dir.join("hols")).unwrap();
    fs::create_dir_all(dir.join("fancy-path")).unwrap();
    fs::create_dir_all(dir.join("subdir with space")).unwrap();
    fs::create_dir_all(dir.join(".git")).unwrap();
    fs::write(dir.join("fancy-path/a"), "fancy!").unwrap();
    fs::write(
        dir.join("subdir with space/file with space.html"),
        "<b>spaced</b>",
    )
    .unwrap();
    fs::write(dir.join("hols/beach.txt"), "sand").unwrap();
    fs::write(dir.join(".secret"), "s3cret").unwrap();
    fs::write(dir.join(".git/config"), "[core]").unwrap();
}

/// Start a server over a fresh share.
async fn start_server(prefix: &str, policy: PolicyFlags) -> TestServer {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("share");
    fs::create_dir(&root).unwrap();
    create_test_structure(&root);

    let mut settings = ServerSettings::new(&root, prefix, policy).unwrap();
    settings.port = 0;

    let server = FileServer::bind(settings).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));

    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap();

    TestServer {
        base: format!("http://{addr}"),
        root,
        client,
        shutdown,
        _temp_dir: temp_dir,
    }
}

fn read_only() -> PolicyFlags {
    PolicyFlags {
        read_only: true,
        ..PolicyFlags::default()
    }
}

// =============================================================================
// Browsing
// =============================================================================

#[tokio::test]
async fn test_listing_mkdirp_rm_scenario() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, html) = server.get_text("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("hols/"));
    assert!(html.contains("fancy-path/"));

    let (status, body) = server.get_text("/fancy-path/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fancy!");

    let (status, body) = server
        .get_text("/subdir%20with%20space/file%20with%20space.html")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<b>spaced</b>");

    let (status, body) = server.rpc("/rpc", "mkdirp", &["/AAA"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    assert!(server.root.join("AAA").is_dir());
    let (_, html) = server.get_text("/").await;
    assert!(html.contains("AAA/"));

    let (status, body) = server.rpc("/rpc", "rm", &["/AAA"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    let (_, html) = server.get_text("/").await;
    assert!(!html.contains("AAA/"));
}

#[tokio::test]
async fn test_subdirectory_listing() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, html) = server.get_text("/hols/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("<title>/hols/</title>"));
    assert!(html.contains("../"));
    assert!(html.contains("beach.txt"));
    assert!(html.contains("4.0B"));
}

#[tokio::test]
async fn test_file_content_type_and_range() {
    let server = start_server("/", PolicyFlags::default()).await;

    let response = server
        .client
        .get(server.url("/hols/beach.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let response = server
        .client
        .get(server.url("/fancy-path/a"))
        .header(RANGE, "bytes=0-2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.text().await.unwrap(), "fan");
}

// =============================================================================
// Confinement
// =============================================================================

#[tokio::test]
async fn test_traversal_never_escapes_root() {
    let server = start_server("/", PolicyFlags::default()).await;
    fs::write(server.root.parent().unwrap().join("outside.txt"), "outside").unwrap();

    let (status, body) = server.get_text("/..%2f..%2f..%2fetc%2fpasswd").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "error");

    let (status, body) = server.get_text("/..%2foutside.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "error");

    let (status, _) = server.rpc("/rpc", "mkdirp", &["/../../escaped"]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(server.root.join("escaped").is_dir());
    assert!(!server.root.parent().unwrap().join("escaped").exists());

    let (status, _) = server.rpc("/rpc", "rm", &["/../outside.txt"]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(server.root.parent().unwrap().join("outside.txt").exists());
}

#[tokio::test]
async fn test_zip_of_missing_path_is_error() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, body) = server
        .get_text("/zip?zipPath=%2Fdoes-not-exist&zipName=nope")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "error");
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_move_entry() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, _) = server
        .rpc("/rpc", "mv", &["/fancy-path/a", "/hols/a"])
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get_text("/hols/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fancy!");
    let (status, _) = server.get_text("/fancy-path/a").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_rpc_is_error() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, body) = server.rpc("/rpc", "chmod", &["/hols"]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "error");

    let (status, body) = server.rpc("/rpc", "mv", &["/hols"]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "error");
    assert!(server.root.join("hols").is_dir());
}

#[tokio::test]
async fn test_move_missing_source_is_error() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, body) = server.rpc("/rpc", "mv", &["/nope", "/hols/nope"]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "error");
}

#[tokio::test]
async fn test_root_survives_rm_and_mv() {
    let server = start_server("/", PolicyFlags::default()).await;

    for args in [&["/"][..], &[".."][..], &["/hols/.."][..]] {
        let (status, body) = server.rpc("/rpc", "rm", args).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "error");
    }
    let (status, _) = server.rpc("/rpc", "mv", &["/", "/hols/root"]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(server.root.join("hols/beach.txt").exists());
    let (status, body) = server.get_text("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("hols/"));
}

#[tokio::test]
async fn test_upload_round_trip() {
    let server = start_server("/", PolicyFlags::default()).await;
    let contents: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();

    let (status, body) = server
        .upload("/post", "/hols/new%20file.bin", &contents)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    assert_eq!(fs::read(server.root.join("hols/new file.bin")).unwrap(), contents);

    let response = server
        .client
        .get(server.url("/hols/new%20file.bin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), contents.as_slice());
}

#[tokio::test]
async fn test_upload_into_missing_directory_fails() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (status, body) = server.upload("/post", "/missing/file.bin", b"x").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "error");
}

#[tokio::test]
async fn test_read_only_blocks_mutations() {
    let server = start_server("/", read_only()).await;

    let (status, body) = server.rpc("/rpc", "mkdirp", &["/AAA"]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "error");
    assert!(!server.root.join("AAA").exists());

    let (status, _) = server.rpc("/rpc", "rm", &["/hols"]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(server.root.join("hols/beach.txt").exists());

    let (status, _) = server
        .rpc("/rpc", "mv", &["/fancy-path/a", "/hols/a"])
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(server.root.join("fancy-path/a").exists());
    assert!(!server.root.join("hols/a").exists());

    let (status, _) = server.upload("/post", "/fancy-path/a", b"overwritten").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        fs::read_to_string(server.root.join("fancy-path/a")).unwrap(),
        "fancy!"
    );

    let (status, body) = server.get_text("/fancy-path/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fancy!");
    let (status, _) = server
        .get_text("/zip?zipPath=%2Fhols&zipName=hols")
        .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Hidden files
// =============================================================================

#[tokio::test]
async fn test_hidden_entries_invisible_everywhere() {
    let server = start_server("/", PolicyFlags::default()).await;

    let (_, html) = server.get_text("/").await;
    assert!(!html.contains(".secret"));
    assert!(!html.contains(".git"));

    let (status, _) = server.get_text("/.secret").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get_text("/.git/config").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get_text("/zip?zipPath=%2F.git&zipName=git").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hidden_entries_visible_when_not_skipped() {
    let policy = PolicyFlags {
        skip_hidden: false,
        ..PolicyFlags::default()
    };
    let server = start_server("/", policy).await;

    let (_, html) = server.get_text("/").await;
    assert!(html.contains(".secret"));
    assert!(html.contains(".git/"));

    let (status, body) = server.get_text("/.secret").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "s3cret");
}

// =============================================================================
// Archives
// =============================================================================

#[tokio::test]
async fn test_zip_download() {
    let server = start_server("/", PolicyFlags::default()).await;

    let response = server
        .client
        .get(server.url("/zip?zipPath=%2F&zipName=share"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/zip");
    let disposition = response.headers()[CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"share.zip\""));

    let data = response.bytes().await.unwrap().to_vec();
    let reader = ZipFileReader::new(data).await.unwrap();
    let mut names: Vec<String> = reader
        .file()
        .entries()
        .iter()
        .map(|entry| entry.filename().as_str().unwrap().to_string())
        .collect();
    names.sort();

    assert_eq!(
        names,
        vec![
            "share/",
            "share/fancy-path/",
            "share/fancy-path/a",
            "share/hols/",
            "share/hols/beach.txt",
            "share/subdir with space/",
            "share/subdir with space/file with space.html",
        ]
    );
}

// =============================================================================
// URL prefix
// =============================================================================

#[tokio::test]
async fn test_prefix_mounting() {
    let server = start_server("share", PolicyFlags::default()).await;

    let (status, html) = server.get_text("/share/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("hols/"));
    assert!(html.contains("/share/hols/"));

    let (status, body) = server.get_text("/share/fancy-path/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fancy!");

    let (status, _) = server.rpc("/share/rpc", "mkdirp", &["/share/AAA"]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(server.root.join("AAA").is_dir());

    let (status, _) = server
        .get_text("/share/zip?zipPath=%2Fshare%2Fhols&zipName=hols")
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_outside_prefix_redirects() {
    let server = start_server("share", PolicyFlags::default()).await;

    let response = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/share/");

    let response = server
        .client
        .get(server.url("/elsewhere/file"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/share/");
}
