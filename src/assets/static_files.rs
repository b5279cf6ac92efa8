//! Static file serving.
//!
//! # Responsibilities
//! - Resolve request paths beneath the static root without escaping it
//! - Stream files with content type, length and cache headers
//! - Fall back to the application shell (`index.html`) for unknown paths
//!
//! # Design Decisions
//! - Paths are percent-decoded before validation; any `..` is a 404
//! - Files are streamed, never buffered whole
//! - API paths never fall back to the shell

use std::io;
use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, StatusCode},
    response::Response,
};
use percent_encoding::percent_decode_str;
use tokio_util::io::ReaderStream;

use crate::http::response::json_error;

/// Name of the application shell inside the static root.
pub const SHELL_FILE: &str = "index.html";

const CACHE_IMMUTABLE: &str = "public, max-age=3600";
const CACHE_REVALIDATE: &str = "no-cache";

/// Serves files from a single root directory.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Confirm the root is a readable directory.
    pub async fn check_root(&self) -> io::Result<()> {
        tokio::fs::read_dir(&self.root).await.map(|_| ())
    }

    /// Map a request path to a file beneath the root.
    ///
    /// Returns `None` for paths that are not valid UTF-8 once decoded or
    /// that contain `..`, root or prefix components.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
        if decoded.contains('\0') {
            return None;
        }

        let mut resolved = self.root.clone();
        for component in Path::new(decoded.trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }

    /// Serve `request_path`, or the shell when it names no file.
    pub async fn serve(&self, method: &Method, request_path: &str) -> Response {
        if method != Method::GET && method != Method::HEAD {
            let mut response = json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None);
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }
        let head = method == Method::HEAD;

        let Some(path) = self.resolve(request_path) else {
            tracing::warn!(path = %request_path, "Rejected static path");
            return not_found();
        };

        match open_file(&path).await {
            Ok(Some((file, len))) => {
                let cache = if request_path == "/sw.js" || path.ends_with(SHELL_FILE) {
                    CACHE_REVALIDATE
                } else {
                    CACHE_IMMUTABLE
                };
                return file_response(file, len, &path, cache, head);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Failed to open static file");
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read file", None);
            }
        }

        if is_api_path(request_path) {
            return not_found();
        }
        self.serve_shell(head).await
    }

    /// Serve `index.html`.
    pub async fn serve_shell(&self, head: bool) -> Response {
        let path = self.root.join(SHELL_FILE);
        match open_file(&path).await {
            Ok(Some((file, len))) => file_response(file, len, &path, CACHE_REVALIDATE, head),
            Ok(None) => {
                tracing::debug!(root = ?self.root, "No application shell in static root");
                not_found()
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Failed to open application shell");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read file", None)
            }
        }
    }
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Open a regular file. `Ok(None)` when there is nothing to serve.
async fn open_file(path: &Path) -> io::Result<Option<(tokio::fs::File, u64)>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(e),
        // Not found, or a file used as a directory.
        Err(_) => return Ok(None),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    let file = tokio::fs::File::open(path).await?;
    Ok(Some((file, metadata.len())))
}

fn file_response(file: tokio::fs::File, len: u64, path: &Path, cache: &'static str, head: bool) -> Response {
    let body = if head {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache));
    response
}

fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found", None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn fixture() -> (tempfile::TempDir, StaticAssets) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>shell</html>").unwrap();
        std::fs::create_dir(dir.path().join("bundle")).unwrap();
        std::fs::write(dir.path().join("bundle/app.js"), "console.log(1)").unwrap();
        std::fs::write(dir.path().join("sw.js"), "self.x = 1").unwrap();
        let assets = StaticAssets::new(dir.path());
        (dir, assets)
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let assets = StaticAssets::new("/srv/web");
        assert_eq!(
            assets.resolve("/bundle/app.js"),
            Some(PathBuf::from("/srv/web/bundle/app.js"))
        );
        assert_eq!(assets.resolve("/a/./b.css"), Some(PathBuf::from("/srv/web/a/b.css")));
        assert!(assets.resolve("/../etc/passwd").is_none());
        assert!(assets.resolve("/bundle/../../etc/passwd").is_none());
        assert!(assets.resolve("/%2e%2e/etc/passwd").is_none());
        assert!(assets.resolve("/bundle/%2E%2E%2Fsecret").is_none());
        assert!(assets.resolve("/bad%00name").is_none());
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let (_dir, assets) = fixture();
        let response = assets.serve(&Method::GET, "/bundle/app.js").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "14");
        assert_eq!(response.headers()[header::CACHE_CONTROL], CACHE_IMMUTABLE);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .contains("javascript"));
        assert_eq!(body_string(response).await, "console.log(1)");
    }

    #[tokio::test]
    async fn test_service_worker_is_revalidated() {
        let (_dir, assets) = fixture();
        let response = assets.serve(&Method::GET, "/sw.js").await;
        assert_eq!(response.headers()[header::CACHE_CONTROL], CACHE_REVALIDATE);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_shell() {
        let (_dir, assets) = fixture();
        let response = assets.serve(&Method::GET, "/bundle/missing.js").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], CACHE_REVALIDATE);
        assert_eq!(body_string(response).await, "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_api_paths_do_not_fall_back() {
        let (_dir, assets) = fixture();
        let response = assets.serve(&Method::GET, "/api/missing.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let (_dir, assets) = fixture();
        let response = assets.serve(&Method::GET, "/bundle/%2e%2e/%2e%2e/etc/passwd").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_and_disallowed_methods() {
        let (_dir, assets) = fixture();

        let head = assets.serve(&Method::HEAD, "/bundle/app.js").await;
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.headers()[header::CONTENT_LENGTH], "14");
        assert!(body_string(head).await.is_empty());

        let post = assets.serve(&Method::POST, "/bundle/app.js").await;
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(post.headers()[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_missing_shell_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let assets = StaticAssets::new(dir.path());
        let response = assets.serve(&Method::GET, "/settings").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_root() {
        let (_dir, assets) = fixture();
        assert!(assets.check_root().await.is_ok());
        assert!(StaticAssets::new("/definitely/not/here").check_root().await.is_err());
    }
}
