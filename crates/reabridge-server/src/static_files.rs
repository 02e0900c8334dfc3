//! Static asset lookup under the web root.
//!
//! A request path `p` is cleaned (rooted, `.` and `..` resolved, so it can
//! never climb out of the root) and then tried as:
//!
//! 1. `root/p`
//! 2. `root/p.html`, when `p` has no extension
//! 3. `root/p/index.html`
//!
//! The first candidate that is a regular file wins. No match means the
//! request belongs to REAPER and is proxied.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Response, StatusCode};

use crate::error::HttpError;

/// Serves files from a web root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Candidate file paths for `request_path`, in lookup order.
    pub fn candidates(&self, request_path: &str) -> Vec<PathBuf> {
        let segments = clean_segments(request_path);
        let base: PathBuf = segments.iter().fold(self.root.clone(), |acc, s| acc.join(s));
        let mut candidates = Vec::with_capacity(3);

        if !segments.is_empty() {
            candidates.push(base.clone());
            if base.extension().is_none() {
                let mut with_html = base.clone().into_os_string();
                with_html.push(".html");
                candidates.push(PathBuf::from(with_html));
            }
        }
        candidates.push(base.join("index.html"));

        candidates
            .into_iter()
            .filter(|candidate| candidate.starts_with(&self.root) && *candidate != self.root)
            .collect()
    }

    /// Find the first candidate for `request_path` that is a regular file.
    pub async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        for candidate in self.candidates(request_path) {
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Read `path` and build a response with a guessed content type.
    pub async fn serve(&self, path: &Path) -> Result<Response<Body>, HttpError> {
        let contents = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime.as_ref())
            .header(header::CONTENT_LENGTH, contents.len())
            .body(Body::from(contents))
            .map_err(|e| HttpError::FileRead(std::io::Error::other(e)))
    }
}

/// Split a URL path into normal segments, resolving `.` and `..` the way a
/// rooted path is cleaned: `..` at the top stays at the top.
fn clean_segments(request_path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\\') || s.contains('\0') => return Vec::new(),
            s => segments.push(s),
        }
    }
    segments
}
