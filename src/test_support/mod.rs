//! Test utilities and mocks for Provender unit tests.
//!
//! The resolvers only touch the outside world through three seams:
//! [`HttpFetch`], [`RepoCloner`] and [`DepsLister`]. This module provides
//! in-memory implementations of all three, recording every call so tests
//! can assert on what was (or was not) fetched or cloned.
//!
//! # Example
//!
//! ```rust,ignore
//! use provender::test_support::{MockHttpClient, MockHttpResponse};
//!
//! #[test]
//! fn test_example() {
//!     let http = MockHttpClient::new();
//!     http.mock_url("https://registry.example/a.tgz", MockHttpResponse::ok(b"a"));
//!
//!     // Resolve something...
//!     assert_eq!(http.requests().len(), 1);
//! }
//! ```

pub mod fixtures;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::resolver::errors::{FetchFailure, ResolveError};
use crate::resolver::import_graph::deps::DepsLister;
use crate::resolver::import_graph::workspace::RepoCloner;
use crate::sources::http::{FetchRequest, HttpFetch};

pub use fixtures::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockHttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl MockHttpResponse {
    /// Create a successful response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        MockHttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    /// Create a not found response.
    pub fn not_found() -> Self {
        MockHttpResponse {
            status: 404,
            body: b"Not Found".to_vec(),
        }
    }

    /// Create a server error response.
    pub fn server_error(message: &str) -> Self {
        MockHttpResponse {
            status: 500,
            body: message.as_bytes().to_vec(),
        }
    }

    /// Check if this is a successful response.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Mock HTTP client.
///
/// URLs are matched exactly first, then by the longest registered prefix.
/// Unmatched URLs fall back to the default response, or fail as a
/// transport error.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<BTreeMap<String, MockHttpResponse>>,
    requests: Mutex<Vec<FetchRequest>>,
    default_response: Mutex<Option<MockHttpResponse>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a URL (or URL prefix).
    pub fn mock_url(&self, url: &str, response: MockHttpResponse) -> &Self {
        lock(&self.responses).insert(url.to_string(), response);
        self
    }

    /// Set a default response for unmatched URLs.
    pub fn set_default(&self, response: MockHttpResponse) -> &Self {
        *lock(&self.default_response) = Some(response);
        self
    }

    /// All requested URLs, in request order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).iter().map(|r| r.url.clone()).collect()
    }

    /// All requests including headers.
    pub fn full_requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests made for exactly `url`.
    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.url == url).count()
    }

    fn lookup(&self, url: &str) -> Option<MockHttpResponse> {
        let responses = lock(&self.responses);
        if let Some(response) = responses.get(url) {
            return Some(response.clone());
        }

        responses
            .iter()
            .filter(|(pattern, _)| url.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, response)| response.clone())
            .or_else(|| lock(&self.default_response).clone())
    }
}

impl HttpFetch for MockHttpClient {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ResolveError> {
        lock(&self.requests).push(request.clone());

        let failure = match self.lookup(&request.url) {
            Some(response) if response.is_success() => return Ok(response.body),
            Some(response) => FetchFailure::Status(response.status),
            None => FetchFailure::Transport(format!("no mock response for URL: {}", request.url)),
        };

        Err(ResolveError::Fetch {
            url: request.url.clone(),
            failure,
        })
    }
}

/// Mock git cloner.
///
/// A clone creates `<dest>/.git` so the workspace sees the checkout as
/// present afterwards.
#[derive(Debug, Default)]
pub struct MockCloner {
    commits: Mutex<HashMap<String, String>>,
    clones: Mutex<Vec<String>>,
    checkouts: Mutex<HashMap<PathBuf, String>>,
}

impl MockCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the HEAD commit a repository URL clones to.
    pub fn with_repo(self, url: &str, commit: &str) -> Self {
        lock(&self.commits).insert(url.to_string(), commit.to_string());
        self
    }

    /// URLs cloned so far, in order.
    pub fn clones(&self) -> Vec<String> {
        lock(&self.clones).clone()
    }

    /// Number of times `url` was cloned.
    pub fn clone_count(&self, url: &str) -> usize {
        lock(&self.clones).iter().filter(|u| *u == url).count()
    }
}

impl RepoCloner for MockCloner {
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<String> {
        lock(&self.clones).push(url.to_string());

        let commit = match lock(&self.commits).get(url) {
            Some(commit) => commit.clone(),
            None => bail!("failed to clone {}: repository not found", url),
        };

        std::fs::create_dir_all(dest.join(".git"))?;
        lock(&self.checkouts).insert(dest.to_path_buf(), commit.clone());
        Ok(commit)
    }

    fn head(&self, checkout: &Path) -> Result<String> {
        match lock(&self.checkouts).get(checkout) {
            Some(commit) => Ok(commit.clone()),
            None => bail!("no checkout at {}", checkout.display()),
        }
    }
}

/// Mock dependency lister producing `go list -json` style streams.
#[derive(Debug, Default)]
pub struct MockLister {
    missing: HashMap<String, Vec<String>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the import paths `root` fails to find in the workspace.
    pub fn with_missing(mut self, root: &str, imports: &[&str]) -> Self {
        self.missing.insert(
            root.to_string(),
            imports.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Make listing `root` take at least `delay`.
    pub fn with_delay(mut self, root: &str, delay: Duration) -> Self {
        self.delays.insert(root.to_string(), delay);
        self
    }

    /// Roots listed so far.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl DepsLister for MockLister {
    fn list(&self, _gopath: &Path, root: &str) -> Result<Vec<u8>> {
        if let Some(delay) = self.delays.get(root) {
            std::thread::sleep(*delay);
        }
        lock(&self.calls).push(root.to_string());

        let missing = self.missing.get(root).cloned().unwrap_or_default();
        Ok(go_list_stream(root, &missing).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_http_client() {
        let client = MockHttpClient::new();
        client.mock_url(
            "https://example.com/file.tar.gz",
            MockHttpResponse::ok(b"tarball content"),
        );

        let body = client.get("https://example.com/file.tar.gz").unwrap();
        assert_eq!(body, b"tarball content");
        assert_eq!(client.request_count("https://example.com/file.tar.gz"), 1);
    }

    #[test]
    fn test_mock_http_longest_prefix_wins() {
        let client = MockHttpClient::new();
        client.mock_url("https://example.com/", MockHttpResponse::ok(b"short"));
        client.mock_url("https://example.com/api/", MockHttpResponse::ok(b"long"));

        assert_eq!(client.get("https://example.com/api/x").unwrap(), b"long");
        assert_eq!(client.get("https://example.com/other").unwrap(), b"short");
    }

    #[test]
    fn test_mock_http_status_maps_to_fetch_error() {
        let client = MockHttpClient::new();
        client.mock_url("https://example.com/gone", MockHttpResponse::not_found());

        let err = client.get("https://example.com/gone").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Fetch {
                failure: FetchFailure::Status(404),
                ..
            }
        ));
        assert!(client.get("https://unmocked.example/").is_err());
    }

    #[test]
    fn test_mock_cloner_marks_checkout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cloner = MockCloner::new().with_repo("https://github.com/foo/bar.git", "abc");
        let dest = tmp.path().join("src/github.com/foo/bar");

        let commit = cloner
            .clone_shallow("https://github.com/foo/bar.git", &dest)
            .unwrap();
        assert_eq!(commit, "abc");
        assert!(dest.join(".git").is_dir());
        assert_eq!(cloner.head(&dest).unwrap(), "abc");
        assert!(cloner.clone_shallow("https://unknown.example/x.git", &dest).is_err());
    }
}
