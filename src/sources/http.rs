//! HTTP fetching with timeouts and bounded retries.
//!
//! Every resolver reaches the network through [`HttpFetch`], so tests can
//! substitute a mock and the real client stays the only place that knows
//! about timeouts, retries and credentials.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use url::Url;

use crate::resolver::errors::{FetchFailure, ResolveError};

/// Header value asking servers for the raw bytes, not a negotiated variant.
pub const ACCEPT_BINARY: &str = "application/octet-stream";

/// A GET request with optional extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        FetchRequest {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Request the exact artifact bytes (defeats content negotiation).
    pub fn binary(url: impl Into<String>) -> Self {
        Self::new(url).header("Accept", ACCEPT_BINARY)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Something that can retrieve a full response body.
///
/// Implementations must return the complete body or an error; never partial
/// content.
pub trait HttpFetch: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ResolveError>;

    /// Fetch a URL with no extra headers.
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        self.fetch(&FetchRequest::new(url))
    }

    /// Fetch a URL and decode the body as UTF-8.
    fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        let body = self.get(url)?;
        String::from_utf8(body).map_err(|e| ResolveError::parse(url, e))
    }
}

/// Fetch and deserialize a JSON document.
pub fn fetch_json<T: DeserializeOwned>(
    http: &dyn HttpFetch,
    request: &FetchRequest,
) -> Result<T, ResolveError> {
    let body = http.fetch(request)?;
    serde_json::from_slice(&body).map_err(|e| ResolveError::parse(&request.url, e))
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry; doubles on each attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: crate::util::config::DEFAULT_RETRIES,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): 250ms, 500ms, 1s... capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub fn run<T>(
        &self,
        url: &str,
        mut op: impl FnMut() -> Result<T, FetchFailure>,
    ) -> Result<T, ResolveError> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(failure) if failure.is_retryable() && attempt < self.retries => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "Fetching {} failed ({}), retrying in {:?} ({}/{})",
                        url,
                        failure,
                        delay,
                        attempt + 1,
                        self.retries
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(failure) => {
                    return Err(ResolveError::Fetch {
                        url: url.to_string(),
                        failure,
                    })
                }
            }
        }
    }
}

/// Options for the real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    /// Bearer token for API rate limits
    pub token: Option<String>,
    /// Hosts that receive the token; every other host gets no credentials
    pub token_hosts: Vec<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            timeout: Duration::from_secs(crate::util::config::DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            user_agent: concat!("provender/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
            token_hosts: Vec::new(),
        }
    }
}

impl HttpOptions {
    /// Whether the bearer token may be sent to `url`.
    pub fn sends_token_to(&self, url: &str) -> bool {
        let host = match Url::parse(url) {
            Ok(url) => url.host_str().map(str::to_ascii_lowercase),
            Err(_) => None,
        };
        match host {
            Some(host) => self
                .token_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(&host)),
            None => false,
        }
    }
}

/// Blocking HTTP client used for real runs.
pub struct HttpClient {
    client: reqwest::blocking::Client,
    options: HttpOptions,
}

impl HttpClient {
    pub fn new(options: HttpOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;

        Ok(HttpClient { client, options })
    }

    fn attempt(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchFailure> {
        let mut builder = self.client.get(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = &self.options.token {
            if self.options.sends_token_to(&request.url) {
                builder = builder.bearer_auth(token);
            }
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response.bytes().map_err(classify)?;
        Ok(body.to_vec())
    }
}

impl HttpFetch for HttpClient {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ResolveError> {
        tracing::debug!("GET {}", request.url);
        self.options
            .retry
            .run(&request.url, || self.attempt(request))
    }
}

fn classify(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else if let Some(status) = err.status() {
        FetchFailure::Status(status.as_u16())
    } else {
        FetchFailure::Transport(err.to_string())
    }
}
