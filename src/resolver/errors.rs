//! Resolution error types and diagnostics.

use std::fmt;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Non-2xx HTTP status
    Status(u16),
    /// The request exceeded its timeout
    Timeout,
    /// Connection reset, DNS failure, TLS error, truncated body...
    Transport(String),
}

impl FetchFailure {
    /// Timeouts, transport failures and 5xx are transient; 4xx is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailure::Status(code) => *code >= 500,
            FetchFailure::Timeout | FetchFailure::Transport(_) => true,
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "HTTP {}", code),
            FetchFailure::Timeout => write!(f, "request timed out"),
            FetchFailure::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

/// Error during source resolution.
///
/// Every variant aborts the run; there is no degraded manifest.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch {url}: {failure}")]
    Fetch { url: String, failure: FetchFailure },

    #[error("tag `{tag}` not found in {repo}")]
    TagNotFound { repo: String, tag: String },

    #[error("import path `{import_path}` uses unsupported VCS `{vcs}` (only git is supported)")]
    UnsupportedVcs { import_path: String, vcs: String },

    #[error("integrity mismatch for {url}: expected {expected}, fetched bytes hash to {actual}")]
    IntegrityMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}

impl ResolveError {
    /// Shorthand for a parse error.
    pub fn parse(what: impl Into<String>, message: impl fmt::Display) -> Self {
        ResolveError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Fetch { failure, .. } if failure.is_retryable())
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::Fetch { url, failure } => {
                let mut diag = Diagnostic::error(format!("failed to fetch {}", url))
                    .with_context(format!("cause: {}", failure));

                diag = match failure {
                    FetchFailure::Status(401) | FetchFailure::Status(403) => {
                        diag.with_suggestion(suggestions::SET_TOKEN)
                    }
                    FetchFailure::Status(404) => diag.with_suggestion(
                        "The upstream artifact no longer exists; update the pinned version",
                    ),
                    _ => diag.with_suggestion(suggestions::FETCH_FAILED),
                };
                diag
            }

            ResolveError::TagNotFound { repo, tag } => {
                Diagnostic::error(format!("tag `{}` not found", tag))
                    .with_context(format!("repository: {}", repo))
                    .with_suggestion("Check the tag name in provender.toml")
                    .with_suggestion("Tags are never replaced by the default branch")
            }

            ResolveError::UnsupportedVcs { import_path, vcs } => Diagnostic::error(format!(
                "`{}` is hosted in {}, which cannot be vendored",
                import_path, vcs
            ))
            .with_suggestion("Only git repositories can be recorded as git sources"),

            ResolveError::IntegrityMismatch {
                url,
                expected,
                actual,
            } => Diagnostic::error(format!("integrity mismatch for {}", url))
                .with_context(format!("expected: {}", expected))
                .with_context(format!("actual:   {}", actual))
                .with_suggestion(suggestions::INTEGRITY),

            ResolveError::Parse { what, message } => {
                Diagnostic::error(format!("failed to parse {}", what)).with_context(message.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(FetchFailure::Timeout.is_retryable());
        assert!(FetchFailure::Transport("connection reset".into()).is_retryable());
        assert!(FetchFailure::Status(503).is_retryable());
        assert!(!FetchFailure::Status(404).is_retryable());
        assert!(!FetchFailure::Status(429).is_retryable());
    }

    #[test]
    fn test_integrity_diagnostic() {
        let err = ResolveError::IntegrityMismatch {
            url: "https://files.example/pkg.whl".to_string(),
            expected: "sha256:aaaa".to_string(),
            actual: "sha256:bbbb".to_string(),
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("integrity mismatch for https://files.example/pkg.whl"));
        assert!(output.contains("expected: sha256:aaaa"));
        assert!(output.contains("actual:   sha256:bbbb"));
    }

    #[test]
    fn test_forbidden_suggests_token() {
        let err = ResolveError::Fetch {
            url: "https://api.github.com/repos/a/b/releases/latest".to_string(),
            failure: FetchFailure::Status(403),
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("PROVENDER_TOKEN"));
        assert!(!err.is_retryable());
    }
}
