//! Fetch-and-seal: hash the exact bytes of a remote artifact.

use crate::core::source_record::Integrity;
use crate::resolver::errors::ResolveError;
use crate::sources::http::{FetchRequest, HttpFetch};
use crate::util::hash::DigestAlgorithm;

/// A URL together with the digest of its fetched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub url: String,
    pub integrity: Integrity,
}

/// Fetch `url` and digest the full body with `algorithm`.
pub fn seal(
    http: &dyn HttpFetch,
    url: &str,
    algorithm: DigestAlgorithm,
) -> Result<Sealed, ResolveError> {
    tracing::debug!("Sealing {} with {}", url, algorithm);

    let body = http.fetch(&FetchRequest::binary(url))?;
    Ok(Sealed {
        url: url.to_string(),
        integrity: Integrity::new(algorithm, algorithm.digest(&body)),
    })
}

/// Re-fetch `url` and check the body against a digest supplied by upstream
/// metadata.
pub fn verify(http: &dyn HttpFetch, url: &str, expected: &Integrity) -> Result<(), ResolveError> {
    let actual = seal(http, url, expected.algorithm)?.integrity;
    if !actual.hex.eq_ignore_ascii_case(&expected.hex) {
        return Err(ResolveError::IntegrityMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::errors::FetchFailure;
    use crate::test_support::{MockHttpClient, MockHttpResponse};
    use crate::util::hash::sha256_bytes;

    #[test]
    fn test_seal_hashes_fetched_bytes() {
        let http = MockHttpClient::new();
        http.mock_url(
            "https://registry.example/left-pad-1.3.0.tgz",
            MockHttpResponse::ok(b"tarball"),
        );

        let sealed = seal(
            &http,
            "https://registry.example/left-pad-1.3.0.tgz",
            DigestAlgorithm::Sha512,
        )
        .unwrap();

        assert_eq!(sealed.integrity.algorithm, DigestAlgorithm::Sha512);
        assert_eq!(sealed.integrity.hex, DigestAlgorithm::Sha512.digest(b"tarball"));
        assert_eq!(http.requests().len(), 1);
    }

    #[test]
    fn test_seal_propagates_http_errors() {
        let http = MockHttpClient::new();
        http.mock_url("https://registry.example/gone.tgz", MockHttpResponse::not_found());

        let err = seal(&http, "https://registry.example/gone.tgz", DigestAlgorithm::Sha512)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch { .. }));

        http.mock_url(
            "https://registry.example/flaky.tgz",
            MockHttpResponse::server_error("bad gateway"),
        );
        let err = seal(&http, "https://registry.example/flaky.tgz", DigestAlgorithm::Sha1)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Fetch {
                failure: FetchFailure::Status(500),
                ..
            }
        ));
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let http = MockHttpClient::new();
        http.mock_url("https://files.example/a.whl", MockHttpResponse::ok(b"wheel"));

        let good = Integrity::new(DigestAlgorithm::Sha256, sha256_bytes(b"wheel"));
        verify(&http, "https://files.example/a.whl", &good).unwrap();

        let bad = Integrity::new(DigestAlgorithm::Sha256, sha256_bytes(b"tampered"));
        let err = verify(&http, "https://files.example/a.whl", &bad).unwrap_err();
        assert!(matches!(err, ResolveError::IntegrityMismatch { .. }));
    }
}
