//! Python distributions from a PEP 503 "simple" package index.
//!
//! The digest is taken from the index entry's own URL fragment
//! (`#sha256=...`) so the manifest carries exactly what the index
//! advertises. Nothing is downloaded unless verification is on.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::package_key::PackageKey;
use crate::core::source_record::{Integrity, SourceRecord};
use crate::resolver::errors::ResolveError;
use crate::resolver::{Resolution, ResolveOptions};
use crate::sources::http::HttpFetch;
use crate::sources::seal::verify;
use crate::util::hash::{is_hex, DigestAlgorithm};

/// Default package index.
pub const DEFAULT_INDEX: &str = "https://pypi.org/simple";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("valid separator regex"));

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("valid anchor regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PypiRequest {
    /// Index base URL
    #[serde(default = "default_index")]
    pub index: String,
    pub packages: Vec<PypiPackage>,
    pub dest: Option<String>,
}

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

/// A concrete distribution file of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PypiPackage {
    pub name: String,
    /// Exact wheel or sdist filename
    pub filename: String,
}

/// PEP 503 name normalization.
pub fn normalize_name(name: &str) -> String {
    SEPARATORS.replace_all(name, "-").to_lowercase()
}

/// An anchor on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLink {
    pub href: String,
    pub text: String,
}

impl IndexLink {
    /// Filename the link points at: its text, or the last URL segment.
    fn matches(&self, filename: &str) -> bool {
        if self.text.trim() == filename {
            return true;
        }
        let path = self.href.split(['#', '?']).next().unwrap_or("");
        path.rsplit('/').next() == Some(filename)
    }
}

/// Extract every anchor from an index page.
pub fn parse_links(html: &str) -> Vec<IndexLink> {
    ANCHOR
        .captures_iter(html)
        .map(|caps| IndexLink {
            href: decode_entities(&caps[1]),
            text: decode_entities(&caps[2]),
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Split a `#<algo>=<hex>` digest fragment off an index URL.
pub fn split_digest(href: &str) -> Option<(&str, Integrity)> {
    let (url, fragment) = href.split_once('#')?;
    let (algo, hex) = fragment.split_once('=')?;
    let algorithm = DigestAlgorithm::from_name(algo)?;
    Some((url, Integrity::new(algorithm, hex)))
}

/// Resolve one distribution to a sealed `file` record.
pub fn resolve_package(
    http: &dyn HttpFetch,
    index: &str,
    package: &PypiPackage,
    verify_digest: bool,
) -> Result<SourceRecord, ResolveError> {
    let page_url = format!("{}/{}/", index.trim_end_matches('/'), normalize_name(&package.name));
    let html = http.get_text(&page_url)?;

    let link = parse_links(&html)
        .into_iter()
        .find(|link| link.matches(&package.filename))
        .ok_or_else(|| {
            ResolveError::parse(
                &page_url,
                format!("no file `{}` listed for package `{}`", package.filename, package.name),
            )
        })?;

    let (href, integrity) = split_digest(&link.href).ok_or_else(|| {
        ResolveError::parse(
            &page_url,
            format!("index entry for `{}` carries no digest fragment", package.filename),
        )
    })?;
    if integrity.hex.is_empty() || !is_hex(&integrity.hex) {
        return Err(ResolveError::parse(
            &page_url,
            format!(
                "index entry for `{}` has a malformed {} digest",
                package.filename, integrity.algorithm
            ),
        ));
    }

    // hrefs may be relative to the listing page
    let url = Url::parse(&page_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .map_err(|e| ResolveError::parse(&page_url, format!("bad link `{}`: {}", href, e)))?;

    if verify_digest {
        verify(http, &url, &integrity)?;
    }

    Ok(SourceRecord::file(url, integrity).with_dest_filename(package.filename.clone()))
}

pub fn resolve(
    http: &dyn HttpFetch,
    options: &ResolveOptions,
    req: &PypiRequest,
) -> Result<Resolution, ResolveError> {
    let resolved = req
        .packages
        .par_iter()
        .map(|package| {
            let record = resolve_package(http, &req.index, package, options.verify)?;
            Ok((PackageKey::new(normalize_name(&package.name), package.filename.clone()), record))
        })
        .collect::<Result<BTreeMap<_, _>, ResolveError>>()?;

    let records = resolved
        .into_values()
        .map(|record| match &req.dest {
            Some(dest) => record.with_dest(dest.clone()),
            None => record,
        })
        .collect();

    Ok(Resolution::many(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{simple_index_page, MockHttpClient, MockHttpResponse};
    use crate::util::hash::sha256_bytes;

    const WHEEL: &str = "setuptools-40.6.3-py2.py3-none-any.whl";

    fn index() -> MockHttpClient {
        let digest = sha256_bytes(b"wheel bytes");
        let http = MockHttpClient::new();
        http.mock_url(
            "https://pypi.org/simple/setuptools/",
            MockHttpResponse::ok(simple_index_page(&[
                (
                    "https://files.pythonhosted.org/packages/a/setuptools-40.6.2.zip#sha256=00",
                    "setuptools-40.6.2.zip",
                ),
                (
                    &format!(
                        "https://files.pythonhosted.org/packages/b/{}#sha256={}",
                        WHEEL, digest
                    ),
                    WHEEL,
                ),
            ])),
        );
        http
    }

    fn package(name: &str, filename: &str) -> PypiPackage {
        PypiPackage {
            name: name.to_string(),
            filename: filename.to_string(),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Foo.Bar__baz"), "foo-bar-baz");
        assert_eq!(normalize_name("setuptools"), "setuptools");
    }

    #[test]
    fn test_digest_comes_from_index() {
        let http = index();
        let record = resolve_package(&http, DEFAULT_INDEX, &package("SetupTools", WHEEL), false)
            .unwrap();

        assert_eq!(
            record.url(),
            format!("https://files.pythonhosted.org/packages/b/{}", WHEEL)
        );
        assert_eq!(
            record.integrity(),
            Some(&Integrity::sha256(sha256_bytes(b"wheel bytes")))
        );
        // only the listing was fetched
        assert_eq!(http.requests(), vec!["https://pypi.org/simple/setuptools/"]);
    }

    #[test]
    fn test_missing_filename() {
        let http = index();
        let err = resolve_package(
            &http,
            DEFAULT_INDEX,
            &package("setuptools", "setuptools-99.0.0.tar.gz"),
            false,
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("setuptools-99.0.0.tar.gz"));
        assert!(msg.contains("`setuptools`"));
    }

    #[test]
    fn test_missing_fragment() {
        let http = MockHttpClient::new();
        http.mock_url(
            "https://pypi.org/simple/six/",
            MockHttpResponse::ok(simple_index_page(&[(
                "../../packages/six-1.12.0.tar.gz",
                "six-1.12.0.tar.gz",
            )])),
        );

        let err = resolve_package(&http, DEFAULT_INDEX, &package("six", "six-1.12.0.tar.gz"), false)
            .unwrap_err();
        assert!(err.to_string().contains("no digest fragment"));
    }

    #[test]
    fn test_malformed_fragment_digest() {
        for href in [
            "https://files.example/six-1.12.0.tar.gz#sha256=not-a-digest",
            "https://files.example/six-1.12.0.tar.gz#sha256=",
        ] {
            let http = MockHttpClient::new();
            http.mock_url(
                "https://pypi.org/simple/six/",
                MockHttpResponse::ok(simple_index_page(&[(href, "six-1.12.0.tar.gz")])),
            );

            let err = resolve_package(&http, DEFAULT_INDEX, &package("six", "six-1.12.0.tar.gz"), false)
                .unwrap_err();
            assert!(matches!(err, ResolveError::Parse { .. }));
            assert!(err.to_string().contains("malformed sha256 digest"), "{}", err);
        }
    }

    #[test]
    fn test_relative_href_is_joined() {
        let http = MockHttpClient::new();
        http.mock_url(
            "https://mirror.example/simple/six/",
            MockHttpResponse::ok(simple_index_page(&[(
                "../../packages/six-1.12.0.tar.gz#sha256=abcd",
                "six-1.12.0.tar.gz",
            )])),
        );

        let record = resolve_package(
            &http,
            "https://mirror.example/simple/",
            &package("six", "six-1.12.0.tar.gz"),
            false,
        )
        .unwrap();
        assert_eq!(record.url(), "https://mirror.example/packages/six-1.12.0.tar.gz");
    }

    #[test]
    fn test_verify_mismatch() {
        let http = index();
        http.mock_url(
            &format!("https://files.pythonhosted.org/packages/b/{}", WHEEL),
            MockHttpResponse::ok(b"tampered"),
        );

        let err = resolve_package(&http, DEFAULT_INDEX, &package("setuptools", WHEEL), true)
            .unwrap_err();
        assert!(matches!(err, ResolveError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_resolve_applies_dest() {
        let http = index();
        let options = ResolveOptions {
            source_root: std::path::PathBuf::from("."),
            verify: false,
        };
        let req = PypiRequest {
            index: DEFAULT_INDEX.to_string(),
            packages: vec![package("setuptools", WHEEL)],
            dest: Some("pip".to_string()),
        };

        let resolution = resolve(&http, &options, &req).unwrap();
        assert_eq!(resolution.records[0].destination().dir.as_deref(), Some("pip"));
        assert_eq!(resolution.records[0].destination().filename.as_deref(), Some(WHEEL));
    }
}
