//! Archive version selection from a checksum feed.
//!
//! Upstreams like ImageMagick publish many release archives next to one
//! digest list. Every listed `<prefix>-M.m.p[-b].<ext>` is a candidate; the
//! newest wins, and among archives of the same version the preferred
//! extension wins.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::source_record::{Integrity, SourceRecord};
use crate::resolver::checksums::parse_checksum_list;
use crate::resolver::errors::ResolveError;
use crate::resolver::{Resolution, ResolveOptions};
use crate::sources::http::HttpFetch;
use crate::sources::seal::verify;

/// Extension preference, most preferred first.
pub const DEFAULT_EXTENSIONS: &[&str] = &["tar.xz", "tar.bz2", "tar.gz", "zip"];

/// A parsed candidate archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub filename: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: Option<u64>,
    pub extension: String,
    /// Higher is preferred
    pub extension_rank: usize,
    pub integrity: Integrity,
}

impl Candidate {
    /// Total ranking key; filenames are unique so no two candidates tie.
    fn key(&self) -> (u64, u64, u64, Option<u64>, usize, &str) {
        (
            self.major,
            self.minor,
            self.patch,
            self.build,
            self.extension_rank,
            &self.filename,
        )
    }

    /// `M.m.p` or `M.m.p-b`.
    pub fn version(&self) -> String {
        match self.build {
            Some(build) => format!("{}.{}.{}-{}", self.major, self.minor, self.patch, build),
            None => format!("{}.{}.{}", self.major, self.minor, self.patch),
        }
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parses candidate filenames for one prefix.
pub struct Selector {
    pattern: Regex,
    extensions: Vec<String>,
}

impl Selector {
    pub fn new(prefix: &str, extensions: &[String]) -> Result<Self, ResolveError> {
        let pattern = Regex::new(&format!(
            r"^{}-(\d+)\.(\d+)\.(\d+)(?:-(\d+))?\.(.+)$",
            regex::escape(prefix)
        ))
        .map_err(|e| ResolveError::parse(format!("archive prefix `{}`", prefix), e))?;

        Ok(Selector {
            pattern,
            extensions: extensions.to_vec(),
        })
    }

    /// Parse a filename; `None` when it is not a candidate.
    pub fn candidate(&self, filename: &str, integrity: Integrity) -> Option<Candidate> {
        let caps = self.pattern.captures(filename)?;
        let extension = caps.get(5)?.as_str();
        let position = self.extensions.iter().position(|e| e == extension)?;

        Some(Candidate {
            filename: filename.to_string(),
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
            build: match caps.get(4) {
                Some(m) => Some(m.as_str().parse().ok()?),
                None => None,
            },
            extension: extension.to_string(),
            extension_rank: self.extensions.len() - position,
            integrity,
        })
    }

    /// The newest candidate among `(filename, digest)` pairs.
    pub fn select<I>(&self, entries: I) -> Option<Candidate>
    where
        I: IntoIterator<Item = (String, Integrity)>,
    {
        entries
            .into_iter()
            .filter_map(|(name, integrity)| self.candidate(&name, integrity))
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArchiveFeedRequest {
    /// Checksum list of all releases
    pub feed_url: String,
    /// Directory the archives live in (defaults to the feed's directory)
    pub base_url: Option<String>,
    /// Filename prefix, e.g. `ImageMagick`
    pub prefix: String,
    /// Extension preference, most preferred first
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    pub dest: Option<String>,
    pub dest_filename: Option<String>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

impl ArchiveFeedRequest {
    fn base_url(&self) -> &str {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/'),
            None => self
                .feed_url
                .rsplit_once('/')
                .map(|(dir, _)| dir)
                .unwrap_or(&self.feed_url),
        }
    }
}

/// Note key under which the selected version is recorded.
pub fn note_key(prefix: &str) -> String {
    format!("archive-feed:{}", prefix)
}

pub fn resolve(
    http: &dyn HttpFetch,
    options: &ResolveOptions,
    req: &ArchiveFeedRequest,
) -> Result<Resolution, ResolveError> {
    let selector = Selector::new(&req.prefix, &req.extensions)?;
    let feed = http.get_text(&req.feed_url)?;
    let entries = parse_checksum_list(&feed, &req.feed_url)?;

    let selected = selector
        .select(entries.into_iter().map(|e| (e.file_name().to_string(), e.integrity)))
        .ok_or_else(|| {
            ResolveError::parse(
                &req.feed_url,
                format!("no `{}` release archives listed", req.prefix),
            )
        })?;

    let url = format!("{}/{}", req.base_url(), selected.filename);
    tracing::info!("Selected {} {}", req.prefix, selected.version());

    if options.verify {
        verify(http, &url, &selected.integrity)?;
    }

    let mut record = SourceRecord::archive(url, selected.integrity.clone());
    if let Some(dest) = &req.dest {
        record = record.with_dest(dest.clone());
    }
    if let Some(name) = &req.dest_filename {
        record = record.with_dest_filename(name.clone());
    }

    Ok(Resolution::single(record).with_note(note_key(&req.prefix), selected.version()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockHttpClient, MockHttpResponse};
    use crate::util::hash::sha256_bytes;

    fn selector() -> Selector {
        Selector::new("ImageMagick", &default_extensions()).unwrap()
    }

    fn entry(name: &str) -> (String, Integrity) {
        (name.to_string(), Integrity::sha256(sha256_bytes(name.as_bytes())))
    }

    #[test]
    fn test_numeric_version_beats_extension() {
        let selected = selector()
            .select(vec![
                entry("ImageMagick-7.0.7-28.tar.xz"),
                entry("ImageMagick-7.0.8-1.tar.gz"),
            ])
            .unwrap();
        assert_eq!(selected.filename, "ImageMagick-7.0.8-1.tar.gz");
        assert_eq!(selected.version(), "7.0.8-1");
    }

    #[test]
    fn test_extension_breaks_version_ties() {
        let selected = selector()
            .select(vec![
                entry("ImageMagick-7.0.8-1.tar.gz"),
                entry("ImageMagick-7.0.8-1.tar.xz"),
                entry("ImageMagick-7.0.8-1.zip"),
            ])
            .unwrap();
        assert_eq!(selected.extension, "tar.xz");
    }

    #[test]
    fn test_numeric_fields_compare_as_numbers() {
        let selected = selector()
            .select(vec![
                entry("ImageMagick-7.0.8-9.tar.xz"),
                entry("ImageMagick-7.0.8-10.tar.xz"),
            ])
            .unwrap();
        assert_eq!(selected.filename, "ImageMagick-7.0.8-10.tar.xz");
    }

    #[test]
    fn test_non_candidates_are_ignored() {
        let s = selector();
        assert!(s.candidate("ImageMagick-7.0.8-1.tar.xz.asc", Integrity::sha256("00")).is_none());
        assert!(s.candidate("ImageMagick-6.9.tar.xz", Integrity::sha256("00")).is_none());
        assert!(s.candidate("GraphicsMagick-1.3.30.tar.xz", Integrity::sha256("00")).is_none());
        assert!(s.select(Vec::new()).is_none());
    }

    #[test]
    fn test_ranking_is_transitive() {
        let s = selector();
        let names = [
            "ImageMagick-6.9.10-14.tar.xz",
            "ImageMagick-7.0.7-28.tar.xz",
            "ImageMagick-7.0.7-28.tar.gz",
            "ImageMagick-7.0.8-1.tar.gz",
            "ImageMagick-7.0.8-1.zip",
            "ImageMagick-7.0.8.tar.bz2",
            "ImageMagick-7.1.0-0.tar.xz",
        ];
        let candidates: Vec<Candidate> = names
            .iter()
            .map(|n| s.candidate(n, Integrity::sha256("00")).unwrap())
            .collect();

        for a in &candidates {
            for b in &candidates {
                for c in &candidates {
                    if a > b && b > c {
                        assert!(a > c, "{} > {} > {}", a.filename, b.filename, c.filename);
                    }
                }
                if a.filename != b.filename {
                    assert_ne!(a.cmp(b), Ordering::Equal);
                }
            }
        }
    }

    #[test]
    fn test_resolve_from_feed() {
        let http = MockHttpClient::new();
        let digest = sha256_bytes(b"im");
        http.mock_url(
            "https://www.imagemagick.org/download/releases/SHA256SUMS",
            MockHttpResponse::ok(format!(
                "{}  ImageMagick-7.0.8-1.tar.xz\n{}  ImageMagick-7.0.7-28.tar.xz\n",
                digest,
                sha256_bytes(b"old")
            )),
        );

        let req = ArchiveFeedRequest {
            feed_url: "https://www.imagemagick.org/download/releases/SHA256SUMS".to_string(),
            base_url: None,
            prefix: "ImageMagick".to_string(),
            extensions: default_extensions(),
            dest: None,
            dest_filename: None,
        };
        let options = ResolveOptions {
            source_root: std::path::PathBuf::from("."),
            verify: false,
        };

        let resolution = resolve(&http, &options, &req).unwrap();
        let record = &resolution.records[0];
        assert_eq!(
            record.url(),
            "https://www.imagemagick.org/download/releases/ImageMagick-7.0.8-1.tar.xz"
        );
        assert_eq!(record.integrity(), Some(&Integrity::sha256(digest)));
        assert_eq!(resolution.notes.get("archive-feed:ImageMagick"), Some("7.0.8-1"));
    }

    #[test]
    fn test_empty_feed_is_parse_error() {
        let http = MockHttpClient::new();
        http.mock_url("https://example.test/SUMS", MockHttpResponse::ok(""));
        let req = ArchiveFeedRequest {
            feed_url: "https://example.test/SUMS".to_string(),
            base_url: None,
            prefix: "ImageMagick".to_string(),
            extensions: default_extensions(),
            dest: None,
            dest_filename: None,
        };
        let options = ResolveOptions {
            source_root: std::path::PathBuf::from("."),
            verify: false,
        };

        let err = resolve(&http, &options, &req).unwrap_err();
        assert!(matches!(err, ResolveError::Parse { .. }));
    }
}
