//! Source records - the unit of the manifest.
//!
//! A record says what to fetch, how to verify it, and where it lands in the
//! offline build tree. Records are immutable once built; the only ways to
//! get one are the typed constructors below or deserialization, and both
//! uphold the same invariants:
//!
//! - `file` and `archive` records carry a URL and exactly one digest
//! - `git` records carry a URL and a commit
//! - `script` records carry commands and no digest
//! - `dest` is a relative path that never escapes the build tree

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::fs::is_safe_relative;
use crate::util::hash::{is_hex, DigestAlgorithm};

/// What kind of source a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A single file placed verbatim
    File,
    /// An archive extracted into `dest`
    Archive,
    /// A git checkout at a fixed commit
    Git,
    /// Inline commands written out as an executable script
    Script,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::File => "file",
            SourceKind::Archive => "archive",
            SourceKind::Git => "git",
            SourceKind::Script => "script",
        };
        f.write_str(s)
    }
}

/// Where a record's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    Url(String),
    Git {
        url: String,
        tag: Option<String>,
        commit: String,
    },
    Inline {
        commands: Vec<String>,
    },
}

impl Origin {
    /// The origin URL, or an empty string for inline content.
    pub fn url(&self) -> &str {
        match self {
            Origin::Url(url) | Origin::Git { url, .. } => url,
            Origin::Inline { .. } => "",
        }
    }
}

/// A digest sealing the exact bytes of a fetched artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Integrity {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl Integrity {
    pub fn new(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Self {
        Integrity {
            algorithm,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    pub fn sha1(hex: impl Into<String>) -> Self {
        Self::new(DigestAlgorithm::Sha1, hex)
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Self::new(DigestAlgorithm::Sha256, hex)
    }

    pub fn sha512(hex: impl Into<String>) -> Self {
        Self::new(DigestAlgorithm::Sha512, hex)
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Placement inside the build tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Destination {
    /// Directory relative to the module's build root
    pub dir: Option<String>,
    /// Renamed filename
    pub filename: Option<String>,
}

/// A single manifest source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSource", into = "RawSource")]
pub struct SourceRecord {
    kind: SourceKind,
    origin: Origin,
    integrity: Option<Integrity>,
    destination: Destination,
    only_arches: Vec<String>,
}

impl SourceRecord {
    /// A single file fetched from `url`.
    pub fn file(url: impl Into<String>, integrity: Integrity) -> Self {
        Self::fetched(SourceKind::File, url.into(), integrity)
    }

    /// An archive fetched from `url` and extracted.
    pub fn archive(url: impl Into<String>, integrity: Integrity) -> Self {
        Self::fetched(SourceKind::Archive, url.into(), integrity)
    }

    fn fetched(kind: SourceKind, url: String, integrity: Integrity) -> Self {
        SourceRecord {
            kind,
            origin: Origin::Url(url),
            integrity: Some(integrity),
            destination: Destination::default(),
            only_arches: Vec::new(),
        }
    }

    /// A git checkout pinned to `commit`.
    pub fn git(url: impl Into<String>, tag: Option<String>, commit: impl Into<String>) -> Self {
        SourceRecord {
            kind: SourceKind::Git,
            origin: Origin::Git {
                url: url.into(),
                tag,
                commit: commit.into(),
            },
            integrity: None,
            destination: Destination::default(),
            only_arches: Vec::new(),
        }
    }

    /// An inline script.
    pub fn script(commands: Vec<String>) -> Self {
        SourceRecord {
            kind: SourceKind::Script,
            origin: Origin::Inline { commands },
            integrity: None,
            destination: Destination::default(),
            only_arches: Vec::new(),
        }
    }

    pub fn with_dest(mut self, dir: impl Into<String>) -> Self {
        self.destination.dir = Some(dir.into());
        self
    }

    pub fn with_dest_filename(mut self, filename: impl Into<String>) -> Self {
        self.destination.filename = Some(filename.into());
        self
    }

    pub fn with_only_arches(mut self, arches: Vec<String>) -> Self {
        self.only_arches = arches;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn url(&self) -> &str {
        self.origin.url()
    }

    pub fn integrity(&self) -> Option<&Integrity> {
        self.integrity.as_ref()
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn only_arches(&self) -> &[String] {
        &self.only_arches
    }

    /// Ordering key for expanded sources: origin URL, then placement.
    pub fn sort_key(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.origin.url(),
            self.destination.dir.as_deref(),
            self.destination.filename.as_deref(),
        )
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.kind, &self.origin) {
            (SourceKind::File | SourceKind::Archive, Origin::Url(url)) => {
                if url.is_empty() {
                    return Err(format!("{} source has an empty url", self.kind));
                }
                match &self.integrity {
                    Some(integrity) if !integrity.hex.is_empty() && is_hex(&integrity.hex) => {}
                    Some(integrity) => {
                        return Err(format!(
                            "{} source {} has a malformed {} digest",
                            self.kind, url, integrity.algorithm
                        ))
                    }
                    None => return Err(format!("{} source {} has no digest", self.kind, url)),
                }
            }
            (SourceKind::Git, Origin::Git { url, commit, .. }) => {
                if url.is_empty() || commit.is_empty() {
                    return Err("git source needs both a url and a commit".to_string());
                }
                if self.integrity.is_some() {
                    return Err(format!("git source {} cannot carry a digest", url));
                }
            }
            (SourceKind::Script, Origin::Inline { commands }) => {
                if commands.is_empty() {
                    return Err("script source has no commands".to_string());
                }
                if self.integrity.is_some() {
                    return Err("script source cannot carry a digest".to_string());
                }
            }
            (kind, _) => return Err(format!("{} source has a mismatched origin", kind)),
        }

        if let Some(dir) = &self.destination.dir {
            if !is_safe_relative(dir) {
                return Err(format!("dest `{}` must be a relative path inside the build", dir));
            }
        }
        if let Some(name) = &self.destination.filename {
            if name.is_empty() || name.contains('/') || name == ".." {
                return Err(format!("dest-filename `{}` must be a plain file name", name));
            }
        }

        Ok(())
    }
}

/// On-disk shape of a source, keyed the way flatpak-builder expects.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSource {
    #[serde(rename = "type")]
    kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    commit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    only_arches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dest_filename: Option<String>,
}

impl TryFrom<RawSource> for SourceRecord {
    type Error = String;

    fn try_from(raw: RawSource) -> Result<Self, Self::Error> {
        let digests: Vec<Integrity> = [
            (DigestAlgorithm::Sha512, raw.sha512),
            (DigestAlgorithm::Sha256, raw.sha256),
            (DigestAlgorithm::Sha1, raw.sha1),
        ]
        .into_iter()
        .filter_map(|(algorithm, hex)| hex.map(|hex| Integrity::new(algorithm, hex)))
        .collect();

        if digests.len() > 1 {
            return Err("a source carries exactly one of sha512, sha256, sha1".to_string());
        }
        let integrity = digests.into_iter().next();

        let origin = match raw.kind {
            SourceKind::File | SourceKind::Archive => {
                Origin::Url(raw.url.ok_or_else(|| format!("{} source is missing `url`", raw.kind))?)
            }
            SourceKind::Git => Origin::Git {
                url: raw.url.ok_or("git source is missing `url`")?,
                tag: raw.tag,
                commit: raw.commit.ok_or("git source is missing `commit`")?,
            },
            SourceKind::Script => Origin::Inline {
                commands: raw.commands,
            },
        };

        let record = SourceRecord {
            kind: raw.kind,
            origin,
            integrity,
            destination: Destination {
                dir: raw.dest,
                filename: raw.dest_filename,
            },
            only_arches: raw.only_arches,
        };
        record.validate()?;
        Ok(record)
    }
}

impl From<SourceRecord> for RawSource {
    fn from(record: SourceRecord) -> Self {
        let mut raw = RawSource {
            kind: record.kind,
            url: None,
            tag: None,
            commit: None,
            commands: Vec::new(),
            sha512: None,
            sha256: None,
            sha1: None,
            only_arches: record.only_arches,
            dest: record.destination.dir,
            dest_filename: record.destination.filename,
        };

        match record.origin {
            Origin::Url(url) => raw.url = Some(url),
            Origin::Git { url, tag, commit } => {
                raw.url = Some(url);
                raw.tag = tag;
                raw.commit = Some(commit);
            }
            Origin::Inline { commands } => raw.commands = commands,
        }

        if let Some(integrity) = record.integrity {
            let slot = match integrity.algorithm {
                DigestAlgorithm::Sha512 => &mut raw.sha512,
                DigestAlgorithm::Sha256 => &mut raw.sha256,
                DigestAlgorithm::Sha1 => &mut raw.sha1,
            };
            *slot = Some(integrity.hex);
        }

        raw
    }
}
