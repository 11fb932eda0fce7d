//! Checksum lists (`SHASUMS256.txt`, `sha256sum` output, BSD `shasum`).
//!
//! Used directly for release artifacts published next to a checksum file
//! (Electron, Node.js headers) and as the feed format of the archive
//! version selector.

use serde::{Deserialize, Serialize};

use crate::core::source_record::{Integrity, SourceRecord};
use crate::resolver::errors::ResolveError;
use crate::resolver::{Resolution, ResolveOptions};
use crate::sources::http::HttpFetch;
use crate::sources::seal::verify;
use crate::util::hash::{is_hex, DigestAlgorithm};

/// Default list name.
pub const DEFAULT_LIST: &str = "SHASUMS256.txt";

/// One line of a checksum list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Filename (or relative path) as listed
    pub name: String,
    pub integrity: Integrity,
}

impl ChecksumEntry {
    /// Final path segment of the listed name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Parse a checksum list. `what` names the list in errors.
///
/// Accepts GNU lines (`<hex>  <name>`, `<hex> *<name>`) with the algorithm
/// inferred from the digest length, and BSD lines (`SHA256 (<name>) = <hex>`).
pub fn parse_checksum_list(text: &str, what: &str) -> Result<Vec<ChecksumEntry>, ResolveError> {
    let mut entries = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let entry = parse_bsd(line)
            .or_else(|| parse_gnu(line))
            .ok_or_else(|| ResolveError::parse(what, format!("line {}: unrecognized checksum line `{}`", idx + 1, line)))?;
        entries.push(entry);
    }

    Ok(entries)
}

fn parse_gnu(line: &str) -> Option<ChecksumEntry> {
    let (hex, rest) = line.split_once(char::is_whitespace)?;
    let algorithm = DigestAlgorithm::from_hex_len(hex.len())?;
    if !is_hex(hex) {
        return None;
    }

    let name = rest.trim_start();
    let name = name.strip_prefix('*').unwrap_or(name);
    let name = name.strip_prefix("./").unwrap_or(name);
    if name.is_empty() {
        return None;
    }

    Some(ChecksumEntry {
        name: name.to_string(),
        integrity: Integrity::new(algorithm, hex),
    })
}

fn parse_bsd(line: &str) -> Option<ChecksumEntry> {
    let (algo, rest) = line.split_once(" (")?;
    let algorithm = DigestAlgorithm::from_name(algo.trim())?;
    let (name, hex) = rest.rsplit_once(") = ")?;
    let hex = hex.trim();
    if !is_hex(hex) || hex.is_empty() {
        return None;
    }

    Some(ChecksumEntry {
        name: name.to_string(),
        integrity: Integrity::new(algorithm, hex),
    })
}

/// Look up a file by its listed name or final path segment.
pub fn find<'a>(entries: &'a [ChecksumEntry], name: &str) -> Option<&'a ChecksumEntry> {
    entries
        .iter()
        .find(|e| e.name == name)
        .or_else(|| entries.iter().find(|e| e.file_name() == name))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChecksumsRequest {
    /// Directory URL the files and the list live under
    pub base_url: String,
    #[serde(default = "default_list")]
    pub list: String,
    pub files: Vec<ChecksumFile>,
    pub dest: Option<String>,
}

fn default_list() -> String {
    DEFAULT_LIST.to_string()
}

/// A file to pick out of the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChecksumFile {
    pub name: String,
    #[serde(default)]
    pub only_arches: Vec<String>,
    pub dest_filename: Option<String>,
}

pub fn resolve(
    http: &dyn HttpFetch,
    options: &ResolveOptions,
    req: &ChecksumsRequest,
) -> Result<Resolution, ResolveError> {
    let base = req.base_url.trim_end_matches('/');
    let list_url = format!("{}/{}", base, req.list);
    let entries = parse_checksum_list(&http.get_text(&list_url)?, &list_url)?;

    let mut records = Vec::with_capacity(req.files.len());
    for file in &req.files {
        let entry = find(&entries, &file.name).ok_or_else(|| {
            ResolveError::parse(&list_url, format!("`{}` is not listed", file.name))
        })?;

        let url = format!("{}/{}", base, entry.name);
        if options.verify {
            verify(http, &url, &entry.integrity)?;
        }

        let filename = file
            .dest_filename
            .clone()
            .unwrap_or_else(|| entry.file_name().to_string());
        let mut record = SourceRecord::file(url, entry.integrity.clone())
            .with_dest_filename(filename)
            .with_only_arches(file.only_arches.clone());
        if let Some(dest) = &req.dest {
            record = record.with_dest(dest.clone());
        }
        records.push(record);
    }

    Ok(Resolution::many(records))
}
