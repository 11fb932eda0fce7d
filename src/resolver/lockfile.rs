//! Yarn v1 lockfile flattening.
//!
//! A lockfile maps specifier lists (`name@range, name@range2`) to one
//! pinned `{version, resolved}` entry. Flattening turns every entry into a
//! `file` source keyed by `(name, version)`:
//!
//! - a `#<sha1>` fragment on `resolved` is recorded as-is, no fetch
//! - otherwise the tarball is fetched and sealed with sha512
//!
//! Entries that collapse onto the same key keep the later one.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::core::package_key::PackageKey;
use crate::core::source_record::{Integrity, SourceRecord};
use crate::resolver::errors::ResolveError;
use crate::sources::http::HttpFetch;
use crate::sources::seal::{seal, verify};
use crate::util::hash::{is_hex, DigestAlgorithm};

/// Default directory tarballs are mirrored into.
pub const DEFAULT_MIRROR_DIR: &str = "yarn-mirror";

/// One lockfile entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// Every `name@range` the entry satisfies
    pub specifiers: Vec<String>,
    pub version: String,
    pub resolved: String,
    /// `integrity` field (SRI), informational only
    pub integrity: Option<String>,
    /// 1-based line of the entry header
    pub line: usize,
}

/// Options for [`flatten`].
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Directory the tarballs land in
    pub dest: String,
    /// Re-fetch fragment-sealed tarballs and compare digests
    pub verify: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        FlattenOptions {
            dest: DEFAULT_MIRROR_DIR.to_string(),
            verify: false,
        }
    }
}

/// Parse yarn v1 lockfile text. `what` names the file in errors.
pub fn parse(content: &str, what: &str) -> Result<Vec<LockEntry>, ResolveError> {
    let mut entries = Vec::new();
    let mut current: Option<PartialEntry> = None;

    for (idx, raw_line) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw_line.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indent = line.len() - trimmed.len();
        let err = |message: String| ResolveError::parse(what, format!("line {}: {}", lineno, message));

        if indent == 0 {
            if let Some(done) = current.take() {
                entries.push(done.finish(what)?);
            }
            let header = trimmed
                .strip_suffix(':')
                .ok_or_else(|| err(format!("expected an entry header, found `{}`", trimmed)))?;
            let specifiers = split_specifiers(header);
            if specifiers.is_empty() {
                return Err(err("entry header names no packages".to_string()));
            }
            current = Some(PartialEntry {
                specifiers,
                line: lineno,
                ..PartialEntry::default()
            });
            continue;
        }

        let entry = current
            .as_mut()
            .ok_or_else(|| err("indented field outside of an entry".to_string()))?;

        // Nested blocks (`dependencies:`, `optionalDependencies:`) and their
        // contents are irrelevant for mirroring.
        if indent > 2 || trimmed.ends_with(':') {
            continue;
        }

        let (key, value) = match trimmed.split_once(char::is_whitespace) {
            Some((key, value)) => (key, unquote(value.trim())),
            None => return Err(err(format!("field `{}` has no value", trimmed))),
        };
        match key {
            "version" => entry.version = Some(value.to_string()),
            "resolved" => entry.resolved = Some(value.to_string()),
            "integrity" => entry.integrity = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(done) = current.take() {
        entries.push(done.finish(what)?);
    }

    Ok(entries)
}

#[derive(Debug, Default)]
struct PartialEntry {
    specifiers: Vec<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    line: usize,
}

impl PartialEntry {
    fn finish(self, what: &str) -> Result<LockEntry, ResolveError> {
        let name = self.specifiers.join(", ");
        let version = self.version.ok_or_else(|| {
            ResolveError::parse(what, format!("line {}: entry `{}` has no version", self.line, name))
        })?;
        let resolved = self.resolved.ok_or_else(|| {
            ResolveError::parse(what, format!("line {}: entry `{}` has no resolved URL", self.line, name))
        })?;

        Ok(LockEntry {
            specifiers: self.specifiers,
            version,
            resolved,
            integrity: self.integrity,
            line: self.line,
        })
    }
}

fn split_specifiers(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(|s| unquote(s.trim()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Bare package name of a specifier: everything before the last `@` that
/// is not the leading scope marker.
pub fn package_name(specifier: &str) -> &str {
    match specifier.rfind('@') {
        Some(idx) if idx > 0 => &specifier[..idx],
        _ => specifier,
    }
}

/// Split a resolved URL at its `#` fragment.
pub fn split_fragment(resolved: &str) -> (&str, Option<&str>) {
    match resolved.split_once('#') {
        Some((url, fragment)) if !fragment.is_empty() => (url, Some(fragment)),
        Some((url, _)) => (url, None),
        None => (resolved, None),
    }
}

/// Filename a tarball is mirrored under.
///
/// The URL's last segment when it is a usable unscoped `.tgz` name, else
/// `<name with / replaced by ->-<version>.tgz`.
pub fn mirror_filename(key: &PackageKey, url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or("");

    if !last.is_empty() && last.ends_with(".tgz") && !key.is_scoped() {
        last.to_string()
    } else {
        format!("{}-{}.tgz", key.name.replace('/', "-"), key.version)
    }
}

/// Flatten parsed entries into sealed sources.
///
/// Tarballs without a fragment are fetched on the rayon pool; the first
/// failure aborts.
pub fn flatten(
    http: &dyn HttpFetch,
    entries: &[LockEntry],
    options: &FlattenOptions,
) -> Result<BTreeMap<PackageKey, SourceRecord>, ResolveError> {
    let mut jobs: BTreeMap<PackageKey, &str> = BTreeMap::new();
    for entry in entries {
        for specifier in &entry.specifiers {
            let key = PackageKey::new(package_name(specifier), entry.version.as_str());
            jobs.insert(key, entry.resolved.as_str());
        }
    }

    let records = jobs
        .into_par_iter()
        .map(|(key, resolved)| {
            let record = flatten_one(http, &key, resolved, options)?;
            Ok((key, record))
        })
        .collect::<Result<Vec<_>, ResolveError>>()?;

    Ok(records.into_iter().collect())
}

fn flatten_one(
    http: &dyn HttpFetch,
    key: &PackageKey,
    resolved: &str,
    options: &FlattenOptions,
) -> Result<SourceRecord, ResolveError> {
    let (url, fragment) = split_fragment(resolved);

    let record = match fragment {
        Some(hex) => {
            if !is_hex(hex) {
                return Err(ResolveError::parse(
                    format!("lockfile entry {}", key),
                    format!("fragment `{}` is not a hex digest", hex),
                ));
            }
            let integrity = Integrity::sha1(hex);
            if options.verify {
                verify(http, url, &integrity)?;
            }
            SourceRecord::file(url, integrity)
        }
        None => {
            tracing::debug!("Sealing {} (no fragment in lockfile)", key);
            let sealed = seal(http, url, DigestAlgorithm::Sha512)?;
            SourceRecord::file(sealed.url, sealed.integrity)
        }
    };

    Ok(record
        .with_dest(options.dest.clone())
        .with_dest_filename(mirror_filename(key, url)))
}
