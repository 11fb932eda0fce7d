//! Extensions named in a declaration file of the source tree.
//!
//! The file is a JSON array of `{name, version}` objects (extra fields are
//! ignored). Each entry expands a URL template and is sealed by fetching.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::package_key::PackageKey;
use crate::core::source_record::SourceRecord;
use crate::resolver::errors::ResolveError;
use crate::resolver::{Resolution, ResolveOptions};
use crate::sources::http::HttpFetch;
use crate::sources::seal::seal;
use crate::util::fs::read_to_string;
use crate::util::hash::DigestAlgorithm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeclaredRequest {
    /// Declaration file, relative to the source root
    pub path: String,
    /// Download URL with `{name}`, `{version}`, `{publisher}`, `{package}`
    pub url_template: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_dest")]
    pub dest: String,
}

fn default_extension() -> String {
    "vsix".to_string()
}

fn default_dest() -> String {
    "extensions".to_string()
}

/// One declared extension.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Declared {
    pub name: String,
    pub version: String,
}

/// Parse a declaration file.
pub fn parse_declarations(content: &str, what: &str) -> Result<Vec<Declared>, ResolveError> {
    serde_json::from_str(content).map_err(|e| ResolveError::parse(what, e))
}

/// Expand a URL template for one declaration.
///
/// `{publisher}` and `{package}` split `name` at its first `.`.
pub fn expand_template(template: &str, declared: &Declared) -> Result<String, ResolveError> {
    let split = declared.name.split_once('.');
    let needs_split = template.contains("{publisher}") || template.contains("{package}");

    let (publisher, package) = match split {
        Some(parts) => parts,
        None if needs_split => {
            return Err(ResolveError::parse(
                format!("extension `{}`", declared.name),
                "name is not of the form `publisher.package`",
            ))
        }
        None => ("", declared.name.as_str()),
    };

    Ok(template
        .replace("{name}", &declared.name)
        .replace("{version}", &declared.version)
        .replace("{publisher}", publisher)
        .replace("{package}", package))
}

pub fn resolve(http: &dyn HttpFetch, options: &ResolveOptions, req: &DeclaredRequest) -> Result<Resolution> {
    let path = options.source_root.join(&req.path);
    let content = read_to_string(&path)?;
    let declared = parse_declarations(&content, &req.path)?;

    let mut unique: BTreeMap<PackageKey, &Declared> = BTreeMap::new();
    for entry in &declared {
        unique.insert(PackageKey::new(entry.name.as_str(), entry.version.as_str()), entry);
    }

    let records = unique
        .into_par_iter()
        .map(|(key, entry)| {
            let url = expand_template(&req.url_template, entry)?;
            let sealed = seal(http, &url, DigestAlgorithm::Sha512)
                .with_context(|| format!("failed to fetch extension {}", key))?;
            let record = SourceRecord::file(sealed.url, sealed.integrity)
                .with_dest(req.dest.clone())
                .with_dest_filename(format!("{}-{}.{}", entry.name, entry.version, req.extension));
            Ok((key, record))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut resolution = Resolution::default();
    for (key, record) in records {
        resolution
            .notes
            .insert(format!("declared:{}@{}", key.name, key.version), record.url());
        resolution.records.push(record);
    }

    Ok(resolution)
}
