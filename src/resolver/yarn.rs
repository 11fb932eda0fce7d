//! JS dependencies: every `yarn.lock` in the source tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::package_key::PackageKey;
use crate::core::source_record::SourceRecord;
use crate::resolver::lockfile::{self, FlattenOptions, DEFAULT_MIRROR_DIR};
use crate::resolver::{Resolution, ResolveOptions};
use crate::sources::http::HttpFetch;
use crate::util::fs::read_to_string;

/// Lockfile name searched for.
pub const LOCKFILE_NAME: &str = "yarn.lock";

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct YarnRequest {
    /// Directory under the source root to search
    #[serde(default = "default_path")]
    pub path: String,
    /// Mirror directory
    #[serde(default = "default_dest")]
    pub dest: String,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_dest() -> String {
    DEFAULT_MIRROR_DIR.to_string()
}

/// Find every lockfile under `root`, in sorted path order.
pub fn find_lockfiles(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIP_DIRS.iter().any(|d| e.file_name() == *d))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && entry.file_name() == LOCKFILE_NAME {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

/// Flatten and union every lockfile; later lockfiles overwrite identical keys.
pub fn flatten_tree(
    http: &dyn HttpFetch,
    root: &Path,
    options: &FlattenOptions,
) -> Result<BTreeMap<PackageKey, SourceRecord>> {
    let mut merged = BTreeMap::new();

    for path in find_lockfiles(root)? {
        let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        tracing::info!("Flattening {}", rel);

        let content = read_to_string(&path)?;
        let entries = lockfile::parse(&content, &rel)?;
        let flat = lockfile::flatten(http, &entries, options)
            .with_context(|| format!("failed to flatten {}", rel))?;

        tracing::debug!("{} pins {} packages", rel, flat.len());
        merged.extend(flat);
    }

    Ok(merged)
}

pub fn resolve(http: &dyn HttpFetch, options: &ResolveOptions, req: &YarnRequest) -> Result<Resolution> {
    let root = options.source_root.join(&req.path);
    let flat_options = FlattenOptions {
        dest: req.dest.clone(),
        verify: options.verify,
    };

    let packages = flatten_tree(http, &root, &flat_options)?;
    if packages.is_empty() {
        tracing::warn!("No {} found under {}", LOCKFILE_NAME, root.display());
    }

    Ok(Resolution::many(packages.into_values().collect()))
}
