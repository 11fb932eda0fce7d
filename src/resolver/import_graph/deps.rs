//! Dependency listing through `go list`.
//!
//! `go list -e -json` prints one JSON object per package, back to back with
//! no enclosing array. Packages whose imports are not in the workspace yet
//! carry the missing path at the end of an `ImportStack`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;

use crate::resolver::errors::ResolveError;
use crate::util::process::{find_executable, ProcessBuilder};

/// Lists the packages under a repository root.
pub trait DepsLister: Send + Sync {
    /// Raw `go list -e -json <root>/...` output with `GOPATH=gopath`.
    fn list(&self, gopath: &Path, root: &str) -> Result<Vec<u8>>;
}

/// One record of the stream. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageRecord {
    #[serde(default)]
    pub import_path: String,
    pub error: Option<PackageError>,
    #[serde(default)]
    pub deps_errors: Vec<PackageError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageError {
    #[serde(default)]
    pub import_stack: Vec<String>,
    #[serde(default)]
    pub err: String,
}

impl PackageRecord {
    /// Import paths this package failed to find.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.error
            .iter()
            .chain(self.deps_errors.iter())
            .filter_map(|e| e.import_stack.last())
            .map(String::as_str)
    }
}

/// Decode every record of a `go list -json` stream.
pub fn parse_stream(output: &[u8]) -> Result<Vec<PackageRecord>, ResolveError> {
    serde_json::Deserializer::from_slice(output)
        .into_iter::<PackageRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ResolveError::parse("go list output", e))
}

/// Standard-library paths have no dot in their first segment.
pub fn is_remote_path(import_path: &str) -> bool {
    import_path
        .split('/')
        .next()
        .is_some_and(|first| first.contains('.'))
}

/// Sorted, deduplicated non-standard import paths the stream reports missing.
pub fn missing_imports(output: &[u8]) -> Result<Vec<String>, ResolveError> {
    let mut missing = BTreeSet::new();
    for record in parse_stream(output)? {
        for path in record.unresolved() {
            if is_remote_path(path) {
                missing.insert(path.to_string());
            }
        }
    }
    Ok(missing.into_iter().collect())
}

/// [`DepsLister`] running the `go` tool in GOPATH mode.
#[derive(Debug, Default)]
pub struct GoList {
    program: OnceLock<Option<PathBuf>>,
}

impl GoList {
    pub fn new() -> Self {
        Self::default()
    }

    fn program(&self) -> Result<&Path> {
        self.program
            .get_or_init(|| find_executable("go"))
            .as_deref()
            .ok_or_else(|| anyhow!("`go` not found in PATH; it is required to list Go imports"))
    }
}

impl DepsLister for GoList {
    fn list(&self, gopath: &Path, root: &str) -> Result<Vec<u8>> {
        let cmd = ProcessBuilder::new(self.program()?)
            .args(["list", "-e", "-json"])
            .arg(format!("{}/...", root))
            .env("GOPATH", gopath)
            .env("GO111MODULE", "off")
            .cwd(gopath);

        // with -e, go list reports broken packages in the stream and may
        // still exit non-zero
        let output = cmd.exec()?;
        if !output.status.success() && output.stdout.is_empty() {
            bail!(
                "`{}` failed\n{}",
                cmd.display_command(),
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }
        Ok(output.stdout)
    }
}
