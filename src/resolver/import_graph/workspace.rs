//! The shared checkout tree the import-graph walk clones into.
//!
//! Laid out like a classic `GOPATH`: the checkout of repository root
//! `example.org/a/b` lives at `<root>/src/example.org/a/b`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

/// Clones repositories into the workspace.
pub trait RepoCloner: Send + Sync {
    /// Shallow-clone `url` into `dest`; returns the HEAD commit id.
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<String>;

    /// HEAD commit id of an existing checkout.
    fn head(&self, checkout: &Path) -> Result<String>;
}

/// Outcome of claiming a repository root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Claimed and not on disk; the caller must clone it.
    Fresh,
    /// Claimed, and a checkout from an earlier run is already on disk.
    Present,
    /// Someone else claimed it first.
    Taken,
}

impl Claim {
    /// Whether this caller owns the root.
    pub fn is_ours(self) -> bool {
        !matches!(self, Claim::Taken)
    }
}

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    claimed: Mutex<HashSet<String>>,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        Workspace {
            root,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the checkout of repository root `import_root` lives.
    pub fn checkout_path(&self, import_root: &str) -> PathBuf {
        let mut path = self.root.join("src");
        path.extend(import_root.split('/'));
        path
    }

    /// Atomically check and mark `import_root` as visited.
    ///
    /// Exactly one caller per root ever sees `Fresh` or `Present`.
    pub fn claim(&self, import_root: &str) -> Claim {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !claimed.insert(import_root.to_string()) {
            return Claim::Taken;
        }

        if self.checkout_path(import_root).join(".git").exists() {
            Claim::Present
        } else {
            Claim::Fresh
        }
    }

    #[cfg(test)]
    pub fn claimed_count(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
