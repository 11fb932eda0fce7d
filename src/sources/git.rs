//! Shallow git checkouts for the import-graph walk.

use std::path::Path;

use anyhow::{Context, Result};
use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};

use crate::resolver::import_graph::workspace::RepoCloner;

/// Clone `remote` into `dest` with depth 1 and return the HEAD commit id.
pub fn shallow_clone(remote: &str, dest: &Path) -> Result<String> {
    tracing::info!("Cloning {}", remote);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut fetch = FetchOptions::new();
    fetch.depth(1);

    let repo = RepoBuilder::new()
        .fetch_options(fetch)
        .clone(remote, dest)
        .with_context(|| format!("failed to clone {}", remote))?;

    head_commit(&repo).with_context(|| format!("failed to read HEAD of {}", remote))
}

/// The commit id HEAD points at in an existing checkout.
pub fn head_commit_at(path: &Path) -> Result<String> {
    let repo = Repository::open(path)
        .with_context(|| format!("failed to open git repository at {}", path.display()))?;
    head_commit(&repo)
}

fn head_commit(repo: &Repository) -> Result<String> {
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// [`RepoCloner`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCloner;

impl RepoCloner for GitCloner {
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<String> {
        shallow_clone(url, dest)
    }

    fn head(&self, checkout: &Path) -> Result<String> {
        head_commit_at(checkout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo_with_commit(path: &Path) -> String {
        let repo = Repository::init(path).unwrap();
        std::fs::write(path.join("main.go"), "package main\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("main.go")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        oid.to_string()
    }

    #[test]
    fn test_head_commit_at() {
        let tmp = TempDir::new().unwrap();
        let expected = init_repo_with_commit(tmp.path());

        assert_eq!(head_commit_at(tmp.path()).unwrap(), expected);
    }

    #[test]
    fn test_head_commit_at_missing_repo() {
        let tmp = TempDir::new().unwrap();
        let err = head_commit_at(&tmp.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("failed to open git repository"));
    }
}
