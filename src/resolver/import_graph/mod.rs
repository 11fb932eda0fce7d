//! Transitive Go import-graph resolution.
//!
//! Starting from a set of import paths, every path is mapped to its
//! repository root, the root is shallow-cloned into the shared workspace
//! and `go list` reports which imports are still missing. Missing paths
//! form the next wave. The walk stops when a wave is empty.
//!
//! The workspace claim set is the visited set: a repository root is cloned
//! at most once per run, no matter how many paths (or cycles) lead to it.

pub mod deps;
pub mod discovery;
pub mod workspace;

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::source_record::SourceRecord;
use crate::resolver::Resolution;
use crate::sources::http::HttpFetch;

use self::deps::DepsLister;
use self::discovery::{discover, RepoRoot};
use self::workspace::{Claim, RepoCloner, Workspace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GoImportsRequest {
    /// Import paths to start from
    pub roots: Vec<String>,
    /// Directory the checkouts are placed under, GOPATH style
    #[serde(default = "default_dest")]
    pub dest: String,
}

fn default_dest() -> String {
    "src".to_string()
}

/// A cloned repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportGraphNode {
    /// The import path that first led to this root
    pub import_path: String,
    pub origin: RepoRoot,
    /// Checkout was already in the workspace before this run
    pub present: bool,
    pub commit: String,
}

/// Repository roots and the imports between them.
#[derive(Debug, Default)]
pub struct ImportGraph {
    graph: DiGraph<ImportGraphNode, ()>,
    by_root: BTreeMap<String, NodeIndex>,
    roots: Vec<String>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, node: ImportGraphNode) {
        if self.by_root.contains_key(&node.origin.root) {
            return;
        }
        let root = node.origin.root.clone();
        let idx = self.graph.add_node(node);
        self.by_root.insert(root, idx);
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if let (Some(&a), Some(&b)) = (self.by_root.get(from), self.by_root.get(to)) {
            if a != b && !self.graph.contains_edge(a, b) {
                self.graph.add_edge(a, b, ());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Nodes ordered by repository root.
    pub fn nodes(&self) -> impl Iterator<Item = &ImportGraphNode> {
        self.by_root.values().map(|&idx| &self.graph[idx])
    }

    pub fn node(&self, root: &str) -> Option<&ImportGraphNode> {
        self.by_root.get(root).map(|&idx| &self.graph[idx])
    }

    /// Roots imported directly by `root`, sorted.
    pub fn imports(&self, root: &str) -> Vec<&str> {
        let Some(&idx) = self.by_root.get(root) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].origin.root.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// One `git` record per cloned root, placed at `<dest>/<root>`.
    pub fn into_resolution(self, dest: &str) -> Resolution {
        let dest = dest.trim_end_matches('/');
        let records = self
            .nodes()
            .map(|node| {
                SourceRecord::git(node.origin.repo.clone(), None, node.commit.clone())
                    .with_dest(format!("{}/{}", dest, node.origin.root))
            })
            .collect();
        Resolution::many(records)
    }

    /// Indented tree from the requested roots; repeated subtrees are
    /// marked `(*)` and not expanded again.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        for root in &self.roots {
            self.render_node(root, 0, &mut seen, &mut out);
        }
        out
    }

    fn render_node<'a>(&'a self, root: &'a str, depth: usize, seen: &mut HashSet<&'a str>, out: &mut String) {
        let prefix = if depth == 0 {
            String::new()
        } else {
            format!("{}├── ", "│   ".repeat(depth - 1))
        };

        let Some(node) = self.node(root) else {
            out.push_str(&format!("{}{} (resolved earlier)\n", prefix, root));
            return;
        };

        let duplicate = !seen.insert(root);
        let commit = node.commit.get(..12).unwrap_or(&node.commit);
        out.push_str(&format!(
            "{}{} {}{}\n",
            prefix,
            root,
            commit,
            if duplicate { " (*)" } else { "" }
        ));

        if duplicate {
            return;
        }
        for dep in self.imports(root) {
            self.render_node(dep, depth + 1, seen, out);
        }
    }
}

struct Pending {
    path: String,
    parent: Option<String>,
}

struct Visit {
    parent: Option<String>,
    origin: RepoRoot,
    node: Option<ImportGraphNode>,
    missing: Vec<String>,
}

fn visit(
    http: &dyn HttpFetch,
    cloner: &dyn RepoCloner,
    lister: &dyn DepsLister,
    workspace: &Workspace,
    pending: &Pending,
) -> Result<Visit> {
    let origin = discover(http, &pending.path)?;

    let claim = workspace.claim(&origin.root);
    if !claim.is_ours() {
        tracing::debug!("{} already claimed", origin.root);
        return Ok(Visit {
            parent: pending.parent.clone(),
            origin,
            node: None,
            missing: Vec::new(),
        });
    }

    let checkout = workspace.checkout_path(&origin.root);
    let commit = match claim {
        Claim::Present => {
            tracing::info!("Reusing checkout of {}", origin.root);
            cloner.head(&checkout)?
        }
        _ => cloner.clone_shallow(&origin.repo, &checkout)?,
    };

    let output = lister
        .list(workspace.root(), &origin.root)
        .with_context(|| format!("failed to list packages of {}", origin.root))?;
    let within = format!("{}/", origin.root);
    let missing = deps::missing_imports(&output)?
        .into_iter()
        .filter(|path| path != &origin.root && !path.starts_with(&within))
        .collect();

    Ok(Visit {
        parent: pending.parent.clone(),
        node: Some(ImportGraphNode {
            import_path: pending.path.clone(),
            origin: origin.clone(),
            present: claim == Claim::Present,
            commit,
        }),
        origin,
        missing,
    })
}

/// Walk the import graph of `req.roots` to closure.
pub fn resolve(
    http: &dyn HttpFetch,
    cloner: &dyn RepoCloner,
    lister: &dyn DepsLister,
    workspace: &Workspace,
    req: &GoImportsRequest,
) -> Result<ImportGraph> {
    let mut graph = ImportGraph::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut edges: Vec<(String, String)> = Vec::new();

    let mut wave: Vec<Pending> = req
        .roots
        .iter()
        .filter(|path| seen.insert(path.to_string()))
        .map(|path| Pending {
            path: path.clone(),
            parent: None,
        })
        .collect();

    while !wave.is_empty() {
        tracing::debug!("Import wave of {} path(s)", wave.len());

        let visits = wave
            .par_iter()
            .map(|pending| {
                visit(http, cloner, lister, workspace, pending).with_context(|| match &pending.parent {
                    Some(parent) => format!("failed to resolve import `{}` (imported by {})", pending.path, parent),
                    None => format!("failed to resolve import `{}`", pending.path),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut next = Vec::new();
        for visit in visits {
            match &visit.parent {
                Some(parent) => edges.push((parent.clone(), visit.origin.root.clone())),
                None => {
                    if !graph.roots.contains(&visit.origin.root) {
                        graph.roots.push(visit.origin.root.clone());
                    }
                }
            }
            if let Some(node) = visit.node {
                graph.add_node(node);
            }
            for path in visit.missing {
                if seen.insert(path.clone()) {
                    next.push(Pending {
                        path,
                        parent: Some(visit.origin.root.clone()),
                    });
                }
            }
        }
        wave = next;
    }

    for (from, to) in &edges {
        graph.add_edge(from, to);
    }

    tracing::info!("Resolved {} repository root(s)", graph.len());
    Ok(graph)
}
