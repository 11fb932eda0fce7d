//! Source resolution.
//!
//! A recipe lists *requests*: what to resolve, in ecosystem terms. Each
//! [`SourceRequest`] variant is handled by one resolver module and turns
//! into one or more sealed [`SourceRecord`]s plus optional [`Notes`].
//!
//! All resolvers share one [`Resolver`], which owns the HTTP fetcher, the
//! git cloner, the dependency lister and the import-graph workspace.

pub mod archive;
pub mod checksums;
pub mod declared;
pub mod errors;
pub mod github;
pub mod import_graph;
pub mod lockfile;
pub mod pypi;
pub mod tags;
pub mod yarn;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::source_record::SourceRecord;
use crate::sources::git::GitCloner;
use crate::sources::http::HttpFetch;
use crate::sources::seal::seal;
use crate::util::hash::DigestAlgorithm;

pub use errors::{FetchFailure, ResolveError};
pub use import_graph::deps::{DepsLister, GoList};
pub use import_graph::workspace::{RepoCloner, Workspace};

/// One entry of a module's `sources` list in the recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceRequest {
    /// Git repository pinned to the commit a tag points at (smart HTTP)
    GitTag(tags::GitTagRequest),
    /// GitLab project pinned to a tag via the REST API
    GitlabTag(tags::GitlabTagRequest),
    /// Single file, sealed by fetching
    File(FetchedRequest),
    /// Archive, sealed by fetching
    Archive(FetchedRequest),
    /// Inline command list
    Script(ScriptRequest),
    /// Every `yarn.lock` under a directory of the source tree
    Yarn(yarn::YarnRequest),
    /// Named distributions from a PEP 503 package index
    Pypi(pypi::PypiRequest),
    /// Newest release listed in a checksum feed
    ArchiveFeed(archive::ArchiveFeedRequest),
    /// Files listed in a checksum list (e.g. `SHASUMS256.txt`)
    Checksums(checksums::ChecksumsRequest),
    /// Asset of a GitHub release
    GithubRelease(github::GithubReleaseRequest),
    /// Extensions named in a declaration file of the source tree
    Declared(declared::DeclaredRequest),
    /// Transitive closure of Go import paths
    GoImports(import_graph::GoImportsRequest),
}

impl SourceRequest {
    /// Pinned requests produce exactly one record and keep their
    /// declaration order in the manifest; expanded ones produce many and
    /// are sorted.
    pub fn is_pinned(&self) -> bool {
        matches!(
            self,
            SourceRequest::GitTag(_)
                | SourceRequest::GitlabTag(_)
                | SourceRequest::File(_)
                | SourceRequest::Archive(_)
                | SourceRequest::Script(_)
                | SourceRequest::ArchiveFeed(_)
                | SourceRequest::GithubRelease(_)
        )
    }

    /// Short human-readable description used in errors and progress.
    pub fn describe(&self) -> String {
        match self {
            SourceRequest::GitTag(r) => format!("tag `{}` of {}", r.tag, r.url),
            SourceRequest::GitlabTag(r) => match &r.tag {
                Some(tag) => format!("tag `{}` of {}/{}", tag, r.host, r.project),
                None => format!("latest tag of {}/{}", r.host, r.project),
            },
            SourceRequest::File(r) | SourceRequest::Archive(r) => r.url.clone(),
            SourceRequest::Script(r) => format!(
                "script `{}`",
                r.dest_filename.as_deref().unwrap_or("<inline>")
            ),
            SourceRequest::Yarn(r) => format!("yarn lockfiles under `{}`", r.path),
            SourceRequest::Pypi(r) => format!("{} python distribution(s)", r.packages.len()),
            SourceRequest::ArchiveFeed(r) => format!("newest `{}` release", r.prefix),
            SourceRequest::Checksums(r) => format!("{}/{}", r.base_url, r.list),
            SourceRequest::GithubRelease(r) => format!("release asset `{}` of {}", r.asset, r.repo),
            SourceRequest::Declared(r) => format!("extensions declared in `{}`", r.path),
            SourceRequest::GoImports(r) => format!("imports of {}", r.roots.join(", ")),
        }
    }

    /// Destination directories must stay inside the build tree.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let dest = match self {
            SourceRequest::GitTag(r) => r.dest.as_deref(),
            SourceRequest::GitlabTag(r) => r.dest.as_deref(),
            SourceRequest::File(r) | SourceRequest::Archive(r) => r.dest.as_deref(),
            SourceRequest::Script(r) => r.dest.as_deref(),
            SourceRequest::Yarn(r) => Some(r.dest.as_str()),
            SourceRequest::Pypi(r) => r.dest.as_deref(),
            SourceRequest::ArchiveFeed(r) => r.dest.as_deref(),
            SourceRequest::Checksums(r) => r.dest.as_deref(),
            SourceRequest::GithubRelease(r) => r.dest.as_deref(),
            SourceRequest::Declared(r) => Some(r.dest.as_str()),
            SourceRequest::GoImports(r) => Some(r.dest.as_str()),
        };

        match dest {
            Some(dest) if !crate::util::fs::is_safe_relative(dest) => Err(format!(
                "dest `{}` of {} must be a relative path inside the build",
                dest,
                self.describe()
            )),
            _ => Ok(()),
        }
    }
}

/// A single URL sealed by fetching (`file` and `archive` requests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchedRequest {
    pub url: String,
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
    pub dest: Option<String>,
    pub dest_filename: Option<String>,
    #[serde(default)]
    pub only_arches: Vec<String>,
}

/// Inline script written into the build tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptRequest {
    pub commands: Vec<String>,
    pub dest: Option<String>,
    pub dest_filename: Option<String>,
}

/// Metadata discovered while resolving, rendered under `@comments`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes(BTreeMap<String, String>);

impl Notes {
    pub fn new() -> Self {
        Notes(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge `other` into `self`; later values win.
    pub fn extend(&mut self, other: Notes) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// What one request resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub records: Vec<SourceRecord>,
    pub notes: Notes,
}

impl Resolution {
    pub fn single(record: SourceRecord) -> Self {
        Resolution {
            records: vec![record],
            notes: Notes::new(),
        }
    }

    pub fn many(records: Vec<SourceRecord>) -> Self {
        Resolution {
            records,
            notes: Notes::new(),
        }
    }

    pub fn with_note(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.notes.insert(key, value);
        self
    }
}

/// Knobs shared by every resolver.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Root of the application source tree (lockfiles, declaration files)
    pub source_root: PathBuf,
    /// Re-fetch artifacts whose digest came from upstream metadata
    pub verify: bool,
}

/// Dispatches requests to ecosystem resolvers.
pub struct Resolver {
    http: Arc<dyn HttpFetch>,
    cloner: Arc<dyn RepoCloner>,
    lister: Arc<dyn DepsLister>,
    workspace: Workspace,
    options: ResolveOptions,
}

impl Resolver {
    /// Create a resolver backed by libgit2 and the `go` tool.
    pub fn new(http: Arc<dyn HttpFetch>, workspace: PathBuf, options: ResolveOptions) -> Self {
        Resolver {
            http,
            cloner: Arc::new(GitCloner),
            lister: Arc::new(GoList::new()),
            workspace: Workspace::new(workspace),
            options,
        }
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn RepoCloner>) -> Self {
        self.cloner = cloner;
        self
    }

    pub fn with_lister(mut self, lister: Arc<dyn DepsLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn http(&self) -> &dyn HttpFetch {
        self.http.as_ref()
    }

    /// Resolve one request.
    pub fn resolve(&self, request: &SourceRequest) -> Result<Resolution> {
        tracing::debug!("Resolving {}", request.describe());

        let http = self.http();
        let resolution: Result<Resolution> = match request {
            SourceRequest::GitTag(r) => tags::resolve_git_tag(http, r).map_err(Into::into),
            SourceRequest::GitlabTag(r) => tags::resolve_gitlab_tag(http, r).map_err(Into::into),
            SourceRequest::File(r) => resolve_fetched(http, r, false),
            SourceRequest::Archive(r) => resolve_fetched(http, r, true),
            SourceRequest::Script(r) => Ok(resolve_script(r)),
            SourceRequest::Yarn(r) => yarn::resolve(http, &self.options, r),
            SourceRequest::Pypi(r) => pypi::resolve(http, &self.options, r).map_err(Into::into),
            SourceRequest::ArchiveFeed(r) => archive::resolve(http, &self.options, r).map_err(Into::into),
            SourceRequest::Checksums(r) => checksums::resolve(http, &self.options, r).map_err(Into::into),
            SourceRequest::GithubRelease(r) => github::resolve(http, r).map_err(Into::into),
            SourceRequest::Declared(r) => declared::resolve(http, &self.options, r),
            SourceRequest::GoImports(r) => import_graph::resolve(
                http,
                self.cloner.as_ref(),
                self.lister.as_ref(),
                &self.workspace,
                r,
            )
            .map(|graph| graph.into_resolution(&r.dest)),
        };

        let resolution = resolution.and_then(|resolution| {
            check_records(&resolution.records)?;
            Ok(resolution)
        });
        resolution.with_context(|| format!("failed to resolve {}", request.describe()))
    }
}

/// Reject records that would not load back from the written manifest.
///
/// Upstream metadata (index fragments, API commit ids, declared names)
/// ends up in records verbatim, so a malformed value is a parse error of
/// the upstream it came from.
pub fn check_records(records: &[SourceRecord]) -> std::result::Result<(), ResolveError> {
    for record in records {
        record.validate().map_err(|message| {
            let what = match record.url() {
                "" => "resolved source".to_string(),
                url => url.to_string(),
            };
            ResolveError::parse(what, message)
        })?;
    }
    Ok(())
}

fn resolve_fetched(http: &dyn HttpFetch, req: &FetchedRequest, archive: bool) -> Result<Resolution> {
    let sealed = seal(http, &req.url, req.algorithm)?;
    let mut record = if archive {
        SourceRecord::archive(sealed.url, sealed.integrity)
    } else {
        SourceRecord::file(sealed.url, sealed.integrity)
    };
    if let Some(dest) = &req.dest {
        record = record.with_dest(dest.clone());
    }
    if let Some(name) = &req.dest_filename {
        record = record.with_dest_filename(name.clone());
    }
    if !req.only_arches.is_empty() {
        record = record.with_only_arches(req.only_arches.clone());
    }
    Ok(Resolution::single(record))
}

fn resolve_script(req: &ScriptRequest) -> Resolution {
    let mut record = SourceRecord::script(req.commands.clone());
    if let Some(dest) = &req.dest {
        record = record.with_dest(dest.clone());
    }
    if let Some(name) = &req.dest_filename {
        record = record.with_dest_filename(name.clone());
    }
    Resolution::single(record)
}
