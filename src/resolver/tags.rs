//! Tag resolution: repository + tag name to an immutable commit.
//!
//! Two backends share the [`TagResolver`] contract:
//!
//! - [`SmartHttpTags`] reads the ref advertisement of git's smart HTTP
//!   protocol and prefers the peeled `refs/tags/<tag>^{}` entry, which names
//!   the commit an annotated tag points at.
//! - [`GitlabTags`] asks the GitLab REST API, which can also answer "the
//!   most recent tag" when no name is given.
//!
//! A missing tag is always an error; there is no fallback to a branch head.

use serde::{Deserialize, Serialize};

use crate::core::source_record::SourceRecord;
use crate::resolver::errors::ResolveError;
use crate::resolver::Resolution;
use crate::sources::http::{fetch_json, FetchRequest, HttpFetch};
use crate::util::hash::is_hex;

/// A resolved tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRef {
    pub url: String,
    pub tag: String,
    pub commit: String,
}

impl TagRef {
    /// Note key recording which commit a tag resolved to.
    pub fn note_key(&self) -> String {
        format!("tag:{}@{}", self.url, self.tag)
    }
}

/// Maps a repository and tag name to a commit.
pub trait TagResolver {
    fn resolve(&self, repo: &str, tag: &str) -> Result<TagRef, ResolveError>;
}

/// Resolver speaking git's smart HTTP ref discovery.
pub struct SmartHttpTags<'a> {
    http: &'a dyn HttpFetch,
}

impl<'a> SmartHttpTags<'a> {
    pub fn new(http: &'a dyn HttpFetch) -> Self {
        SmartHttpTags { http }
    }
}

impl TagResolver for SmartHttpTags<'_> {
    fn resolve(&self, repo: &str, tag: &str) -> Result<TagRef, ResolveError> {
        let url = format!(
            "{}/info/refs?service=git-upload-pack",
            repo.trim_end_matches('/')
        );
        let body = self.http.get(&url)?;
        let refs = parse_advertisement(&body).map_err(|e| ResolveError::parse(&url, e))?;

        let peeled = format!("refs/tags/{}^{{}}", tag);
        let direct = format!("refs/tags/{}", tag);
        let commit = refs
            .iter()
            .find(|(_, name)| *name == peeled)
            .or_else(|| refs.iter().find(|(_, name)| *name == direct))
            .map(|(oid, _)| oid.clone())
            .ok_or_else(|| ResolveError::TagNotFound {
                repo: repo.to_string(),
                tag: tag.to_string(),
            })?;

        Ok(TagRef {
            url: repo.to_string(),
            tag: tag.to_string(),
            commit,
        })
    }
}

/// Parse a smart HTTP ref advertisement into `(oid, refname)` pairs.
///
/// Each pkt-line is a 4-hex-digit length (including the prefix) followed by
/// the payload; `0000` is a flush. The service header line and the
/// NUL-separated capability list on the first ref are dropped.
pub fn parse_advertisement(body: &[u8]) -> Result<Vec<(String, String)>, String> {
    let mut refs = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        let prefix = body
            .get(pos..pos + 4)
            .ok_or_else(|| format!("truncated pkt-line length at byte {}", pos))?;
        let prefix = std::str::from_utf8(prefix)
            .map_err(|_| format!("invalid pkt-line length at byte {}", pos))?;
        let len = usize::from_str_radix(prefix, 16)
            .map_err(|_| format!("invalid pkt-line length `{}` at byte {}", prefix, pos))?;

        if len == 0 {
            pos += 4;
            continue;
        }
        if len < 4 {
            return Err(format!("invalid pkt-line length {} at byte {}", len, pos));
        }

        let payload = body
            .get(pos + 4..pos + len)
            .ok_or_else(|| format!("pkt-line at byte {} overruns the body", pos))?;
        pos += len;

        let payload = String::from_utf8_lossy(payload);
        let line = payload.trim_end_matches('\n');
        if line.starts_with('#') {
            continue;
        }

        let line = line.split('\0').next().unwrap_or("");
        let (oid, name) = line
            .split_once(' ')
            .ok_or_else(|| format!("malformed ref line `{}`", line))?;
        if !(oid.len() == 40 || oid.len() == 64) || !is_hex(oid) {
            return Err(format!("malformed object id `{}`", oid));
        }
        refs.push((oid.to_string(), name.to_string()));
    }

    Ok(refs)
}

/// Resolver backed by the GitLab REST API.
pub struct GitlabTags<'a> {
    http: &'a dyn HttpFetch,
    host: String,
}

#[derive(Debug, Deserialize)]
struct GitlabProject {
    id: u64,
    http_url_to_repo: String,
}

#[derive(Debug, Deserialize)]
struct GitlabTag {
    name: String,
    commit: GitlabCommit,
}

#[derive(Debug, Deserialize)]
struct GitlabCommit {
    id: String,
}

impl<'a> GitlabTags<'a> {
    /// `host` is the instance base URL, e.g. `https://gitlab.gnome.org`.
    pub fn new(http: &'a dyn HttpFetch, host: &str) -> Self {
        GitlabTags {
            http,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve `tag`, or the most recent tag when `None`.
    pub fn resolve_project(&self, project: &str, tag: Option<&str>) -> Result<TagRef, ResolveError> {
        let encoded: String = url::form_urlencoded::byte_serialize(project.as_bytes()).collect();
        let project_url = format!("{}/api/v4/projects/{}", self.host, encoded);
        let info: GitlabProject = fetch_json(self.http, &FetchRequest::new(project_url))?;

        let mut tags_url = format!(
            "{}/api/v4/projects/{}/repository/tags?per_page=1&page=1",
            self.host, info.id
        );
        if let Some(tag) = tag {
            let search: String =
                url::form_urlencoded::byte_serialize(format!("^{}$", tag).as_bytes()).collect();
            tags_url.push_str("&search=");
            tags_url.push_str(&search);
        }

        let tags: Vec<GitlabTag> = fetch_json(self.http, &FetchRequest::new(tags_url.as_str()))?;
        let not_found = || ResolveError::TagNotFound {
            repo: format!("{}/{}", self.host, project),
            tag: tag.unwrap_or("<latest>").to_string(),
        };

        let first = tags.into_iter().next().ok_or_else(not_found)?;
        if let Some(tag) = tag {
            if first.name != tag {
                return Err(not_found());
            }
        }
        if first.commit.id.is_empty() || !is_hex(&first.commit.id) {
            return Err(ResolveError::parse(
                &tags_url,
                format!("tag `{}` has a malformed commit id `{}`", first.name, first.commit.id),
            ));
        }

        Ok(TagRef {
            url: info.http_url_to_repo,
            tag: first.name,
            commit: first.commit.id,
        })
    }
}

impl TagResolver for GitlabTags<'_> {
    /// `repo` is the project path (`group/name`).
    fn resolve(&self, repo: &str, tag: &str) -> Result<TagRef, ResolveError> {
        self.resolve_project(repo, Some(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitTagRequest {
    pub url: String,
    pub tag: String,
    pub dest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitlabTagRequest {
    /// Instance base URL
    pub host: String,
    /// Project path, e.g. `GNOME/libsecret`
    pub project: String,
    /// Tag name; the most recent tag when omitted
    pub tag: Option<String>,
    pub dest: Option<String>,
}

fn into_resolution(tag: TagRef, dest: Option<&String>) -> Resolution {
    let mut record = SourceRecord::git(tag.url.clone(), Some(tag.tag.clone()), tag.commit.clone());
    if let Some(dest) = dest {
        record = record.with_dest(dest.clone());
    }
    Resolution::single(record).with_note(tag.note_key(), tag.commit)
}

pub fn resolve_git_tag(http: &dyn HttpFetch, req: &GitTagRequest) -> Result<Resolution, ResolveError> {
    let tag = SmartHttpTags::new(http).resolve(&req.url, &req.tag)?;
    tracing::info!("Resolved {} {} to {}", req.url, tag.tag, tag.commit);
    Ok(into_resolution(tag, req.dest.as_ref()))
}

pub fn resolve_gitlab_tag(
    http: &dyn HttpFetch,
    req: &GitlabTagRequest,
) -> Result<Resolution, ResolveError> {
    let tag = GitlabTags::new(http, &req.host).resolve_project(&req.project, req.tag.as_deref())?;
    tracing::info!("Resolved {} {} to {}", req.project, tag.tag, tag.commit);
    Ok(into_resolution(tag, req.dest.as_ref()))
}
