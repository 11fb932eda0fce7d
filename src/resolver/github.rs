//! GitHub release assets.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::core::source_record::SourceRecord;
use crate::resolver::errors::ResolveError;
use crate::resolver::Resolution;
use crate::sources::http::{fetch_json, FetchRequest, HttpFetch};
use crate::sources::seal::seal;
use crate::util::hash::DigestAlgorithm;

/// Default API endpoint.
pub const DEFAULT_API: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GithubReleaseRequest {
    /// `owner/name`
    pub repo: String,
    /// Release tag; the latest release when omitted
    pub tag: Option<String>,
    /// Glob matched against asset names; the first match wins
    pub asset: String,
    #[serde(default = "default_api")]
    pub api: String,
    pub dest: Option<String>,
    pub dest_filename: Option<String>,
}

fn default_api() -> String {
    DEFAULT_API.to_string()
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

pub fn resolve(http: &dyn HttpFetch, req: &GithubReleaseRequest) -> Result<Resolution, ResolveError> {
    let pattern = Pattern::new(&req.asset)
        .map_err(|e| ResolveError::parse(format!("asset pattern `{}`", req.asset), e))?;

    let release_url = match &req.tag {
        Some(tag) => format!("{}/repos/{}/releases/tags/{}", req.api.trim_end_matches('/'), req.repo, tag),
        None => format!("{}/repos/{}/releases/latest", req.api.trim_end_matches('/'), req.repo),
    };
    let request = FetchRequest::new(release_url.as_str()).header("Accept", "application/vnd.github+json");
    let release: Release = fetch_json(http, &request)?;

    let asset = release
        .assets
        .iter()
        .find(|a| pattern.matches(&a.name))
        .ok_or_else(|| {
            ResolveError::parse(
                &release_url,
                format!("release {} has no asset matching `{}`", release.tag_name, req.asset),
            )
        })?;

    tracing::info!("Selected {} from {} {}", asset.name, req.repo, release.tag_name);
    let sealed = seal(http, &asset.browser_download_url, DigestAlgorithm::Sha512)?;

    let mut record = SourceRecord::file(sealed.url, sealed.integrity);
    if let Some(dest) = &req.dest {
        record = record.with_dest(dest.clone());
    }
    if let Some(name) = &req.dest_filename {
        record = record.with_dest_filename(name.clone());
    }

    Ok(Resolution::single(record).with_note(format!("github-release:{}", req.repo), release.tag_name))
}
