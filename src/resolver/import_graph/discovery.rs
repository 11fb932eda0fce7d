//! Mapping import paths to the repositories that host them.
//!
//! Well-known hosts are matched by pattern with no network access. Every
//! other path is looked up with a `?go-get=1` request whose HTML answer
//! carries `<meta name="go-import" content="<root> <vcs> <repo>">` tags.

use std::sync::LazyLock;

use regex::Regex;

use crate::resolver::errors::ResolveError;
use crate::sources::http::HttpFetch;

/// A repository root and where it is hosted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRoot {
    /// Import path prefix the repository serves
    pub root: String,
    pub vcs: String,
    pub repo: String,
}

struct StaticHost {
    prefix: &'static str,
    pattern: Regex,
}

static STATIC_HOSTS: LazyLock<Vec<StaticHost>> = LazyLock::new(|| {
    vec![
        StaticHost {
            prefix: "github.com/",
            pattern: Regex::new(r"^(github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[\p{L}0-9_.\-]+)*$")
                .expect("valid github regex"),
        },
        StaticHost {
            prefix: "bitbucket.org/",
            pattern: Regex::new(r"^(bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$")
                .expect("valid bitbucket regex"),
        },
    ]
});

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s([^>]*)>").expect("valid meta regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});

/// Match a path against the well-known hosts.
///
/// `Ok(None)` means the host is not well known; a path on a well-known host
/// that does not fit its layout is an error.
pub fn static_root(import_path: &str) -> Result<Option<RepoRoot>, ResolveError> {
    let Some(host) = STATIC_HOSTS.iter().find(|h| import_path.starts_with(h.prefix)) else {
        return Ok(None);
    };

    let caps = host.pattern.captures(import_path).ok_or_else(|| {
        ResolveError::parse(
            format!("import path `{}`", import_path),
            format!("invalid {} import path", host.prefix.trim_end_matches('/')),
        )
    })?;

    let root = caps[1].to_string();
    Ok(Some(RepoRoot {
        repo: format!("https://{}.git", root),
        root,
        vcs: "git".to_string(),
    }))
}

/// All `go-import` declarations on a page.
pub fn parse_meta_imports(html: &str) -> Vec<RepoRoot> {
    META_TAG
        .captures_iter(html)
        .filter_map(|tag| {
            let mut name = None;
            let mut content = None;
            for attr in ATTRIBUTE.captures_iter(&tag[1]) {
                let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
                match attr[1].to_ascii_lowercase().as_str() {
                    "name" => name = value,
                    "content" => content = value,
                    _ => {}
                }
            }

            if name? != "go-import" {
                return None;
            }
            let fields: Vec<&str> = content?.split_whitespace().collect();
            match fields.as_slice() {
                [root, vcs, repo] => Some(RepoRoot {
                    root: root.to_string(),
                    vcs: vcs.to_string(),
                    repo: repo.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// `root` is `path` or a whole-segment prefix of it.
fn is_segment_prefix(root: &str, path: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn fetch_declaration(http: &dyn HttpFetch, import_path: &str) -> Result<RepoRoot, ResolveError> {
    let url = format!("https://{}?go-get=1", import_path);
    let html = http.get_text(&url)?;

    let mut matches: Vec<RepoRoot> = parse_meta_imports(&html)
        .into_iter()
        .filter(|m| is_segment_prefix(&m.root, import_path))
        .collect();
    matches.dedup();

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(ResolveError::parse(
            &url,
            format!("no go-import meta tag for `{}`", import_path),
        )),
        n => Err(ResolveError::parse(
            &url,
            format!("{} conflicting go-import meta tags for `{}`", n, import_path),
        )),
    }
}

/// Find the repository that hosts `import_path`.
pub fn discover(http: &dyn HttpFetch, import_path: &str) -> Result<RepoRoot, ResolveError> {
    if let Some(root) = static_root(import_path)? {
        tracing::debug!("{} is on a well-known host: {}", import_path, root.repo);
        return Ok(root);
    }

    let declared = fetch_declaration(http, import_path)?;

    // a sub-path may not speak for its root
    if declared.root != import_path {
        let confirmed = fetch_declaration(http, &declared.root)?;
        if confirmed != declared {
            return Err(ResolveError::parse(
                format!("import path `{}`", import_path),
                format!(
                    "`{}` declares {} {} but its root `{}` declares {} {}",
                    import_path, declared.vcs, declared.repo, confirmed.root, confirmed.vcs, confirmed.repo
                ),
            ));
        }
    }

    if declared.vcs != "git" {
        return Err(ResolveError::UnsupportedVcs {
            import_path: import_path.to_string(),
            vcs: declared.vcs,
        });
    }

    tracing::debug!("{} is served by {}", import_path, declared.repo);
    Ok(declared)
}
