//! Merging resolved sources into the final manifest.
//!
//! Pure aggregation: no I/O happens here. Modules keep recipe order.
//! Inside a module, records of pinned requests keep declaration order and
//! come first; records of expanded requests follow, deduplicated and sorted
//! so unchanged upstream state always yields byte-identical output.

use serde::{Deserialize, Serialize};

use crate::core::manifest::{Comments, Manifest, ModuleBuild, ModuleDescriptor, NOTICE};
use crate::core::recipe::AppSpec;
use crate::core::source_record::SourceRecord;
use crate::resolver::errors::ResolveError;
use crate::resolver::{Notes, Resolution};
use crate::sources::http::{fetch_json, FetchRequest, HttpFetch};

/// Runtime settings inherited from a base application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BaseApp {
    pub id: String,
    pub branch: String,
    pub runtime: String,
    pub runtime_version: String,
    pub sdk: String,
}

/// Fetch a base application's manifest.
pub fn fetch_base(http: &dyn HttpFetch, manifest_url: &str) -> Result<BaseApp, ResolveError> {
    fetch_json(http, &FetchRequest::new(manifest_url))
}

/// One module with every request resolved, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedModule {
    pub name: String,
    pub build: ModuleBuild,
    /// `(pinned, resolution)` per request
    pub resolutions: Vec<(bool, Resolution)>,
}

impl ResolvedModule {
    pub fn new(name: impl Into<String>, build: ModuleBuild) -> Self {
        ResolvedModule {
            name: name.into(),
            build,
            resolutions: Vec::new(),
        }
    }

    pub fn push(&mut self, pinned: bool, resolution: Resolution) {
        self.resolutions.push((pinned, resolution));
    }
}

/// Order a module's records: pinned as declared, then expanded sorted.
pub fn order_sources(resolutions: Vec<(bool, Resolution)>, notes: &mut Notes) -> Vec<SourceRecord> {
    let mut pinned = Vec::new();
    let mut expanded = Vec::new();

    for (is_pinned, resolution) in resolutions {
        notes.extend(resolution.notes);
        if is_pinned {
            pinned.extend(resolution.records);
        } else {
            expanded.extend(resolution.records);
        }
    }

    expanded.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.cmp(b)));
    expanded.dedup();

    pinned.extend(expanded);
    pinned
}

/// Build the manifest document.
pub fn assemble(app: &AppSpec, base: Option<&BaseApp>, modules: Vec<ResolvedModule>) -> Manifest {
    let mut notes = Notes::new();

    let modules = modules
        .into_iter()
        .map(|module| ModuleDescriptor {
            name: module.name,
            build: module.build,
            sources: order_sources(module.resolutions, &mut notes),
        })
        .collect();

    let mut manifest = Manifest {
        comments: Some(Comments {
            notice: NOTICE.to_string(),
            resolved: notes.into_inner(),
        }),
        app_id: app.app_id.clone(),
        base: None,
        base_version: None,
        runtime: app.runtime.clone(),
        runtime_version: app.runtime_version.clone(),
        sdk: app.sdk.clone(),
        branch: app.branch.clone(),
        command: app.command.clone(),
        separate_locales: app.separate_locales,
        finish_args: app.finish_args.clone(),
        modules,
    };

    if let Some(base) = base {
        manifest.base = Some(base.id.clone());
        manifest.base_version = Some(base.branch.clone());
        manifest.runtime = Some(base.runtime.clone());
        manifest.runtime_version = Some(base.runtime_version.clone());
        manifest.sdk = Some(base.sdk.clone());
    }

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source_record::Integrity;
    use crate::test_support::{MockHttpClient, MockHttpResponse};

    fn file(url: &str) -> SourceRecord {
        SourceRecord::file(url, Integrity::sha1("00")).with_dest("yarn-mirror")
    }

    fn app() -> AppSpec {
        AppSpec {
            app_id: "com.visualstudio.code.oss".to_string(),
            branch: Some("stable".to_string()),
            runtime: Some("org.freedesktop.Platform".to_string()),
            ..AppSpec::default()
        }
    }

    #[test]
    fn test_pinned_first_then_sorted_expanded() {
        let mut module = ResolvedModule::new("vscode", ModuleBuild::default());
        module.push(
            true,
            Resolution::single(SourceRecord::git("https://z.example/vscode.git", Some("1.30.0".to_string()), "abc")),
        );
        module.push(false, Resolution::many(vec![file("https://b.example/b.tgz"), file("https://a.example/a.tgz")]));
        module.push(true, Resolution::single(SourceRecord::script(vec!["true".to_string()])));
        module.push(false, Resolution::many(vec![file("https://a.example/a.tgz")]));

        let manifest = assemble(&app(), None, vec![module]);
        let urls: Vec<&str> = manifest.modules[0].sources.iter().map(|s| s.url()).collect();

        assert_eq!(
            urls,
            vec![
                "https://z.example/vscode.git",
                "",
                "https://a.example/a.tgz",
                "https://b.example/b.tgz",
            ]
        );
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let build = |order: &[&str]| {
            let mut module = ResolvedModule::new("m", ModuleBuild::default());
            module.push(false, Resolution::many(order.iter().map(|u| file(u)).collect()));
            assemble(&app(), None, vec![module]).to_json().unwrap()
        };

        assert_eq!(
            build(&["https://c.example/c", "https://a.example/a", "https://b.example/b"]),
            build(&["https://b.example/b", "https://c.example/c", "https://a.example/a"])
        );
    }

    #[test]
    fn test_notes_and_base_app() {
        let mut module = ResolvedModule::new("ImageMagick", ModuleBuild::default());
        module.push(
            true,
            Resolution::single(file("https://imagemagick.example/ImageMagick-7.0.8-1.tar.xz"))
                .with_note("archive-feed:ImageMagick", "7.0.8-1"),
        );

        let base = BaseApp {
            id: "io.atom.electron.BaseApp".to_string(),
            branch: "stable".to_string(),
            runtime: "org.freedesktop.Platform".to_string(),
            runtime_version: "18.08".to_string(),
            sdk: "org.freedesktop.Sdk".to_string(),
        };
        let manifest = assemble(&app(), Some(&base), vec![module]);

        let comments = manifest.comments.as_ref().unwrap();
        assert_eq!(comments.notice, NOTICE);
        assert_eq!(comments.resolved["archive-feed:ImageMagick"], "7.0.8-1");
        assert_eq!(manifest.base.as_deref(), Some("io.atom.electron.BaseApp"));
        assert_eq!(manifest.runtime_version.as_deref(), Some("18.08"));
        assert_eq!(manifest.branch.as_deref(), Some("stable"));

        let reparsed = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, manifest);
    }

    #[test]
    fn test_fetch_base() {
        let http = MockHttpClient::new();
        http.mock_url(
            "https://example.test/base.json",
            MockHttpResponse::ok(
                r#"{"id": "io.atom.electron.BaseApp", "branch": "stable", "runtime": "org.freedesktop.Platform",
                    "runtime-version": "18.08", "sdk": "org.freedesktop.Sdk", "modules": []}"#,
            ),
        );

        let base = fetch_base(&http, "https://example.test/base.json").unwrap();
        assert_eq!(base.id, "io.atom.electron.BaseApp");
        assert_eq!(base.runtime_version, "18.08");
    }
}
