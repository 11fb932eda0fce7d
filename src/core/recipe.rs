//! `provender.toml` recipe parsing and schema.
//!
//! The recipe is the input of a run: application metadata plus the modules
//! of the build, in their fixed order. Modules list source *requests*;
//! resolution turns each request into sealed records.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::manifest::ModuleBuild;
use crate::resolver::SourceRequest;
use crate::util::fs::read_to_string;

/// A parsed recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub app: AppSpec,
    pub modules: Vec<ModuleSpec>,
    /// Directory containing the recipe file
    pub recipe_dir: PathBuf,
}

/// The `[app]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppSpec {
    pub app_id: String,
    pub runtime: Option<String>,
    pub runtime_version: Option<String>,
    pub sdk: Option<String>,
    pub branch: Option<String>,
    pub command: Option<String>,
    pub separate_locales: Option<bool>,
    #[serde(default)]
    pub finish_args: Vec<String>,
    /// Base application whose runtime settings the app inherits
    pub base: Option<BaseSpec>,
}

/// The `[app.base]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BaseSpec {
    /// URL of the base application's own manifest
    pub manifest_url: String,
}

/// One `[[modules]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,

    #[serde(flatten)]
    pub build: ModuleBuild,

    #[serde(default)]
    pub sources: Vec<SourceRequest>,
}

#[derive(Deserialize)]
struct RawRecipe {
    app: AppSpec,
    #[serde(default)]
    modules: Vec<ModuleSpec>,
}

impl Recipe {
    /// Load a recipe from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)?;

        Self::parse(&content, path)
    }

    /// Parse recipe content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawRecipe = toml::from_str(content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let recipe = Recipe {
            app: raw.app,
            modules: raw.modules,
            recipe_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        recipe
            .validate()
            .with_context(|| format!("invalid recipe {}", path.display()))?;
        Ok(recipe)
    }

    fn validate(&self) -> Result<()> {
        if self.app.app_id.trim().is_empty() {
            bail!("`app.app-id` must not be empty");
        }

        let mut names = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                bail!("every module needs a name");
            }
            if !names.insert(module.name.as_str()) {
                bail!("module `{}` is defined more than once", module.name);
            }
            for source in &module.sources {
                if let Err(msg) = source.validate() {
                    bail!("module `{}`: {}", module.name, msg);
                }
            }
        }

        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Number of source requests across all modules.
    pub fn request_count(&self) -> usize {
        self.modules.iter().map(|m| m.sources.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
[app]
app-id = "com.visualstudio.code.oss"
branch = "stable"
command = "code-oss"
separate-locales = false
finish-args = ["--share=ipc", "--socket=x11"]

[app.base]
manifest-url = "https://github.com/flathub/io.atom.electron.BaseApp/raw/master/io.atom.electron.BaseApp.json"

[[modules]]
name = "libsecret"
buildsystem = "meson"
config-opts = ["-Dmanpage=false", "-Dvapi=false"]
cleanup = ["/include"]

[[modules.sources]]
type = "archive"
url = "https://download.gnome.org/sources/libsecret/0.18/libsecret-0.18.6.tar.xz"
algorithm = "sha256"

[[modules]]
name = "vscode"
buildsystem = "simple"
build-commands = ["yarn --offline"]

[modules.build-options.env]
XDG_CACHE_HOME = "/run/build/vscode/.cache"

[[modules.sources]]
type = "git-tag"
url = "https://github.com/Microsoft/vscode.git"
tag = "1.30.0"

[[modules.sources]]
type = "yarn"
"#;

    #[test]
    fn test_parse_recipe() {
        let recipe = Recipe::parse(RECIPE, Path::new("/project/provender.toml")).unwrap();

        assert_eq!(recipe.app.app_id, "com.visualstudio.code.oss");
        assert_eq!(recipe.app.finish_args.len(), 2);
        assert!(recipe.app.base.is_some());
        assert_eq!(recipe.recipe_dir, PathBuf::from("/project"));
        assert_eq!(recipe.request_count(), 3);

        let vscode = recipe.module("vscode").unwrap();
        assert_eq!(vscode.build.buildsystem.as_deref(), Some("simple"));
        assert_eq!(
            vscode.build.build_options.as_ref().unwrap().env["XDG_CACHE_HOME"],
            "/run/build/vscode/.cache"
        );
        assert!(matches!(vscode.sources[1], SourceRequest::Yarn(_)));
    }

    #[test]
    fn test_duplicate_module_names() {
        let content = r#"
[app]
app-id = "org.example.App"

[[modules]]
name = "a"

[[modules]]
name = "a"
"#;
        let err = Recipe::parse(content, Path::new("provender.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("module `a` is defined more than once"));
    }

    #[test]
    fn test_empty_app_id() {
        let err = Recipe::parse("[app]\napp-id = \"\"\n", Path::new("provender.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("app-id"));
    }

    #[test]
    fn test_unknown_source_type() {
        let content = r#"
[app]
app-id = "org.example.App"

[[modules]]
name = "a"

[[modules.sources]]
type = "svn"
url = "https://example.test/repo"
"#;
        assert!(Recipe::parse(content, Path::new("provender.toml")).is_err());
    }

    #[test]
    fn test_unsafe_dest_is_rejected() {
        let content = r#"
[app]
app-id = "org.example.App"

[[modules]]
name = "a"

[[modules.sources]]
type = "script"
commands = ["true"]
dest = "/etc"
"#;
        let err = Recipe::parse(content, Path::new("provender.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("must be a relative path"));
    }
}
