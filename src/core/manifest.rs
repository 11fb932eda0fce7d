//! The generated build manifest (flatpak-builder JSON).
//!
//! The manifest is the only persisted output of a run. It is written once
//! by the assembler and read back by `flatten`-style tooling and tests.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::source_record::SourceRecord;
use crate::util::fs::write_string;

/// Notice placed at the top of every generated manifest.
pub const NOTICE: &str = "This file is auto-generated by provender, do not modify";

/// Top-level manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    /// Generation notice plus metadata discovered while resolving
    #[serde(rename = "@comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Comments>,

    pub app_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separate_locales: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finish_args: Vec<String>,

    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

/// The `@comments` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comments {
    #[serde(rename = "NOTICE")]
    pub notice: String,

    /// Resolution notes (selected versions, tag commits, release tags)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved: BTreeMap<String, String>,
}

/// One module: build metadata plus its ordered sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,

    #[serde(flatten)]
    pub build: ModuleBuild,

    #[serde(default)]
    pub sources: Vec<SourceRecord>,
}

/// Build metadata copied verbatim from the recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ModuleBuild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buildsystem: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_opts: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_options: Option<BuildOptions>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build_commands: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<String>,
}

/// `build-options` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_path: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Manifest {
    /// Serialize as pretty JSON (2-space indent) with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        out.push('\n');
        Ok(out)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse manifest")
    }

    #[cfg(test)]
    pub fn load(path: &Path) -> Result<Self> {
        let content = crate::util::fs::read_to_string(path)?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Write the manifest atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_string(path, &self.to_json()?)
    }

    /// Find a module by name.
    pub fn module(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Total number of sources across all modules.
    pub fn source_count(&self) -> usize {
        self.modules.iter().map(|m| m.sources.len()).sum()
    }
}
