//! Implementation of `provender generate`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tempfile::TempDir;

use crate::core::manifest::Manifest;
use crate::core::recipe::Recipe;
use crate::ops::assemble::{assemble, fetch_base, ResolvedModule};
use crate::resolver::{ResolveOptions, Resolver, SourceRequest};
use crate::sources::http::HttpClient;
use crate::util::context::GlobalContext;

/// Options for the generate command.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Application source tree (default: the recipe's directory)
    pub source_root: Option<PathBuf>,

    /// Output path (default: `<app-id>.json` in the working directory)
    pub output: Option<PathBuf>,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Re-fetch artifacts whose digest came from upstream metadata
    pub verify: bool,

    /// Persistent workspace for import-graph checkouts
    pub workspace: Option<PathBuf>,
}

/// What a generate run produced.
#[derive(Debug)]
pub struct GenerateResult {
    pub manifest: Manifest,
    pub output: PathBuf,
    pub requests: usize,
}

/// Resolve every request of a recipe and write the manifest.
///
/// Nothing is written unless every request resolved.
pub fn generate(
    ctx: &GlobalContext,
    recipe: &Recipe,
    opts: &GenerateOptions,
    on_resolved: &(dyn Fn(&str) + Sync),
) -> Result<GenerateResult> {
    let config = ctx.config();
    let source_root = opts
        .source_root
        .clone()
        .unwrap_or_else(|| recipe.recipe_dir.clone());

    // kept alive until resolution finishes
    let mut scratch = None;
    let workspace = match opts.workspace.clone().or_else(|| config.resolve.workspace.clone()) {
        Some(dir) => dir,
        None => {
            let tmp = TempDir::new().context("failed to create a workspace directory")?;
            let dir = tmp.path().to_path_buf();
            scratch = Some(tmp);
            dir
        }
    };
    tracing::debug!("Import-graph workspace at {}", workspace.display());

    let http = Arc::new(HttpClient::new(ctx.http_options())?);
    let resolver = Resolver::new(
        http,
        workspace,
        ResolveOptions {
            source_root,
            verify: opts.verify || config.resolve.verify,
        },
    );

    let jobs = opts.jobs.or(config.resolve.jobs);
    let manifest = generate_manifest(&resolver, recipe, jobs, on_resolved)?;
    drop(scratch);

    let output = match &opts.output {
        Some(path) => path.clone(),
        None => ctx.cwd().join(format!("{}.json", recipe.app.app_id)),
    };
    manifest.save(&output)?;

    Ok(GenerateResult {
        manifest,
        output,
        requests: recipe.request_count(),
    })
}

/// Resolve a recipe into a manifest without touching the output file.
pub fn generate_manifest(
    resolver: &Resolver,
    recipe: &Recipe,
    jobs: Option<usize>,
    on_resolved: &(dyn Fn(&str) + Sync),
) -> Result<Manifest> {
    let base = match &recipe.app.base {
        Some(spec) => Some(
            fetch_base(resolver.http(), &spec.manifest_url)
                .with_context(|| format!("failed to fetch base application {}", spec.manifest_url))?,
        ),
        None => None,
    };

    let requests: Vec<(usize, &SourceRequest)> = recipe
        .modules
        .iter()
        .enumerate()
        .flat_map(|(idx, module)| module.sources.iter().map(move |request| (idx, request)))
        .collect();

    tracing::info!(
        "Resolving {} request(s) across {} module(s)",
        requests.len(),
        recipe.modules.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("failed to start worker threads")?;

    // Import roots are shared through the workspace claim set: the first
    // request to reach a root owns it, so those requests run in declaration
    // order. Each walk is still parallel inside.
    let (imports, others): (Vec<_>, Vec<_>) = requests
        .iter()
        .enumerate()
        .partition(|(_, (_, request))| matches!(request, SourceRequest::GoImports(_)));

    let resolve_one = |&(position, &(idx, request)): &(usize, &(usize, &SourceRequest))| -> Result<_> {
        let resolution = resolver.resolve(request)?;
        on_resolved(&request.describe());
        Ok((position, idx, request.is_pinned(), resolution))
    };

    let (walked, fetched) = pool.install(|| {
        rayon::join(
            || imports.iter().map(&resolve_one).collect::<Result<Vec<_>>>(),
            || others.par_iter().map(&resolve_one).collect::<Result<Vec<_>>>(),
        )
    });
    let mut resolutions = walked?;
    resolutions.extend(fetched?);
    resolutions.sort_by_key(|(position, ..)| *position);

    let mut modules: Vec<ResolvedModule> = recipe
        .modules
        .iter()
        .map(|m| ResolvedModule::new(m.name.clone(), m.build.clone()))
        .collect();
    for (_, idx, pinned, resolution) in resolutions {
        modules[idx].push(pinned, resolution);
    }

    Ok(assemble(&recipe.app, base.as_ref(), modules))
}
