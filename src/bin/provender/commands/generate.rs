//! `provender generate` command

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::cli::GenerateArgs;
use provender::core::Recipe;
use provender::ops::{generate, GenerateOptions};
use provender::resolver::SourceRequest;
use provender::util::diagnostic::suggestions;
use provender::util::shell::{Shell, Status};
use provender::util::GlobalContext;

pub fn execute(args: GenerateArgs, jobs: Option<usize>, shell: &Arc<Shell>) -> Result<()> {
    let ctx = GlobalContext::new()?;

    let recipe_path = match args.recipe {
        Some(path) => path,
        None => ctx
            .find_recipe()
            .map_err(|e| anyhow!("{}\n{}", e, suggestions::NO_RECIPE))?,
    };
    let recipe = Recipe::load(&recipe_path)?;

    let uses_github_api = recipe
        .modules
        .iter()
        .flat_map(|m| &m.sources)
        .any(|s| matches!(s, SourceRequest::GithubRelease(_)));
    if uses_github_api && !ctx.has_token() {
        shell.warn("no PROVENDER_TOKEN or GITHUB_TOKEN set; GitHub API requests are rate-limited");
    }

    let span = shell.span(
        Status::Resolving,
        format!("{} ({} requests)", recipe.app.app_id, recipe.request_count()),
    );
    let progress = shell.progress(recipe.request_count() as u64, "Resolving");

    let opts = GenerateOptions {
        source_root: args.source,
        output: args.output,
        jobs,
        verify: args.verify,
        workspace: args.workspace,
    };

    let result = generate(&ctx, &recipe, &opts, &|item: &str| progress.tick(item));
    progress.finish();
    let result = result?;

    shell.status(Status::Wrote, result.output.display());
    span.finish_with_message(format!(
        "{} sources in {} modules",
        result.manifest.source_count(),
        result.manifest.modules.len()
    ));

    Ok(())
}
