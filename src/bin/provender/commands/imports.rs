//! `provender imports` command

use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use super::{http_client, print_json, worker_pool};
use crate::cli::ImportsArgs;
use provender::resolver::import_graph::{self, GoImportsRequest};
use provender::resolver::{check_records, GoList, Workspace};
use provender::sources::GitCloner;
use provender::util::shell::{Shell, Status};
use provender::util::GlobalContext;

pub fn execute(args: ImportsArgs, jobs: Option<usize>, shell: &Arc<Shell>) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let http = http_client(&ctx)?;

    let scratch;
    let root = match args.workspace.or_else(|| ctx.config().resolve.workspace.clone()) {
        Some(dir) => dir,
        None => {
            scratch = TempDir::new().context("failed to create a workspace directory")?;
            scratch.path().to_path_buf()
        }
    };
    let workspace = Workspace::new(root);

    let request = GoImportsRequest {
        roots: args.paths,
        dest: args.dest,
    };

    let span = shell.span(Status::Resolving, format!("imports of {}", request.roots.join(", ")));
    let lister = GoList::new();
    let graph = worker_pool(&ctx, jobs)?.install(|| {
        import_graph::resolve(http.as_ref(), &GitCloner, &lister, &workspace, &request)
    })?;
    span.finish_with_message(format!("{} repositories", graph.len()));

    if args.tree {
        print!("{}", graph.render_tree());
        Ok(())
    } else {
        let resolution = graph.into_resolution(&request.dest);
        check_records(&resolution.records)?;
        print_json(&resolution.records)
    }
}
