//! `provender flatten` command

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{http_client, print_json, worker_pool};
use crate::cli::FlattenArgs;
use provender::core::SourceRecord;
use provender::resolver::check_records;
use provender::resolver::lockfile::{self, FlattenOptions};
use provender::util::fs::read_to_string;
use provender::util::shell::{Shell, Status};
use provender::util::GlobalContext;

pub fn execute(args: FlattenArgs, jobs: Option<usize>, shell: &Arc<Shell>) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let http = http_client(&ctx)?;

    let content = read_to_string(&args.lockfile)?;
    let what = args.lockfile.display().to_string();
    let entries = lockfile::parse(&content, &what)?;

    let options = FlattenOptions {
        dest: args.dest,
        verify: args.verify || ctx.config().resolve.verify,
    };
    let flat = worker_pool(&ctx, jobs)?
        .install(|| lockfile::flatten(http.as_ref(), &entries, &options))
        .with_context(|| format!("failed to flatten {}", what))?;

    let records: Vec<SourceRecord> = flat.into_values().collect();
    check_records(&records)?;
    print_json(&records)?;

    shell.status(Status::Finished, format!("{} packages from {}", records.len(), what));
    Ok(())
}
