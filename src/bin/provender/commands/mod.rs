//! Command implementations

pub mod completions;
pub mod flatten;
pub mod generate;
pub mod imports;
pub mod select;
pub mod tag;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use provender::sources::http::{HttpClient, HttpFetch};
use provender::util::GlobalContext;

/// HTTP client configured from the merged config and credentials.
pub fn http_client(ctx: &GlobalContext) -> Result<Arc<dyn HttpFetch>> {
    Ok(Arc::new(HttpClient::new(ctx.http_options())?))
}

/// Worker pool sized by `--jobs`, falling back to `resolve.jobs`.
pub fn worker_pool(ctx: &GlobalContext, jobs: Option<usize>) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.or(ctx.config().resolve.jobs).unwrap_or(0))
        .build()
        .context("failed to start worker threads")
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
