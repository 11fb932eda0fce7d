//! `provender select` command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::{http_client, print_json};
use crate::cli::SelectArgs;
use provender::resolver::archive::{ArchiveFeedRequest, DEFAULT_EXTENSIONS};
use provender::resolver::{ResolveOptions, Resolver, SourceRequest};
use provender::util::shell::{Shell, Status};
use provender::util::GlobalContext;

pub fn execute(args: SelectArgs, shell: &Arc<Shell>) -> Result<()> {
    let extensions = if args.extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        args.extensions
    };

    let ctx = GlobalContext::new()?;
    let resolver = Resolver::new(
        http_client(&ctx)?,
        PathBuf::new(),
        ResolveOptions {
            source_root: ctx.cwd().to_path_buf(),
            verify: args.verify || ctx.config().resolve.verify,
        },
    );

    let request = SourceRequest::ArchiveFeed(ArchiveFeedRequest {
        feed_url: args.feed_url,
        base_url: args.base_url,
        prefix: args.prefix,
        extensions,
        dest: None,
        dest_filename: None,
    });

    let resolution = resolver.resolve(&request)?;
    for (key, version) in resolution.notes.iter() {
        shell.status(Status::Selected, format!("{} {}", key, version));
    }
    print_json(&resolution.records)
}
