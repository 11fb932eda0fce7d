//! `provender tag` command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::{http_client, print_json};
use crate::cli::TagArgs;
use provender::resolver::tags::{GitTagRequest, GitlabTagRequest};
use provender::resolver::{ResolveOptions, Resolver, SourceRequest};
use provender::util::shell::{Shell, Status};
use provender::util::GlobalContext;

pub fn execute(args: TagArgs, shell: &Arc<Shell>) -> Result<()> {
    let request = match (args.gitlab, args.tag) {
        (Some(host), tag) => SourceRequest::GitlabTag(GitlabTagRequest {
            host,
            project: args.repo,
            tag,
            dest: None,
        }),
        (None, Some(tag)) => SourceRequest::GitTag(GitTagRequest {
            url: args.repo,
            tag,
            dest: None,
        }),
        (None, None) => bail!("a tag name is required unless --gitlab is given"),
    };

    let ctx = GlobalContext::new()?;
    let resolver = Resolver::new(
        http_client(&ctx)?,
        PathBuf::new(),
        ResolveOptions {
            source_root: ctx.cwd().to_path_buf(),
            verify: false,
        },
    );

    let resolution = resolver.resolve(&request)?;
    for (key, commit) in resolution.notes.iter() {
        shell.status(Status::Selected, format!("{} = {}", key, commit));
    }
    print_json(&resolution.records)
}
