//! Provender CLI - offline-build source manifest resolver

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use provender::util::diagnostic::emit;
use provender::util::shell::Shell;
use provender::ResolveError;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("provender=debug")
    } else if cli.quiet {
        EnvFilter::new("provender=error")
    } else {
        EnvFilter::new("provender=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let shell = Arc::new(Shell::from_flags(cli.quiet, cli.verbose, cli.color));

    if let Err(e) = run(cli, &shell) {
        report(&e, shell.use_color());
        std::process::exit(1);
    }
}

fn run(cli: Cli, shell: &Arc<Shell>) -> Result<()> {
    let jobs = cli.jobs;

    match cli.command {
        Commands::Generate(args) => commands::generate::execute(args, jobs, shell),
        Commands::Flatten(args) => commands::flatten::execute(args, jobs, shell),
        Commands::Tag(args) => commands::tag::execute(args, shell),
        Commands::Select(args) => commands::select::execute(args, shell),
        Commands::Imports(args) => commands::imports::execute(args, jobs, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Typed resolution errors get a full diagnostic; everything else prints
/// its context chain.
fn report(err: &anyhow::Error, color: bool) {
    match err.downcast_ref::<ResolveError>() {
        Some(resolve_err) => {
            let mut diag = resolve_err.to_diagnostic();
            for cause in err
                .chain()
                .take_while(|c| c.downcast_ref::<ResolveError>().is_none())
            {
                diag = diag.with_context(cause.to_string());
            }
            emit(&diag, color);
        }
        None => eprintln!("error: {:#}", err),
    }
}
