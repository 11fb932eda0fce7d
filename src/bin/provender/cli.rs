//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;
use provender::util::shell::ColorChoice;

/// Provender - resolve every source an offline build needs into one manifest
#[derive(Parser)]
#[command(name = "provender")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Number of parallel jobs (default: resolve.jobs, then the CPU count)
    #[arg(short, long, global = true, env = "PROVENDER_JOBS")]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the recipe and write the manifest
    Generate(GenerateArgs),

    /// Flatten one yarn.lock into sealed sources
    Flatten(FlattenArgs),

    /// Pin a tag to the commit it points at
    Tag(TagArgs),

    /// Select the newest release archive from a checksum feed
    Select(SelectArgs),

    /// Walk the import graph of Go packages
    Imports(ImportsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Path to provender.toml (default: search upwards from the current directory)
    #[arg(long)]
    pub recipe: Option<PathBuf>,

    /// Application source tree (default: the recipe's directory)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Where to write the manifest (default: <app-id>.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Re-fetch artifacts whose digest came from upstream metadata
    #[arg(long)]
    pub verify: bool,

    /// Keep import-graph checkouts in this directory
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct FlattenArgs {
    /// Path to the lockfile
    pub lockfile: PathBuf,

    /// Directory the tarballs are placed in
    #[arg(long, default_value = "yarn-mirror")]
    pub dest: String,

    /// Re-fetch fragment-sealed tarballs and compare digests
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct TagArgs {
    /// Repository URL, or the project path with --gitlab
    pub repo: String,

    /// Tag name (with --gitlab, the newest tag when omitted)
    pub tag: Option<String>,

    /// Resolve through the REST API of this GitLab instance
    #[arg(long, value_name = "HOST")]
    pub gitlab: Option<String>,
}

#[derive(Args)]
pub struct SelectArgs {
    /// URL of the checksum feed
    pub feed_url: String,

    /// Filename prefix of the release archives
    #[arg(long)]
    pub prefix: String,

    /// Directory the archives live in (default: the feed's directory)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Extension preference, most preferred first (repeatable)
    #[arg(long = "extension")]
    pub extensions: Vec<String>,

    /// Re-fetch the selected archive and compare digests
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct ImportsArgs {
    /// Import paths to start from
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Print the import tree instead of sources
    #[arg(long)]
    pub tree: bool,

    /// Directory the checkouts are placed under in the manifest
    #[arg(long, default_value = "src")]
    pub dest: String,

    /// Keep checkouts in this directory
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
