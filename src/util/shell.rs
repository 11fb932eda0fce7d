//! Status lines and progress on stderr.
//!
//! Stdout carries only data (manifests, source lists), so everything a
//! person reads goes through [`Shell`].

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// When to emit ANSI colors on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Only when stderr is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

/// Label printed in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Resolving,
    Selected,
    Wrote,
    Finished,
    Warning,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Resolving => "Resolving",
            Status::Selected => "Selected",
            Status::Wrote => "Wrote",
            Status::Finished => "Finished",
            Status::Warning => "Warning",
        }
    }

    fn ansi(self) -> &'static str {
        match self {
            Status::Resolving => "\x1b[1;36m",
            Status::Selected => "\x1b[1;34m",
            Status::Wrote | Status::Finished => "\x1b[1;32m",
            Status::Warning => "\x1b[1;33m",
        }
    }
}

const LABEL_WIDTH: usize = 12;

#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
}

impl Shell {
    /// Build from the global flags; `--quiet` wins over `--verbose`.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice) -> Self {
        let verbosity = match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        };
        let use_color = match color {
            ColorChoice::Auto => io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };
        Shell {
            verbosity,
            use_color,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print `{label:>12} {msg}`; suppressed by `--quiet`.
    pub fn status(&self, status: Status, msg: impl Display) {
        if !self.is_quiet() {
            eprintln!("{} {}", self.label(status), msg);
        }
    }

    /// Warnings print even under `--quiet`.
    pub fn warn(&self, msg: impl Display) {
        eprintln!("{} {}", self.label(Status::Warning), msg);
    }

    fn label(&self, status: Status) -> String {
        if self.use_color {
            format!(
                "{}{:>width$}\x1b[0m",
                status.ansi(),
                status.label(),
                width = LABEL_WIDTH
            )
        } else {
            format!("{:>width$}", status.label(), width = LABEL_WIDTH)
        }
    }

    /// Print `msg` now and the elapsed time when the span finishes.
    pub fn span(self: &Arc<Self>, status: Status, msg: impl Display) -> Span {
        self.status(status, msg);
        Span {
            shell: Arc::clone(self),
            start: Instant::now(),
        }
    }

    /// Count resolved requests; a bar in normal mode, one line per
    /// request with `--verbose`, nothing with `--quiet`.
    pub fn progress(self: &Arc<Self>, total: u64, msg: impl Display) -> Progress {
        let bar = match self.verbosity {
            Verbosity::Normal if total > 1 => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                {
                    bar.set_style(style.progress_chars("#>-"));
                }
                bar.set_message(msg.to_string());
                Some(bar)
            }
            _ => None,
        };
        Progress {
            shell: Arc::clone(self),
            bar,
        }
    }
}

pub struct Span {
    shell: Arc<Shell>,
    start: Instant,
}

impl Span {
    pub fn finish_with_message(self, msg: impl Display) {
        let elapsed = format_duration(self.start.elapsed());
        self.shell
            .status(Status::Finished, format!("{} in {}", msg, elapsed));
    }
}

/// Safe to tick from worker threads.
pub struct Progress {
    shell: Arc<Shell>,
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn tick(&self, item: &str) {
        match &self.bar {
            Some(bar) => bar.inc(1),
            None if self.shell.is_verbose() => self.shell.status(Status::Resolving, item),
            None => {}
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
