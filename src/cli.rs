// src/cli.rs

use crate::core::context::RunOptions;
use crate::models::Project;
use clap::Parser;
use std::path::PathBuf;

/// rivet: a declarative build-orchestration engine.
///
/// Runs the named targets of a project file in order. Without a target, the
/// project's first target runs. Flags override the matching project toggles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project file to load. Defaults to `rivet.toml` or `rivet.json` in the
    /// current directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log what would run without spawning processes or touching files.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore timestamps and rebuild every source.
    #[arg(long)]
    pub rebuild: bool,

    /// Skip up-to-date sources and links.
    #[arg(long)]
    pub incremental: bool,

    /// Maximum number of concurrent compile tasks.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print the project's targets and exit.
    #[arg(long)]
    pub list: bool,

    /// Targets to run, in order.
    pub targets: Vec<String>,
}

impl Cli {
    /// The project toggles with the command-line overrides applied. Flags can
    /// only switch a toggle on.
    pub fn run_options(&self, project: &Project) -> RunOptions {
        let mut options = RunOptions::from_project(project);
        options.dry_run |= self.dry_run;
        options.rebuild |= self.rebuild;
        options.incremental |= self.incremental;
        if let Some(jobs) = self.jobs.filter(|n| *n > 0) {
            options.parallel = Some(jobs);
        }
        options
    }
}
