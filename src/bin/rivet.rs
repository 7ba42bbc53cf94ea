// src/bin/rivet.rs

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use colored::*;
use env_logger::Env;
use rivet::{
    cli::Cli,
    core::{
        cache::{BlobCache, DirectoryCache},
        config_loader,
        context::RunContext,
        paths,
        scheduler::ActionListRunner,
    },
    models::Target,
    system::executor::SystemSpawner,
};
use std::env;

/// Sets up logging, runs the requested targets and maps the outcome to the
/// process exit code.
fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run_cli(Cli::parse()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a target failed; the failure itself was logged.
fn run_cli(cli: Cli) -> Result<bool> {
    log::debug!("CLI args parsed: {:?}", cli);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let cwd = env::current_dir().context("Cannot determine the current directory")?;
            config_loader::find_config(&cwd)?
        }
    };
    let loaded = config_loader::load_project(&config_path)?;
    let project = &loaded.project;

    if cli.list {
        for target in &project.targets {
            println!("{}", target.name.cyan());
        }
        return Ok(true);
    }

    let targets: Vec<&Target> = if cli.targets.is_empty() {
        project.targets.first().into_iter().collect()
    } else {
        cli.targets
            .iter()
            .map(|name| {
                project
                    .find_target(name)
                    .ok_or_else(|| anyhow!("Target '{}' is not defined in '{}'.", name, config_path.display()))
            })
            .collect::<Result<_>>()?
    };
    if targets.is_empty() {
        bail!("'{}' defines no targets.", config_path.display());
    }

    let options = cli.run_options(project);
    let spawner = SystemSpawner;
    let cache = match paths::default_cache_dir() {
        Ok(dir) => Some(DirectoryCache::new(dir)),
        Err(e) => {
            log::warn!("{}; the blob cache is disabled.", e);
            None
        }
    };

    for target in targets {
        let mut runner = ActionListRunner::new(RunContext {
            project,
            target,
            root: loaded.root.clone(),
            options,
            spawner: &spawner,
            cache: cache.as_ref().map(|c| c as &dyn BlobCache),
        });
        if !runner.run() {
            eprintln!("{}: target '{}' failed.", "Error".red().bold(), target.name);
            return Ok(false);
        }
    }

    println!("{}", "Build finished.".green());
    Ok(true)
}
