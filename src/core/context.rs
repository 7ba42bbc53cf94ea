// src/core/context.rs

use crate::constants::keys;
use crate::core::action_runner::{ActionError, ActionResult};
use crate::core::cache::BlobCache;
use crate::core::config_resolver::ConfigResolver;
use crate::core::paths;
use crate::models::{Action, Project, System, Target};
use crate::system::executor::{SpawnOptions, Spawner};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-wide switches for one run, built from the project toggles and
/// whatever the command line overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub rebuild: bool,
    pub incremental: bool,
    /// Maximum concurrent build tasks; `None` means available CPUs.
    pub parallel: Option<usize>,
    pub allow_cycles: bool,
    pub max_actions: Option<usize>,
}

impl RunOptions {
    pub fn from_project(project: &Project) -> Self {
        Self {
            dry_run: project.dry_run,
            rebuild: project.rebuild,
            incremental: project.incremental,
            parallel: project.parallel.filter(|n| *n > 0),
            allow_cycles: project.allow_action_cycles,
            max_actions: project.run_max_actions,
        }
    }

    /// The concurrency to use when neither the action nor the options set one.
    pub fn default_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Everything shared by the actions of one target run.
pub struct RunContext<'p> {
    pub project: &'p Project,
    pub target: &'p Target,
    /// Base directory for relative paths (the directory of the config file).
    pub root: PathBuf,
    pub options: RunOptions,
    pub spawner: &'p dyn Spawner,
    pub cache: Option<&'p dyn BlobCache>,
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("target", &self.target.name)
            .field("root", &self.root)
            .field("options", &self.options)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// The view one action body gets while it runs.
#[derive(Debug)]
pub struct ActionContext<'a> {
    pub run: &'a RunContext<'a>,
    pub action: &'a Action,
    pub system: Option<&'a System>,
    pub resolver: ConfigResolver<'a>,
    /// Working directory: the `cwd` attribute resolved cumulatively from the root.
    pub cwd: PathBuf,
    /// Environment additions, merged across levels.
    pub env: HashMap<String, String>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        run: &'a RunContext<'a>,
        action: &'a Action,
        system: Option<&'a System>,
    ) -> ActionResult<Self> {
        let resolver = ConfigResolver::new(
            Some(&run.project.settings),
            system.map(|s| &s.settings),
            Some(&run.target.settings),
            Some(&action.settings),
        );
        let cwd = paths::normalize(&resolver.get_path(keys::CWD, &run.root)?);

        let mut env = HashMap::new();
        for (name, value) in resolver.get_object_additive(keys::ENV)? {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ActionError::Malformed(format!(
                        "Environment variable '{}' must be a string, number or boolean.",
                        name
                    )));
                }
            };
            env.insert(name, value);
        }

        Ok(Self {
            run,
            action,
            system,
            resolver,
            cwd,
            env,
        })
    }

    pub fn dry_run(&self) -> bool {
        self.run.options.dry_run
    }

    /// Resolves a path attribute value against the action's working directory.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        paths::normalize(&paths::absolutize(&paths::expand_path(raw), &self.cwd))
    }

    /// Resolves a required string attribute as a path.
    pub fn require_path(&self, key: &str) -> ActionResult<PathBuf> {
        let raw: String = self.resolver.require(key)?;
        Ok(self.resolve(&raw))
    }

    /// The `timeout` attribute, in seconds.
    pub fn timeout(&self) -> ActionResult<Option<Duration>> {
        Ok(self
            .resolver
            .get_as::<f64>(keys::TIMEOUT)?
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64))
    }

    pub fn spawn_options(&self, shell: bool, timeout: Option<Duration>) -> SpawnOptions<'_> {
        SpawnOptions {
            cwd: &self.cwd,
            env: &self.env,
            shell,
            timeout,
        }
    }

    /// Runs a process, turning a non-zero exit into an error. In dry-run mode
    /// the command is only logged.
    pub fn run_process(
        &self,
        program: &str,
        args: &[String],
        shell: bool,
        timeout: Option<Duration>,
    ) -> ActionResult {
        let display = display_command(program, args);
        if self.dry_run() {
            log::info!("[dry-run] {}", display);
            return Ok(());
        }
        log::info!("{}", display);
        let code = self
            .run
            .spawner
            .spawn(program, args, &self.spawn_options(shell, timeout))?;
        if code != 0 {
            return Err(ActionError::ExitCode {
                command: display,
                code,
            });
        }
        Ok(())
    }

    /// Creates `dir` unless running dry.
    pub fn create_dir_all(&self, dir: &Path) -> ActionResult {
        if self.dry_run() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|e| ActionError::io(format!("Creating '{}'", dir.display()), e))
    }
}

fn display_command(program: &str, args: &[String]) -> String {
    let mut shown = program.to_string();
    for arg in args {
        shown.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            shown.push_str(&format!("'{}'", arg));
        } else {
            shown.push_str(arg);
        }
    }
    shown
}
