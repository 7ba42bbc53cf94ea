// src/actions/compile.rs

use crate::actions::{path_list, program_and_args};
use crate::constants::{DEPENDENCY_CACHE_FILENAME, STATE_DIR, defaults, keys};
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::config_resolver::ConfigResolver;
use crate::core::context::{ActionContext, RunOptions};
use crate::core::dependencies::{IncrementalEngine, RebuildPolicy};
use crate::core::discovery::{CompilerRules, Discovery, PatternScanner};
use crate::core::{limiter, paths};
use anyhow::Context;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Compiles every source to an object file, skipping up-to-date ones in
/// incremental mode. Sources are compiled concurrently.
#[derive(Debug, Default)]
pub struct CompileAction;

/// Everything needed to build one compiler command line.
#[derive(Debug)]
struct Toolchain {
    compiler: String,
    /// `compilerArgs`, include paths and defines, in that order.
    flags: Vec<String>,
    compile_flag: String,
    output_flag: String,
}

impl Toolchain {
    fn resolve(resolver: &ConfigResolver<'_>) -> ActionResult<Self> {
        let (compiler, mut flags) = program_and_args(&resolver.require::<String>(keys::COMPILER)?)?;
        flags.extend(resolver.get_list_additive_as::<String>(keys::COMPILER_ARGS)?);

        let include_prefix =
            resolver.get_string_or(keys::INCLUDE_PATH_PREFIX, defaults::INCLUDE_PATH_PREFIX)?;
        for include in resolver.get_list_additive_as::<String>(keys::INCLUDE_PATHS)? {
            flags.push(format!("{}{}", include_prefix, include));
        }
        for (name, value) in resolver.get_object_additive(keys::DEFINES)? {
            match value {
                Value::Null | Value::Bool(true) => flags.push(format!("-D{}", name)),
                Value::Bool(false) => {}
                Value::String(s) => flags.push(format!("-D{}={}", name, s)),
                other => flags.push(format!("-D{}={}", name, other)),
            }
        }

        Ok(Self {
            compiler,
            flags,
            compile_flag: resolver.get_string_or(keys::COMPILE_FLAG, defaults::COMPILE_FLAG)?,
            output_flag: resolver.get_string_or(keys::OUTPUT_FLAG, defaults::OUTPUT_FLAG)?,
        })
    }

    fn command(&self, source: &Path, object: &Path) -> Vec<String> {
        let mut args = self.flags.clone();
        args.push(self.compile_flag.clone());
        args.push(source.to_string_lossy().into_owned());
        args.push(self.output_flag.clone());
        args.push(object.to_string_lossy().into_owned());
        args
    }
}

/// `output_dir/<source relative to cwd>` with the object extension.
pub fn object_path(source: &Path, cwd: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let relative: PathBuf = match source.strip_prefix(cwd) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => source
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect(),
    };
    output_dir
        .join(relative)
        .with_extension(extension.trim_start_matches('.'))
}

fn discovery<'a>(
    cx: &'a ActionContext<'a>,
    toolchain: &Toolchain,
) -> ActionResult<Discovery<'a>> {
    let resolver = &cx.resolver;
    let strategy = resolver.get_string_or(keys::DEPENDENCY_DISCOVERY, "none")?;
    match strategy.as_str() {
        "none" => Ok(Discovery::None),
        "compiler" => Ok(Discovery::Compiler(CompilerRules {
            spawner: cx.run.spawner,
            compiler: toolchain.compiler.clone(),
            args: toolchain.flags.clone(),
            dependency_flag: resolver
                .get_string_or(keys::DEPENDENCY_FLAG, defaults::DEPENDENCY_FLAG)?,
            env: &cx.env,
        })),
        "patterns" => {
            let include_paths = resolver
                .get_list_additive_as::<String>(keys::INCLUDE_PATHS)?
                .into_iter()
                .map(PathBuf::from)
                .collect();
            let scanner = PatternScanner::new(
                &resolver.get_list_additive_as::<String>(keys::INCLUDE_PATTERNS)?,
                &resolver.get_list_additive_as::<String>(keys::IMPORT_PATTERNS)?,
                include_paths,
                resolver.get_list_additive_as(keys::IMPORT_EXTENSIONS)?,
            )?;
            Ok(Discovery::Patterns(scanner))
        }
        other => Err(ActionError::Malformed(format!(
            "Unknown dependencyDiscovery '{}' (expected compiler, patterns or none).",
            other
        ))),
    }
}

impl ActionBody for CompileAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let resolver = &cx.resolver;
        let toolchain = Toolchain::resolve(resolver)?;
        let output_dir = cx.require_path(keys::OUTPUT_PATH)?;
        let extension = resolver.get_string_or(keys::OBJECT_EXTENSION, defaults::OBJECT_EXTENSION)?;

        let source_entries = path_list(cx, keys::SOURCE_PATHS)?;
        if source_entries.is_empty() {
            return Err(ActionError::Malformed("compile action has no sourcePaths".to_string()));
        }
        let sources = paths::expand_globs(&source_entries, &cx.cwd)?;
        if sources.is_empty() {
            log::warn!("No sources matched {:?}; nothing to compile.", source_entries);
            return Ok(());
        }

        let options = cx.run.options;
        let incremental = resolver
            .get_as::<bool>(keys::INCREMENTAL)?
            .unwrap_or(options.incremental);
        let parallel = resolver
            .get_as::<usize>(keys::PARALLEL)?
            .filter(|n| *n > 0)
            .or(options.parallel)
            .unwrap_or_else(RunOptions::default_parallelism);

        let rebuild_paths: Vec<String> = resolver.get_list_additive_as(keys::REBUILD_PATHS)?;
        let policy = RebuildPolicy {
            force: options.rebuild,
            patterns: paths::compile_patterns(&rebuild_paths, &cx.cwd)?,
        };
        let engine = IncrementalEngine::open(
            &cx.cwd,
            output_dir.join(STATE_DIR).join(DEPENDENCY_CACHE_FILENAME),
            policy,
            discovery(cx, &toolchain)?,
            incremental,
            cx.dry_run(),
        );

        let units: Vec<(PathBuf, PathBuf)> = sources
            .into_iter()
            .map(|source| {
                let object = object_path(&source, &cx.cwd, &output_dir, &extension);
                (source, object)
            })
            .collect();
        log::debug!(
            "Compiling up to {} source(s), {} at a time (incremental: {}).",
            units.len(),
            parallel,
            incremental
        );

        let tasks: Vec<_> = units
            .iter()
            .map(|(source, object)| {
                let (engine, toolchain) = (&engine, &toolchain);
                move || -> anyhow::Result<bool> {
                    compile_one(cx, engine, toolchain, source, object)
                        .with_context(|| format!("Compiling '{}'", source.display()))
                }
            })
            .collect();
        let results = limiter::run_bounded(tasks, parallel)
            .map_err(|e| ActionError::Failed(format!("{:#}", e)))?;

        let mut compiled = 0;
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(true) => compiled += 1,
                Ok(false) => {}
                Err(e) => errors.push(format!("{:#}", e)),
            }
        }

        engine.finish()?;

        if !errors.is_empty() {
            return Err(ActionError::Failed(format!(
                "{} of {} source(s) failed to compile:\n{}",
                errors.len(),
                units.len(),
                errors.join("\n")
            )));
        }
        log::info!(
            "{} of {} source(s) compiled, {} up to date.",
            compiled,
            units.len(),
            units.len() - compiled
        );
        Ok(())
    }
}

fn compile_one(
    cx: &ActionContext<'_>,
    engine: &IncrementalEngine<'_>,
    toolchain: &Toolchain,
    source: &Path,
    object: &Path,
) -> ActionResult<bool> {
    if !engine.should_compile(source, object)? {
        log::debug!("'{}' is up to date.", source.display());
        return Ok(false);
    }
    if let Some(parent) = object.parent() {
        cx.create_dir_all(parent)?;
    }
    cx.run_process(&toolchain.compiler, &toolchain.command(source, object), false, None)?;
    Ok(true)
}
