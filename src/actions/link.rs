// src/actions/link.rs

use crate::actions::{path_list, program_and_args};
use crate::constants::{defaults, keys};
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::context::ActionContext;
use crate::core::dependencies::FilesModifiedCache;
use crate::core::paths;
use std::path::{Path, PathBuf};

/// Links object files into one output with a single linker invocation.
#[derive(Debug, Default)]
pub struct LinkAction;

impl ActionBody for LinkAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let resolver = &cx.resolver;
        let (linker, mut args) = program_and_args(&resolver.require::<String>(keys::LINKER)?)?;
        let output = cx.require_path(keys::OUTPUT_PATH)?;

        let object_entries = path_list(cx, keys::OBJECT_PATHS)?;
        if object_entries.is_empty() {
            return Err(ActionError::Malformed("link action has no objectPaths".to_string()));
        }
        let objects = paths::expand_globs(&object_entries, &cx.cwd)?;
        if objects.is_empty() && cx.dry_run() {
            log::info!(
                "[dry-run] link {:?} into '{}' (no objects on disk yet)",
                object_entries,
                output.display()
            );
            return Ok(());
        }
        if objects.is_empty() {
            return Err(ActionError::Failed(format!(
                "No object files matched {:?}.",
                object_entries
            )));
        }

        let incremental = resolver
            .get_as::<bool>(keys::INCREMENTAL)?
            .unwrap_or(cx.run.options.incremental);
        if incremental && !cx.run.options.rebuild && is_up_to_date(&output, &objects, cx) {
            log::info!("'{}' is up to date.", output.display());
            return Ok(());
        }

        args.extend(resolver.get_list_additive_as::<String>(keys::LINKER_ARGS)?);
        args.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
        args.push(resolver.get_string_or(keys::OUTPUT_FLAG, defaults::OUTPUT_FLAG)?);
        args.push(output.to_string_lossy().into_owned());

        let library_path_prefix =
            resolver.get_string_or(keys::LIBRARY_PATH_PREFIX, defaults::LIBRARY_PATH_PREFIX)?;
        for dir in resolver.get_list_additive_as::<String>(keys::LIBRARY_PATHS)? {
            args.push(format!("{}{}", library_path_prefix, dir));
        }
        let library_prefix = resolver.get_string_or(keys::LIBRARY_PREFIX, defaults::LIBRARY_PREFIX)?;
        for library in resolver.get_list_additive_as::<String>(keys::LIBRARIES)? {
            args.push(format!("{}{}", library_prefix, library));
        }

        if let Some(parent) = output.parent() {
            cx.create_dir_all(parent)?;
        }
        log::info!("Linking {} object(s) into '{}'", objects.len(), output.display());
        cx.run_process(&linker, &args, false, None)
    }
}

/// The output exists and is strictly newer than every object.
fn is_up_to_date(output: &Path, objects: &[PathBuf], cx: &ActionContext<'_>) -> bool {
    let times = FilesModifiedCache::new(&cx.cwd);
    let output_time = times.modified_time(output);
    output_time > 0 && objects.iter().all(|o| times.modified_time(o) < output_time)
}
