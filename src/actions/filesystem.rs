// src/actions/filesystem.rs

//! Remove, copy and move. Relative paths resolve against the action's `cwd`;
//! in dry-run mode every operation is only logged.

use crate::actions::{copy_path, path_list, remove_path};
use crate::constants::keys;
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::context::ActionContext;
use crate::core::paths;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes every path matched by `paths` (globs allowed). Missing paths are fine.
#[derive(Debug, Default)]
pub struct RemoveAction;

impl ActionBody for RemoveAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let entries = path_list(cx, keys::PATHS)?;
        if entries.is_empty() {
            return Err(ActionError::Malformed("remove action has no paths".to_string()));
        }
        for path in paths::expand_globs(&entries, &cx.cwd)? {
            if cx.dry_run() {
                log::info!("[dry-run] remove '{}'", path.display());
                continue;
            }
            log::info!("Removing '{}'", path.display());
            remove_path(&path)?;
        }
        Ok(())
    }
}

/// Copies `from` to `to`. When `to` is an existing directory, the source is
/// copied into it.
#[derive(Debug, Default)]
pub struct CopyAction;

impl ActionBody for CopyAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let (from, to) = endpoints(cx)?;
        if cx.dry_run() {
            warn_if_missing(&from);
            log::info!("[dry-run] copy '{}' to '{}'", from.display(), to.display());
            return Ok(());
        }
        require_source(&from)?;
        log::info!("Copying '{}' to '{}'", from.display(), to.display());
        copy_path(&from, &to)
    }
}

/// Moves `from` to `to`, falling back to copy and remove across devices.
#[derive(Debug, Default)]
pub struct MoveAction;

impl ActionBody for MoveAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let (from, to) = endpoints(cx)?;
        if cx.dry_run() {
            warn_if_missing(&from);
            log::info!("[dry-run] move '{}' to '{}'", from.display(), to.display());
            return Ok(());
        }
        require_source(&from)?;
        log::info!("Moving '{}' to '{}'", from.display(), to.display());
        if let Some(parent) = to.parent() {
            cx.create_dir_all(parent)?;
        }
        if let Err(e) = fs::rename(&from, &to) {
            log::debug!("rename failed ({}), copying instead", e);
            copy_path(&from, &to)?;
            remove_path(&from)?;
        }
        Ok(())
    }
}

/// Resolved `from` and `to`.
fn endpoints(cx: &ActionContext<'_>) -> ActionResult<(PathBuf, PathBuf)> {
    let from = cx.require_path(keys::FROM)?;
    let mut to = cx.require_path(keys::TO)?;
    if to.is_dir() {
        if let Some(name) = from.file_name() {
            to = to.join(name);
        }
    }
    Ok((from, to))
}

fn require_source(from: &Path) -> ActionResult {
    if from.exists() {
        Ok(())
    } else {
        Err(ActionError::Failed(format!("'{}' does not exist.", from.display())))
    }
}

/// In dry-run mode an earlier action may only have pretended to create `from`.
fn warn_if_missing(from: &Path) {
    if !from.exists() {
        log::warn!("[dry-run] '{}' does not exist yet", from.display());
    }
}
