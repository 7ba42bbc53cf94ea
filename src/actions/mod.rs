// src/actions/mod.rs

//! # Action Bodies
//!
//! One module per action type. Each body implements `ActionBody` and is
//! registered in `core::dispatcher::RUNNER_REGISTRY`.
//!
//! - **`compile`** / **`link`**: toolchain invocations, incremental by default.
//! - **`shell`** / **`make`**: external commands.
//! - **`fetch`** / **`extract`**: downloads and archive unpacking.
//! - **`filesystem`**: remove, copy and move.
//! - **`assert`**: existence checks.
//! - **`extern_dep`**: two-phase acquisition of external artifacts.

pub mod assert;
pub mod compile;
pub mod extern_dep;
pub mod extract;
pub mod fetch;
pub mod filesystem;
pub mod link;
pub mod make;
pub mod shell;

use crate::core::action_runner::{ActionError, ActionResult};
use crate::core::context::ActionContext;
use crate::models::OneOrMany;
use crate::system::executor::split_command_line;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// A path-list attribute (`"a"` or `["a", "b"]`), empty when unset.
pub(crate) fn path_list(cx: &ActionContext<'_>, key: &str) -> ActionResult<Vec<String>> {
    Ok(cx
        .resolver
        .get_as::<OneOrMany<String>>(key)?
        .map(OneOrMany::into_vec)
        .unwrap_or_default())
}

/// Splits a `compiler` / `linker` value such as `"ccache gcc"` into the program
/// and its leading arguments.
pub(crate) fn program_and_args(line: &str) -> ActionResult<(String, Vec<String>)> {
    split_command_line(line).map_err(|e| ActionError::Malformed(e.to_string()))
}

/// Copies a file, or a directory tree, to `to`. Parent directories are created.
pub(crate) fn copy_path(from: &Path, to: &Path) -> ActionResult {
    let io = |what: &str, path: &Path, e| ActionError::io(format!("{} '{}'", what, path.display()), e);

    if from.is_dir() {
        for entry in WalkDir::new(from) {
            let entry = entry.map_err(|e| {
                ActionError::Failed(format!("Walking '{}' failed: {}", from.display(), e))
            })?;
            let relative = entry.path().strip_prefix(from).map_err(|e| {
                ActionError::Failed(format!("Unexpected path '{}': {}", entry.path().display(), e))
            })?;
            let destination = to.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination).map_err(|e| io("Creating", &destination, e))?;
            } else {
                fs::copy(entry.path(), &destination).map_err(|e| io("Copying to", &destination, e))?;
            }
        }
        return Ok(());
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| io("Creating", parent, e))?;
    }
    fs::copy(from, to).map_err(|e| io("Copying", from, e))?;
    Ok(())
}

/// Removes a file or a directory tree. A missing path is not an error.
pub(crate) fn remove_path(path: &Path) -> ActionResult {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ActionError::io(format!("Removing '{}'", path.display()), e)),
    }
}
