// src/actions/assert.rs

use crate::actions::path_list;
use crate::constants::keys;
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::context::ActionContext;

/// Checks that `exists` paths are present and `notExists` paths are absent.
/// In dry-run mode violations are only warned about, since earlier actions
/// did not really run.
#[derive(Debug, Default)]
pub struct AssertAction;

impl ActionBody for AssertAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let mut violations = Vec::new();
        for raw in path_list(cx, keys::EXISTS)? {
            let path = cx.resolve(&raw);
            if !path.exists() {
                violations.push(format!("'{}' does not exist", path.display()));
            }
        }
        for raw in path_list(cx, keys::NOT_EXISTS)? {
            let path = cx.resolve(&raw);
            if path.exists() {
                violations.push(format!("'{}' exists", path.display()));
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        let message = format!("Assertion failed: {}.", violations.join(", "));
        if cx.dry_run() {
            log::warn!("[dry-run] {}", message);
            return Ok(());
        }
        Err(ActionError::Failed(message))
    }
}
