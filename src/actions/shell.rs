// src/actions/shell.rs

use crate::actions::path_list;
use crate::constants::keys;
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::context::ActionContext;

/// Runs one or more command lines through the platform shell, in order. The
/// first failing command stops the action.
#[derive(Debug, Default)]
pub struct ShellAction;

impl ActionBody for ShellAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let commands = path_list(cx, keys::COMMAND)?;
        if commands.is_empty() {
            return Err(ActionError::Malformed("shell action has no command".to_string()));
        }
        let timeout = cx.timeout()?;
        for command in &commands {
            cx.run_process(command, &[], true, timeout)?;
        }
        Ok(())
    }
}
