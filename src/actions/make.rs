// src/actions/make.rs

use crate::constants::{defaults, keys};
use crate::core::action_runner::{ActionBody, ActionResult};
use crate::core::context::ActionContext;

/// Delegates to `make` (or a compatible program) in a directory.
#[derive(Debug, Default)]
pub struct MakeAction;

impl ActionBody for MakeAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let resolver = &cx.resolver;
        let program = resolver.get_string_or(keys::MAKE, defaults::MAKE)?;

        let mut args = Vec::new();
        if let Some(directory) = resolver.get_as::<String>(keys::DIRECTORY)? {
            args.push("-C".to_string());
            args.push(cx.resolve(&directory).to_string_lossy().into_owned());
        }
        args.extend(resolver.get_list_additive_as::<String>(keys::MAKE_ARGS)?);

        cx.run_process(&program, &args, false, cx.timeout()?)
    }
}
