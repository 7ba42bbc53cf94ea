// src/core/dispatcher.rs

use crate::actions::{
    assert::AssertAction, compile::CompileAction, extern_dep::ExternAction,
    extract::ExtractAction, fetch::FetchAction, filesystem::{CopyAction, MoveAction, RemoveAction},
    link::LinkAction, make::MakeAction, shell::ShellAction,
};
use crate::core::action_runner::ActionBody;
use crate::models::{Action, ActionKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Internal error: no runner handles {0} actions.")]
    NoRunner(ActionKind),
}

/// A handler type: a predicate over actions and a constructor for its body.
pub struct RunnerDefinition {
    pub name: &'static str,
    pub matches: fn(&Action) -> bool,
    pub build: fn() -> Box<dyn ActionBody>,
}

impl std::fmt::Debug for RunnerDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn boxed<T: ActionBody + Default + 'static>() -> Box<dyn ActionBody> {
    Box::new(T::default())
}

/// Every handler type. Predicates are keyed on the type tag and never overlap.
pub static RUNNER_REGISTRY: &[RunnerDefinition] = &[
    RunnerDefinition {
        name: "compile",
        matches: |a| a.kind == ActionKind::Compile,
        build: boxed::<CompileAction>,
    },
    RunnerDefinition {
        name: "link",
        matches: |a| a.kind == ActionKind::Link,
        build: boxed::<LinkAction>,
    },
    RunnerDefinition {
        name: "shell",
        matches: |a| a.kind == ActionKind::Shell,
        build: boxed::<ShellAction>,
    },
    RunnerDefinition {
        name: "make",
        matches: |a| a.kind == ActionKind::Make,
        build: boxed::<MakeAction>,
    },
    RunnerDefinition {
        name: "fetch",
        matches: |a| a.kind == ActionKind::Fetch,
        build: boxed::<FetchAction>,
    },
    RunnerDefinition {
        name: "extract",
        matches: |a| a.kind == ActionKind::Extract,
        build: boxed::<ExtractAction>,
    },
    RunnerDefinition {
        name: "remove",
        matches: |a| a.kind == ActionKind::Remove,
        build: boxed::<RemoveAction>,
    },
    RunnerDefinition {
        name: "copy",
        matches: |a| a.kind == ActionKind::Copy,
        build: boxed::<CopyAction>,
    },
    RunnerDefinition {
        name: "move",
        matches: |a| a.kind == ActionKind::Move,
        build: boxed::<MoveAction>,
    },
    RunnerDefinition {
        name: "assert",
        matches: |a| a.kind == ActionKind::Assert,
        build: boxed::<AssertAction>,
    },
    RunnerDefinition {
        name: "extern",
        matches: |a| a.kind == ActionKind::Extern,
        build: boxed::<ExternAction>,
    },
];

/// The first registered handler whose predicate matches `action`.
pub fn find_runner(action: &Action) -> Result<&'static RunnerDefinition, DispatchError> {
    RUNNER_REGISTRY
        .iter()
        .find(|def| (def.matches)(action))
        .ok_or(DispatchError::NoRunner(action.kind))
}
