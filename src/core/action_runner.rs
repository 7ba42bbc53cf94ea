// src/core/action_runner.rs

//! # Action Runner
//!
//! Runs exactly one action instance. A runner is created per execution and goes
//! through *constructed → running → finished*. Construction picks the system
//! profile and may already mark the action malformed; `run` invokes the body
//! selected by the dispatcher and converts every error or panic into the
//! runner's `failed` / `malformed` state. Nothing escapes `run`.

use crate::core::cache::CacheError;
use crate::core::config_resolver::ConfigError;
use crate::core::context::{ActionContext, RunContext};
use crate::core::dependencies::DependencyError;
use crate::core::discovery::DiscoveryError;
use crate::core::dispatcher::{self, DispatchError};
use crate::core::graph::{ActionGraph, ActionId, ActionLink, ActionNode};
use crate::core::limiter::panic_message;
use crate::core::paths::PathError;
use crate::core::timer::BlockTimer;
use crate::models::{Action, SystemRef, System};
use crate::system::executor::ExecutionError;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{0}")]
    Malformed(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Command '{command}' exited with code {code}.")]
    ExitCode { command: String, code: i32 },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors caused by the configuration rather than the environment.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Malformed(_) | Self::Config(_) | Self::Path(PathError::Pattern { .. }) => true,
            Self::Dependency(DependencyError::Discovery(e)) => e.is_config(),
            _ => false,
        }
    }
}

impl From<DiscoveryError> for ActionError {
    fn from(e: DiscoveryError) -> Self {
        Self::Dependency(DependencyError::Discovery(e))
    }
}

pub type ActionResult<T = ()> = Result<T, ActionError>;

/// Outcome flags of a runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerState {
    pub failed: bool,
    pub malformed: bool,
}

/// Progress of an extern action's acquisition, for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Acquisition {
    pub needs_acquire: bool,
    pub acquired: bool,
}

/// A follow-up action to schedule. When `resume` is set, the scheduler hands
/// the emitting runner back with this entry and re-runs it right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub link: ActionLink,
    pub resume: bool,
}

impl FollowUp {
    pub fn new(link: ActionLink) -> Self {
        Self {
            link,
            resume: false,
        }
    }
}

/// The type-specific part of an action.
pub trait ActionBody: std::fmt::Debug {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult;

    /// Follow-ups after a run. Defaults to `default_follow_ups`.
    fn next_actions(&self, node: &ActionNode<'_>, state: RunnerState) -> Vec<FollowUp> {
        default_follow_ups(node, state)
    }

    fn acquisition(&self) -> Option<Acquisition> {
        None
    }
}

/// `nextAction` on success, `nextActionFailure` on failure, then always
/// `nextActionFinal`.
pub fn default_follow_ups(node: &ActionNode<'_>, state: RunnerState) -> Vec<FollowUp> {
    let branch = if state.failed {
        &node.next_failure
    } else {
        &node.next
    };
    branch
        .iter()
        .chain(node.next_final.iter())
        .cloned()
        .map(FollowUp::new)
        .collect()
}

#[derive(Debug)]
pub struct ActionRunner<'p> {
    id: ActionId,
    action: &'p Action,
    system: Option<&'p System>,
    body: Box<dyn ActionBody>,
    state: RunnerState,
}

impl<'p> ActionRunner<'p> {
    /// Creates the runner for `action`. A missing handler is an internal error;
    /// configuration problems leave the runner malformed instead.
    pub fn create(id: ActionId, action: &'p Action, run: &RunContext<'p>) -> Result<Self, DispatchError> {
        let definition = dispatcher::find_runner(action)?;
        let mut runner = Self {
            id,
            action,
            system: None,
            body: (definition.build)(),
            state: RunnerState::default(),
        };

        match resolve_system(action, run) {
            Ok(Some(system)) => runner.system = Some(system),
            Ok(None) if action.kind.requires_system() => runner.fail(
                &format!("a {} action needs a system and none is configured", action.kind),
                true,
            ),
            Ok(None) => {}
            Err(message) => runner.fail(&message, true),
        }
        Ok(runner)
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn action(&self) -> &'p Action {
        self.action
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn acquisition(&self) -> Option<Acquisition> {
        self.body.acquisition()
    }

    /// Runs the body once. A no-op when the runner has already failed.
    pub fn run(&mut self, run: &RunContext<'p>) {
        if self.state.failed {
            return;
        }
        let _timer = BlockTimer::new(self.action.label());
        log::debug!("Running {}", self.action.label());

        let cx = match ActionContext::new(run, self.action, self.system) {
            Ok(cx) => cx,
            Err(e) => {
                self.fail(&e.to_string(), e.is_malformed());
                return;
            }
        };

        let body = &mut self.body;
        match panic::catch_unwind(AssertUnwindSafe(|| body.run(&cx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.fail(&e.to_string(), e.is_malformed()),
            Err(payload) => self.fail(&format!("panicked: {}", panic_message(&*payload)), false),
        }
    }

    /// Marks the runner failed; `malformed` when the cause is configuration.
    pub fn fail(&mut self, message: &str, malformed: bool) {
        if malformed {
            log::error!("{} is malformed: {}", self.action.label(), message);
        } else {
            log::error!("{} failed: {}", self.action.label(), message);
        }
        self.state.failed = true;
        self.state.malformed |= malformed;
    }

    pub fn next_actions(&self, graph: &ActionGraph<'p>) -> Vec<FollowUp> {
        match graph.node(self.id) {
            Some(node) => self.body.next_actions(node, self.state),
            None => Vec::new(),
        }
    }
}

/// The action's own system, else the target's, else the project default.
fn resolve_system<'p>(action: &'p Action, run: &RunContext<'p>) -> Result<Option<&'p System>, String> {
    let by_name = |name: &str| {
        run.project
            .find_system(name)
            .map(Some)
            .ok_or_else(|| format!("system '{}' is not defined", name))
    };
    match &action.system {
        Some(SystemRef::Inline(system)) => Ok(Some(system.as_ref())),
        Some(SystemRef::Named(name)) => by_name(name),
        None => match run.target.system.as_deref().or(run.project.default_system.as_deref()) {
            Some(name) => by_name(name),
            None => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RunOptions;
    use crate::core::test_support::RecordingSpawner;
    use crate::models::{ActionKind, ActionRef, Project, Target};
    use serde_json::json;
    use std::path::PathBuf;

    fn run_context<'p>(
        project: &'p Project,
        target: &'p Target,
        spawner: &'p RecordingSpawner,
    ) -> RunContext<'p> {
        RunContext {
            project,
            target,
            root: PathBuf::from("/tmp"),
            options: RunOptions::default(),
            spawner,
            cache: None,
        }
    }

    fn shell(command: &str) -> Action {
        let mut action = Action::new(ActionKind::Shell);
        action
            .settings
            .insert("command".to_string(), json!(command));
        action
    }

    #[test]
    fn test_compile_without_any_system_is_malformed() {
        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = run_context(&project, &target, &spawner);
        let action = Action::new(ActionKind::Compile);

        let mut runner = ActionRunner::create(ActionId::from_index(0), &action, &run).unwrap();
        assert_eq!(runner.state(), RunnerState { failed: true, malformed: true });

        runner.run(&run);
        assert!(spawner.calls().is_empty());
    }

    #[test]
    fn test_unknown_system_name_is_malformed() {
        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = run_context(&project, &target, &spawner);
        let mut action = shell("true");
        action.system = Some(SystemRef::Named("nope".to_string()));

        let runner = ActionRunner::create(ActionId::from_index(0), &action, &run).unwrap();
        assert!(runner.state().malformed);
    }

    #[test]
    fn test_system_defaults_to_target_then_project() {
        let project: Project = serde_json::from_value(json!({
            "defaultSystem": "proj",
            "systems": [{ "name": "proj" }, { "name": "tgt" }]
        }))
        .unwrap();
        let spawner = RecordingSpawner::new();
        let action = Action::new(ActionKind::Link);

        let plain = Target::default();
        let run = run_context(&project, &plain, &spawner);
        let system = resolve_system(&action, &run).unwrap().unwrap();
        assert_eq!(system.name, "proj");

        let with_system = Target {
            system: Some("tgt".to_string()),
            ..Target::default()
        };
        let run = run_context(&project, &with_system, &spawner);
        let system = resolve_system(&action, &run).unwrap().unwrap();
        assert_eq!(system.name, "tgt");
    }

    #[test]
    fn test_failed_command_is_failure_not_malformed() {
        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::failing_with(1);
        let run = run_context(&project, &target, &spawner);
        let action = shell("false");

        let mut runner = ActionRunner::create(ActionId::from_index(0), &action, &run).unwrap();
        runner.run(&run);

        assert_eq!(runner.state(), RunnerState { failed: true, malformed: false });
        runner.run(&run);
        assert_eq!(spawner.calls().len(), 1);
    }

    #[test]
    fn test_default_follow_ups_branch_on_failure() {
        let mut action = shell("true");
        action.next_action = Some(ActionRef::Named("ok".to_string()));
        action.next_action_failure = Some(ActionRef::Named("bad".to_string()));
        action.next_action_final = Some(ActionRef::Named("final".to_string()));
        let project = Project {
            actions: vec![action],
            ..Project::default()
        };
        let mut graph = ActionGraph::build(&project);
        let roots = vec![ActionRef::Inline(Box::new(project.actions[0].clone()))];
        let links = graph.add_roots(&roots);
        let ActionLink::Resolved(id) = links[0] else {
            panic!("inline root must resolve");
        };
        let node = graph.node(id).unwrap();

        let ok = default_follow_ups(node, RunnerState::default());
        let names: Vec<_> = ok.iter().map(|f| f.link.clone()).collect();
        assert_eq!(
            names,
            vec![
                ActionLink::Unresolved("ok".to_string()),
                ActionLink::Unresolved("final".to_string())
            ]
        );

        let failed = default_follow_ups(node, RunnerState { failed: true, malformed: false });
        assert_eq!(failed[0].link, ActionLink::Unresolved("bad".to_string()));
        assert_eq!(failed.len(), 2);
    }

    #[test]
    fn test_malformed_errors_are_classified() {
        assert!(ActionError::Malformed("x".to_string()).is_malformed());
        assert!(
            ActionError::from(DiscoveryError::MissingNameGroup("p".to_string())).is_malformed()
        );
        assert!(!ActionError::Failed("x".to_string()).is_malformed());
        assert!(
            !ActionError::ExitCode {
                command: "cc".to_string(),
                code: 1
            }
            .is_malformed()
        );
    }
}
