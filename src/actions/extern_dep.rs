// src/actions/extern_dep.rs

//! # Extern Dependencies
//!
//! Two-phase acquisition of external artifacts. The first run checks which
//! requirements are already in place (on disk or in the blob cache). If any are
//! missing, the action's `acquireActions` are scheduled with the last of them
//! carrying this runner, so the scheduler runs it a second time once they are
//! done. The second run verifies the acquired outputs and moves them into
//! place.
//!
//! ```text
//! Initial ──▶ Satisfied
//!    │
//!    └──▶ NeedsAcquire ──(acquire actions)──▶ Acquired | Failed
//! ```

use crate::actions::copy_path;
use crate::constants::keys;
use crate::core::action_runner::{
    default_follow_ups, Acquisition, ActionBody, ActionError, ActionResult, FollowUp, RunnerState,
};
use crate::core::context::ActionContext;
use crate::core::graph::ActionNode;
use crate::models::Requirement;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Initial,
    NeedsAcquire,
    Satisfied,
    Acquired,
    Failed,
}

/// A requirement with its paths resolved against the action's `cwd`.
#[derive(Debug)]
struct TrackedRequirement {
    name: String,
    path: PathBuf,
    output: PathBuf,
    cache: bool,
    satisfied: bool,
}

#[derive(Debug, Default)]
pub struct ExternAction {
    phase: Phase,
    needs_acquire: bool,
    requirements: Vec<TrackedRequirement>,
}

impl ExternAction {
    fn acquired(&self) -> bool {
        matches!(self.phase, Phase::Satisfied | Phase::Acquired)
    }

    fn pre_check(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let requirements: Vec<Requirement> =
            cx.resolver.get_as(keys::REQUIREMENTS)?.unwrap_or_default();
        let action_cache = cx.resolver.get_bool_or(keys::CACHE, false)?;

        for requirement in requirements {
            let path = cx.resolve(&requirement.path.to_string_lossy());
            let output = cx.resolve(&requirement.output_path().to_string_lossy());
            let cache = requirement.cache || action_cache;

            let mut satisfied = path.exists();
            if !satisfied && cache {
                if let Some(hit) = cx.run.cache.and_then(|c| c.get_file(&requirement.name)) {
                    log::info!("Requirement '{}' restored from cache.", requirement.name);
                    if !cx.dry_run() {
                        copy_path(&hit.path, &path)?;
                    }
                    satisfied = true;
                }
            }

            self.requirements.push(TrackedRequirement {
                name: requirement.name,
                path,
                output,
                cache,
                satisfied,
            });
        }

        if self.requirements.iter().all(|r| r.satisfied) {
            log::info!("All requirements of {} are present.", cx.action.label());
            self.phase = Phase::Satisfied;
            return Ok(());
        }

        self.needs_acquire = true;
        self.phase = Phase::NeedsAcquire;
        let pending: Vec<&str> = self
            .requirements
            .iter()
            .filter(|r| !r.satisfied)
            .map(|r| r.name.as_str())
            .collect();
        log::info!("Acquiring {}", pending.join(", "));

        if cx.action.acquire_actions.is_empty() {
            return self.post_check(cx);
        }
        Ok(())
    }

    fn post_check(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        if cx.dry_run() {
            log::info!("[dry-run] assuming requirements of {} were acquired", cx.action.label());
            self.requirements.iter_mut().for_each(|r| r.satisfied = true);
            self.phase = Phase::Acquired;
            return Ok(());
        }

        let mut missing = Vec::new();
        for requirement in self.requirements.iter_mut().filter(|r| !r.satisfied) {
            if !requirement.output.exists() {
                missing.push(format!("'{}' ({})", requirement.name, requirement.output.display()));
                continue;
            }
            if requirement.cache && requirement.output.is_file() {
                if let Some(cache) = cx.run.cache {
                    cache.add_file(&requirement.name, Some(&requirement.output))?;
                }
            }
            if requirement.output != requirement.path {
                copy_path(&requirement.output, &requirement.path)?;
            }
            requirement.satisfied = true;
        }

        if !missing.is_empty() {
            self.phase = Phase::Failed;
            return Err(ActionError::Failed(format!(
                "Acquisition did not produce {}.",
                missing.join(", ")
            )));
        }
        self.phase = Phase::Acquired;
        Ok(())
    }
}

impl ActionBody for ExternAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        match self.phase {
            Phase::Initial => self.pre_check(cx),
            Phase::NeedsAcquire => self.post_check(cx),
            Phase::Satisfied | Phase::Acquired | Phase::Failed => Ok(()),
        }
    }

    fn next_actions(&self, node: &ActionNode<'_>, state: RunnerState) -> Vec<FollowUp> {
        if !state.failed && self.phase == Phase::NeedsAcquire {
            let last = node.acquire.len().saturating_sub(1);
            return node
                .acquire
                .iter()
                .enumerate()
                .map(|(i, link)| FollowUp {
                    link: link.clone(),
                    resume: i == last,
                })
                .collect();
        }

        let mut follow_ups = Vec::new();
        if !state.failed && self.acquired() {
            follow_ups.extend(node.next_acquired.iter().cloned().map(FollowUp::new));
        }
        follow_ups.extend(default_follow_ups(node, state));
        follow_ups
    }

    fn acquisition(&self) -> Option<Acquisition> {
        Some(Acquisition {
            needs_acquire: self.needs_acquire,
            acquired: self.acquired(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{action, context, run_context};
    use crate::core::cache::{BlobCache, DirectoryCache};
    use crate::core::context::{RunContext, RunOptions};
    use crate::core::graph::ActionGraph;
    use crate::core::scheduler::ActionListRunner;
    use crate::core::test_support::RecordingSpawner;
    use crate::models::{Action, ActionKind, ActionRef, Project, Target};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn inline(action: Action) -> ActionRef {
        ActionRef::Inline(Box::new(action))
    }

    fn shell(command: &str) -> Action {
        action(ActionKind::Shell, json!({ "command": command }))
    }

    /// An extern action for `third_party/lib.a`, acquired into `dl/lib.a` by
    /// copying `seed` when `seed` exists.
    fn extern_lib() -> Action {
        let mut ext = action(
            ActionKind::Extern,
            json!({
                "requirements": [{ "name": "lib", "path": "third_party/lib.a", "output": "dl/lib.a" }]
            }),
        );
        ext.name = Some("lib".to_string());
        ext.acquire_actions = vec![
            inline(shell("echo acquiring")),
            inline(action(ActionKind::Copy, json!({ "from": "seed", "to": "dl/lib.a" }))),
        ];
        ext.next_action_acquired = Some(inline(shell("echo acquired")));
        ext.next_action = Some(inline(shell("echo next")));
        ext
    }

    fn run_target(project: &Project, spawner: &RecordingSpawner, root: &std::path::Path) -> bool {
        let target = Target {
            name: "deps".to_string(),
            actions: vec![ActionRef::Named("lib".to_string())],
            ..Target::default()
        };
        let mut runner = ActionListRunner::new(run_context(
            project,
            &target,
            spawner,
            root,
            RunOptions::default(),
        ));
        runner.run()
    }

    fn programs(spawner: &RecordingSpawner) -> Vec<String> {
        spawner.calls().into_iter().map(|c| c.program).collect()
    }

    #[test]
    fn test_present_requirement_is_satisfied_without_acquiring() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("third_party")).unwrap();
        fs::write(dir.path().join("third_party/lib.a"), "lib").unwrap();
        let project = Project {
            actions: vec![extern_lib()],
            ..Project::default()
        };
        let spawner = RecordingSpawner::new();

        // --- Execute ---
        let ok = run_target(&project, &spawner, dir.path());

        // --- Assert ---
        assert!(ok);
        assert_eq!(programs(&spawner), vec!["echo acquired", "echo next"]);
    }

    #[test]
    fn test_missing_requirement_is_acquired_then_copied_into_place() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("seed"), "built").unwrap();
        let project = Project {
            actions: vec![extern_lib()],
            ..Project::default()
        };
        let spawner = RecordingSpawner::new();

        // --- Execute ---
        let ok = run_target(&project, &spawner, dir.path());

        // --- Assert ---
        assert!(ok);
        assert_eq!(
            programs(&spawner),
            vec!["echo acquiring", "echo acquired", "echo next"]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("third_party/lib.a")).unwrap(),
            "built"
        );
    }

    #[test]
    fn test_acquisition_without_output_fails() {
        let dir = tempdir().unwrap();
        let mut ext = extern_lib();
        ext.acquire_actions = vec![inline(shell("echo acquiring"))];
        let project = Project {
            actions: vec![ext],
            ..Project::default()
        };
        let spawner = RecordingSpawner::new();

        let ok = run_target(&project, &spawner, dir.path());

        assert!(!ok);
        assert_eq!(programs(&spawner), vec!["echo acquiring"]);
        assert!(!dir.path().join("third_party/lib.a").exists());
    }

    #[test]
    fn test_flags_and_follow_ups_of_each_phase() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let project = Project {
            actions: vec![extern_lib()],
            ..Project::default()
        };
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = run_context(&project, &target, &spawner, dir.path(), RunOptions::default());
        let graph = ActionGraph::build(&project);
        let node = graph.node(graph.id_of("lib").unwrap()).unwrap();
        let ext = &project.actions[0];
        let mut body = ExternAction::default();

        // --- Execute: first phase ---
        body.run(&context(&run, ext)).unwrap();

        // --- Assert ---
        assert_eq!(
            body.acquisition(),
            Some(Acquisition { needs_acquire: true, acquired: false })
        );
        let follow_ups = body.next_actions(node, RunnerState::default());
        assert_eq!(follow_ups.len(), 2);
        assert!(!follow_ups[0].resume);
        assert!(follow_ups[1].resume);

        // --- Execute: second phase, output now present ---
        fs::create_dir_all(dir.path().join("dl")).unwrap();
        fs::write(dir.path().join("dl/lib.a"), "x").unwrap();
        body.run(&context(&run, ext)).unwrap();

        // --- Assert ---
        assert_eq!(
            body.acquisition(),
            Some(Acquisition { needs_acquire: true, acquired: true })
        );
        let follow_ups = body.next_actions(node, RunnerState::default());
        assert_eq!(follow_ups.len(), 2);
        assert!(follow_ups.iter().all(|f| !f.resume));
    }

    #[test]
    fn test_post_check_without_output_fails_unacquired() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut ext = extern_lib();
        ext.next_action_failure = Some(inline(shell("echo recover")));
        let project = Project {
            actions: vec![ext],
            ..Project::default()
        };
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = run_context(&project, &target, &spawner, dir.path(), RunOptions::default());
        let graph = ActionGraph::build(&project);
        let node = graph.node(graph.id_of("lib").unwrap()).unwrap();
        let ext = &project.actions[0];
        let mut body = ExternAction::default();
        body.run(&context(&run, ext)).unwrap();

        // --- Execute: second phase, output still absent ---
        let err = body.run(&context(&run, ext)).unwrap_err();

        // --- Assert ---
        assert!(!err.is_malformed());
        assert_eq!(
            body.acquisition(),
            Some(Acquisition { needs_acquire: true, acquired: false })
        );
        let failed = RunnerState { failed: true, malformed: false };
        let follow_ups = body.next_actions(node, failed);
        assert_eq!(follow_ups.len(), 1);
        assert_eq!(Some(&follow_ups[0].link), node.next_failure.as_ref());
        assert_ne!(Some(&follow_ups[0].link), node.next_acquired.as_ref());
        assert!(!follow_ups[0].resume);
    }

    #[test]
    fn test_cached_requirement_is_restored_and_acquired_one_is_cached() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("cache"));
        let mut ext = action(
            ActionKind::Extern,
            json!({
                "cache": true,
                "requirements": [{ "name": "zlib", "path": "deps/zlib.a" }]
            }),
        );
        ext.name = Some("zlib".to_string());
        let project = Project {
            actions: vec![ext],
            ..Project::default()
        };
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = RunContext {
            cache: Some(&cache),
            ..run_context(&project, &target, &spawner, dir.path(), RunOptions::default())
        };
        let ext = &project.actions[0];

        // --- Execute: no acquire actions and nothing on disk ---
        let mut body = ExternAction::default();
        let err = body.run(&context(&run, ext)).unwrap_err();
        assert!(!err.is_malformed());

        // --- Execute: once the artifact exists, it lands in the cache ---
        fs::create_dir_all(dir.path().join("deps")).unwrap();
        fs::write(dir.path().join("deps/zlib.a"), "z").unwrap();
        let mut body = ExternAction::default();
        body.run(&context(&run, ext)).unwrap();
        assert!(cache.get_file("zlib").is_none());

        // --- Execute: a fresh checkout restores from the cache ---
        let seed = dir.path().join("seed");
        fs::write(&seed, "cached").unwrap();
        cache.add_file("zlib", Some(&seed)).unwrap();
        fs::remove_file(dir.path().join("deps/zlib.a")).unwrap();
        let mut body = ExternAction::default();
        body.run(&context(&run, ext)).unwrap();

        // --- Assert ---
        assert_eq!(
            body.acquisition(),
            Some(Acquisition { needs_acquire: false, acquired: true })
        );
        assert_eq!(fs::read_to_string(dir.path().join("deps/zlib.a")).unwrap(), "cached");
    }

    #[test]
    fn test_dry_run_assumes_acquisition() {
        let dir = tempdir().unwrap();
        let project = Project {
            actions: vec![extern_lib()],
            ..Project::default()
        };
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let run = run_context(&project, &target, &spawner, dir.path(), options);
        let ext = &project.actions[0];
        let mut body = ExternAction::default();

        body.run(&context(&run, ext)).unwrap();
        body.run(&context(&run, ext)).unwrap();

        assert_eq!(
            body.acquisition(),
            Some(Acquisition { needs_acquire: true, acquired: true })
        );
    }
}
