// src/core/scheduler.rs

//! # Action List Runner
//!
//! Executes a target's actions in order, expanding follow-up actions depth-first
//! without recursion. The whole mutable state is a stack of FIFO frames:
//!
//! - the target's actions start as one singleton frame each, pushed in reverse
//!   so the first action is on top;
//! - each run pops the next entry from the top frame (dropping the frame once it
//!   is empty) and pushes the runner's follow-ups as a new frame, so they run
//!   before the rest of the current frame;
//! - an entry may carry a suspended runner (an extern action waiting for its
//!   acquire actions), which is resumed right after the entry's own action.
//!
//! Every executed action is recorded in a history before it is checked, so the
//! cycle guard and the action-count guard both see it.

use crate::core::action_runner::ActionRunner;
use crate::core::context::RunContext;
use crate::core::graph::{ActionGraph, ActionId, ActionLink};
use std::collections::VecDeque;

/// One scheduled entry.
#[derive(Debug)]
struct QueuedAction<'p> {
    link: ActionLink,
    resume: Option<ActionRunner<'p>>,
}

#[derive(Debug)]
pub struct ActionListRunner<'p> {
    run: RunContext<'p>,
    graph: ActionGraph<'p>,
    stack: Vec<VecDeque<QueuedAction<'p>>>,
    history: Vec<ActionId>,
    failed: bool,
}

impl<'p> ActionListRunner<'p> {
    /// Prepares the run of `run.target`. Unknown top-level action names fail the
    /// run immediately.
    pub fn new(run: RunContext<'p>) -> Self {
        let mut graph = ActionGraph::build(run.project);
        let roots = graph.add_roots(&run.target.actions);
        if log::log_enabled!(log::Level::Debug) {
            let labels: Vec<String> = roots
                .iter()
                .filter_map(|link| graph.resolve(link).ok())
                .map(|node| node.action.label())
                .collect();
            log::debug!(
                "Target '{}': {} action(s) in graph, starting with [{}]",
                run.target.name,
                graph.len(),
                labels.join(", ")
            );
        }

        let mut failed = false;
        for link in &roots {
            if let ActionLink::Unresolved(name) = link {
                log::error!(
                    "Target '{}' references unknown action '{}'.",
                    run.target.name,
                    name
                );
                failed = true;
            }
        }

        let stack = if failed {
            Vec::new()
        } else {
            roots
                .into_iter()
                .rev()
                .map(|link| VecDeque::from([QueuedAction { link, resume: None }]))
                .collect()
        };

        Self {
            run,
            graph,
            stack,
            history: Vec::new(),
            failed,
        }
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// True once nothing is left to run.
    pub fn done(&self) -> bool {
        self.stack.is_empty()
    }

    /// The ids of the actions run so far, in order.
    pub fn history(&self) -> &[ActionId] {
        &self.history
    }

    pub fn graph(&self) -> &ActionGraph<'p> {
        &self.graph
    }

    /// Runs until the stack is empty or the run fails. Returns `true` on success.
    pub fn run(&mut self) -> bool {
        log::info!("Running target '{}'", self.run.target.name);
        while !self.failed {
            let Some(entry) = self.pop_next() else {
                break;
            };

            let node = match self.graph.resolve(&entry.link) {
                Ok(node) => node,
                Err(e) => {
                    log::error!("{}", e);
                    self.failed = true;
                    break;
                }
            };
            let (id, action) = (node.id, node.action);

            if !self.check_action(id) {
                break;
            }

            let runner = match ActionRunner::create(id, action, &self.run) {
                Ok(runner) => runner,
                Err(e) => {
                    log::error!("{}", e);
                    self.failed = true;
                    break;
                }
            };
            self.execute(runner);

            if let Some(suspended) = entry.resume {
                if self.failed {
                    break;
                }
                log::debug!("Resuming {}", suspended.action().label());
                self.execute(suspended);
            }
        }

        if self.failed {
            log::error!("Target '{}' failed.", self.run.target.name);
        } else {
            log::info!(
                "Target '{}' finished ({} action(s) run).",
                self.run.target.name,
                self.history.len()
            );
        }
        !self.failed
    }

    /// Next entry of the top frame. Empty frames never stay on the stack.
    fn pop_next(&mut self) -> Option<QueuedAction<'p>> {
        let frame = self.stack.last_mut()?;
        let entry = frame.pop_front();
        if frame.is_empty() {
            self.stack.pop();
        }
        entry
    }

    /// Records `id`, then applies the cycle and action-count guards.
    fn check_action(&mut self, id: ActionId) -> bool {
        self.history.push(id);
        let earlier = self.history.len().saturating_sub(1);

        if !self.run.options.allow_cycles
            && self.history.iter().take(earlier).any(|seen| *seen == id)
        {
            let label = self
                .graph
                .node(id)
                .map(|n| n.action.label())
                .unwrap_or_default();
            log::error!("Action cycle detected: {} was already run.", label);
            self.failed = true;
            return false;
        }

        if let Some(max) = self.run.options.max_actions {
            if self.history.len() > max {
                log::error!("Maximum number of actions ({}) exceeded.", max);
                self.failed = true;
                return false;
            }
        }
        true
    }

    /// Runs one runner and schedules its follow-ups.
    fn execute(&mut self, mut runner: ActionRunner<'p>) {
        runner.run(&self.run);

        let state = runner.state();
        if state.failed {
            if state.malformed {
                self.failed = true;
                return;
            }
            if runner.action().ignore_failure {
                log::warn!("Ignoring failure of {}.", runner.action().label());
            } else {
                self.failed = true;
                return;
            }
        }

        let follow_ups = runner.next_actions(&self.graph);
        if follow_ups.is_empty() {
            return;
        }
        let mut runner = Some(runner);
        let frame: VecDeque<QueuedAction<'p>> = follow_ups
            .into_iter()
            .map(|follow_up| QueuedAction {
                link: follow_up.link,
                resume: if follow_up.resume { runner.take() } else { None },
            })
            .collect();
        self.stack.push(frame);
    }
}
