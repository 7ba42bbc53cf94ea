// src/core/graph.rs

//! # Action Graph
//!
//! An arena of the action instances a run can reach. Each node gets an
//! `ActionId` assigned once: a named project action has a single id however
//! many places reference it, while an inline action gets its own id where it is
//! written. Two identical inline definitions are therefore distinct actions,
//! and an action that links back to itself is recognised by id.
//!
//! Nodes are interned with an explicit worklist, so arbitrarily long chains of
//! `nextAction` links never recurse.

use crate::models::{Action, ActionRef, Project};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Action '{0}' is not defined in the project.")]
    UnknownAction(String),
    #[error("Internal error: action id {0} is not in the graph.")]
    UnknownId(usize),
}

/// Identity of one action instance within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(usize);

impl ActionId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A reference from one action to another, resolved when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionLink {
    Resolved(ActionId),
    /// A name with no matching project action. Fails the run when reached.
    Unresolved(String),
}

/// An action and its resolved links.
#[derive(Debug)]
pub struct ActionNode<'p> {
    pub id: ActionId,
    pub action: &'p Action,
    pub next: Option<ActionLink>,
    pub next_failure: Option<ActionLink>,
    pub next_final: Option<ActionLink>,
    pub next_acquired: Option<ActionLink>,
    pub acquire: Vec<ActionLink>,
}

#[derive(Debug, Default)]
pub struct ActionGraph<'p> {
    nodes: Vec<ActionNode<'p>>,
    named: HashMap<&'p str, ActionId>,
    pending: Vec<ActionId>,
}

impl<'p> ActionGraph<'p> {
    /// Interns every named project action and everything reachable from them.
    pub fn build(project: &'p Project) -> Self {
        let mut graph = Self::default();
        for action in &project.actions {
            match action.name.as_deref() {
                Some(name) if !graph.named.contains_key(name) => {
                    let id = graph.push(action);
                    graph.named.insert(name, id);
                }
                Some(name) => log::warn!("Duplicate action name '{}'; keeping the first.", name),
                None => log::debug!("Skipping unnamed project-level {} action.", action.kind),
            }
        }
        graph.drain();
        log::trace!("Action graph holds {} node(s).", graph.nodes.len());
        graph
    }

    /// Interns a list of references (a target's actions) and returns their links.
    pub fn add_roots(&mut self, refs: &'p [ActionRef]) -> Vec<ActionLink> {
        let links: Vec<ActionLink> = refs.iter().map(|r| self.intern(r)).collect();
        self.drain();
        links
    }

    pub fn node(&self, id: ActionId) -> Option<&ActionNode<'p>> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<ActionId> {
        self.named.get(name).copied()
    }

    /// Follows a link to its node.
    pub fn resolve(&self, link: &ActionLink) -> Result<&ActionNode<'p>, GraphError> {
        match link {
            ActionLink::Resolved(id) => self.node(*id).ok_or(GraphError::UnknownId(id.0)),
            ActionLink::Unresolved(name) => Err(GraphError::UnknownAction(name.clone())),
        }
    }

    fn push(&mut self, action: &'p Action) -> ActionId {
        let id = ActionId(self.nodes.len());
        self.nodes.push(ActionNode {
            id,
            action,
            next: None,
            next_failure: None,
            next_final: None,
            next_acquired: None,
            acquire: Vec::new(),
        });
        self.pending.push(id);
        id
    }

    fn intern(&mut self, action_ref: &'p ActionRef) -> ActionLink {
        match action_ref {
            ActionRef::Named(name) => match self.named.get(name.as_str()) {
                Some(id) => ActionLink::Resolved(*id),
                None => ActionLink::Unresolved(name.clone()),
            },
            ActionRef::Inline(action) => ActionLink::Resolved(self.push(action)),
        }
    }

    fn intern_opt(&mut self, action_ref: Option<&'p ActionRef>) -> Option<ActionLink> {
        action_ref.map(|r| self.intern(r))
    }

    /// Resolves the links of every node added since the last drain.
    fn drain(&mut self) {
        while let Some(id) = self.pending.pop() {
            let Some(action) = self.node(id).map(|n| n.action) else {
                continue;
            };
            let next = self.intern_opt(action.next_action.as_ref());
            let next_failure = self.intern_opt(action.next_action_failure.as_ref());
            let next_final = self.intern_opt(action.next_action_final.as_ref());
            let next_acquired = self.intern_opt(action.next_action_acquired.as_ref());
            let acquire: Vec<ActionLink> = action
                .acquire_actions
                .iter()
                .map(|r| self.intern(r))
                .collect();

            if let Some(node) = self.nodes.get_mut(id.0) {
                node.next = next;
                node.next_failure = next_failure;
                node.next_final = next_final;
                node.next_acquired = next_acquired;
                node.acquire = acquire;
            }
        }
    }
}
