// src/models.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A free-form attribute map. Each configuration level carries one and the
/// `ConfigResolver` reads keys from them.
pub type Settings = Map<String, Value>;

// --- PROJECT CONFIGURATION MODELS (What is read from rivet.toml / rivet.json) ---

/// The root of a build configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: Option<String>,
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub targets: Vec<Target>,
    pub default_system: Option<String>,

    #[serde(default)]
    pub allow_action_cycles: bool,
    pub run_max_actions: Option<usize>,
    pub parallel: Option<usize>,
    #[serde(default)]
    pub rebuild: bool,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub dry_run: bool,

    #[serde(flatten)]
    pub settings: Settings,
}

impl Project {
    /// Looks up a system profile by name.
    pub fn find_system(&self, name: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.name == name)
    }

    /// Looks up a named action.
    pub fn find_action(&self, name: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
    }

    /// Looks up a target by name.
    pub fn find_target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// A named toolchain profile (compiler, linker, prefixes, discovery hints).
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub name: String,
    #[serde(flatten)]
    pub settings: Settings,
}

/// A named, ordered list of actions; the unit the CLI invokes.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionRef>,
    pub system: Option<String>,
    #[serde(flatten)]
    pub settings: Settings,
}

/// Either the name of a project-level action or an inline action definition.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ActionRef {
    Named(String),
    Inline(Box<Action>),
}

/// Either the name of a project system or an inline system definition.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum SystemRef {
    Named(String),
    Inline(Box<System>),
}

/// The type tag of an action. Selects the handler that runs it.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Compile,
    Fetch,
    Link,
    Remove,
    Shell,
    Extract,
    Make,
    Extern,
    Assert,
    Copy,
    Move,
}

impl ActionKind {
    /// Every action kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Compile,
        Self::Fetch,
        Self::Link,
        Self::Remove,
        Self::Shell,
        Self::Extract,
        Self::Make,
        Self::Extern,
        Self::Assert,
        Self::Copy,
        Self::Move,
    ];

    /// Compile and link actions cannot run without a system profile.
    pub fn requires_system(self) -> bool {
        matches!(self, Self::Compile | Self::Link)
    }

    /// The lowercase name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Fetch => "fetch",
            Self::Link => "link",
            Self::Remove => "remove",
            Self::Shell => "shell",
            Self::Extract => "extract",
            Self::Make => "make",
            Self::Extern => "extern",
            Self::Assert => "assert",
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative unit of build work.
///
/// Only the fields the engine itself interprets are typed; everything else
/// lands in `settings` and is read through the `ConfigResolver`.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub name: Option<String>,
    pub system: Option<SystemRef>,
    pub next_action: Option<ActionRef>,
    pub next_action_failure: Option<ActionRef>,
    pub next_action_final: Option<ActionRef>,
    #[serde(default)]
    pub ignore_failure: bool,

    // Extern only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acquire_actions: Vec<ActionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_acquired: Option<ActionRef>,

    #[serde(flatten)]
    pub settings: Settings,
}

impl Action {
    /// Creates an action of the given kind with no links and no settings.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            name: None,
            system: None,
            next_action: None,
            next_action_failure: None,
            next_action_final: None,
            ignore_failure: false,
            acquire_actions: Vec::new(),
            next_action_acquired: None,
            settings: Settings::new(),
        }
    }

    /// A name for log lines: the action's own name or its type.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.kind),
            None => format!("<inline {}>", self.kind),
        }
    }
}

/// An attribute that may be written as a single item or as a list.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// One externally acquired artifact required by an extern action.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Cache key and display name.
    pub name: String,
    /// Final location of the artifact.
    pub path: PathBuf,
    /// Where the acquire actions leave the artifact. Defaults to `path`.
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub cache: bool,
}

impl Requirement {
    /// The path checked after acquisition.
    pub fn output_path(&self) -> &PathBuf {
        self.output.as_ref().unwrap_or(&self.path)
    }
}
