// src/core/config_resolver.rs

//! # Config Resolver
//!
//! A read-only view over the four configuration levels an action runs under:
//! project, system, target and action. Three resolution modes exist:
//!
//! - **override** (`get`): the most specific level that defines the key wins,
//!   checked action → system → target → project.
//! - **additive** (`get_list_additive`, `get_object_additive`): values from every
//!   level are merged, least specific first (project → system → target → action).
//! - **cumulative path** (`get_path`): each level's value is resolved relative to
//!   the result of the previous level, folding project → target → system → action.

use crate::core::paths;
use crate::models::Settings;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attribute '{key}' has an invalid value: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Attribute '{key}' must be {expected}.")]
    UnexpectedType { key: String, expected: &'static str },
    #[error("Required attribute '{key}' is not defined at any level.")]
    Missing { key: String },
}

type ConfigResult<T> = Result<T, ConfigError>;

/// One of the four configuration levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Project,
    System,
    Target,
    Action,
}

const OVERRIDE_ORDER: [Level; 4] = [Level::Action, Level::System, Level::Target, Level::Project];
const ADDITIVE_ORDER: [Level; 4] = [Level::Project, Level::System, Level::Target, Level::Action];
const PATH_ORDER: [Level; 4] = [Level::Project, Level::Target, Level::System, Level::Action];

/// Layered attribute lookup. Never mutated after construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigResolver<'a> {
    project: Option<&'a Settings>,
    system: Option<&'a Settings>,
    target: Option<&'a Settings>,
    action: Option<&'a Settings>,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(
        project: Option<&'a Settings>,
        system: Option<&'a Settings>,
        target: Option<&'a Settings>,
        action: Option<&'a Settings>,
    ) -> Self {
        Self {
            project,
            system,
            target,
            action,
        }
    }

    fn level(&self, level: Level) -> Option<&'a Settings> {
        match level {
            Level::Project => self.project,
            Level::System => self.system,
            Level::Target => self.target,
            Level::Action => self.action,
        }
    }

    fn values_in(&self, order: [Level; 4], key: &str) -> impl Iterator<Item = &'a Value> + '_ {
        let key = key.to_string();
        order
            .into_iter()
            .filter_map(move |level| self.level(level).and_then(|s| s.get(&key)))
            .filter(|v| !v.is_null())
    }

    // --- Override resolution ---

    /// Returns the value of the most specific level that defines `key`.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.values_in(OVERRIDE_ORDER, key).next()
    }

    /// Like `get`, but returns `fallback` when no level defines `key`.
    pub fn get_or<'b>(&self, key: &str, fallback: &'b Value) -> &'b Value
    where
        'a: 'b,
    {
        self.get(key).unwrap_or(fallback)
    }

    /// Deserializes the most specific value for `key` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        self.get(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|source| ConfigError::InvalidValue {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Like `get_as`, but a missing key is an error.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<T> {
        self.get_as(key)?.ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    /// A string attribute with a default.
    pub fn get_string_or(&self, key: &str, fallback: &str) -> ConfigResult<String> {
        Ok(self
            .get_as::<String>(key)?
            .unwrap_or_else(|| fallback.to_string()))
    }

    /// A boolean attribute with a default.
    pub fn get_bool_or(&self, key: &str, fallback: bool) -> ConfigResult<bool> {
        Ok(self.get_as::<bool>(key)?.unwrap_or(fallback))
    }

    // --- Additive resolution ---

    /// Concatenates list values across project → system → target → action.
    /// A scalar at some level counts as a one-element list.
    pub fn get_list_additive(&self, key: &str) -> Vec<&'a Value> {
        let mut merged = Vec::new();
        for value in self.values_in(ADDITIVE_ORDER, key) {
            match value {
                Value::Array(items) => merged.extend(items.iter()),
                other => merged.push(other),
            }
        }
        merged
    }

    /// `get_list_additive` deserialized element by element.
    pub fn get_list_additive_as<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Vec<T>> {
        self.get_list_additive(key)
            .into_iter()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|source| ConfigError::InvalidValue {
                    key: key.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Merges object values across project → system → target → action. Later
    /// levels overwrite duplicate member keys.
    pub fn get_object_additive(&self, key: &str) -> ConfigResult<Map<String, Value>> {
        let mut merged = Map::new();
        for value in self.values_in(ADDITIVE_ORDER, key) {
            let object = value.as_object().ok_or_else(|| ConfigError::UnexpectedType {
                key: key.to_string(),
                expected: "an object",
            })?;
            for (member, v) in object {
                merged.insert(member.clone(), v.clone());
            }
        }
        Ok(merged)
    }

    // --- Cumulative path resolution ---

    /// Resolves a path attribute cumulatively: starting at `base_path`, each level
    /// that defines `key` (project → target → system → action) is resolved relative
    /// to the previous result. Absolute values restart the chain; `~` and
    /// environment variables are expanded.
    pub fn get_path(&self, key: &str, base_path: &Path) -> ConfigResult<PathBuf> {
        let mut resolved = base_path.to_path_buf();
        for value in self.values_in(PATH_ORDER, key) {
            let raw = value.as_str().ok_or_else(|| ConfigError::UnexpectedType {
                key: key.to_string(),
                expected: "a path string",
            })?;
            let expanded = paths::expand_path(raw);
            log::trace!(
                "Path '{}': '{}' relative to '{}'.",
                key,
                expanded.display(),
                resolved.display()
            );
            resolved = resolved.join(expanded);
        }
        Ok(resolved)
    }
}
