// src/core/config_loader.rs

//! # Config Loader
//!
//! Reads a project file (`rivet.toml` or `rivet.json`) into a `Project` and
//! runs the structural checks the engine relies on. Schema validation beyond
//! what serde enforces is left to the file format.

use crate::constants::PROJECT_CONFIG_FILENAMES;
use crate::models::Project;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("No project file ({}) found in '{}'.", PROJECT_CONFIG_FILENAMES.join(", "), .0.display())]
    NotFound(PathBuf),
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML file at '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON file at '{path}': {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported project file extension: '{0}' (expected .toml or .json).")]
    UnsupportedFormat(PathBuf),
    #[error("Duplicate {kind} name '{name}'.")]
    Duplicate { kind: &'static str, name: String },
}

/// A parsed project and the directory relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub project: Project,
    pub root: PathBuf,
    pub config_path: PathBuf,
}

/// Returns the first project file present in `dir`.
pub fn find_config(dir: &Path) -> Result<PathBuf, LoaderError> {
    PROJECT_CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| LoaderError::NotFound(dir.to_path_buf()))
}

/// Loads and checks the project file at `path`.
pub fn load_project(path: &Path) -> Result<LoadedProject, LoaderError> {
    log::debug!("Loading project file '{}'", path.display());
    let content = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let project: Project = match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|source| LoaderError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?,
        "json" => serde_json::from_str(&content).map_err(|source| LoaderError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?,
        _ => return Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    };
    check_unique_names(&project)?;

    let config_path = dunce::canonicalize(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    log::debug!(
        "Loaded {} target(s), {} action(s), {} system(s) from '{}'",
        project.targets.len(),
        project.actions.len(),
        project.systems.len(),
        config_path.display()
    );
    Ok(LoadedProject {
        project,
        root,
        config_path,
    })
}

fn check_unique_names(project: &Project) -> Result<(), LoaderError> {
    unique("target", project.targets.iter().map(|t| t.name.as_str()))?;
    unique("action", project.actions.iter().filter_map(|a| a.name.as_deref()))?;
    unique("system", project.systems.iter().map(|s| s.name.as_str()))
}

fn unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), LoaderError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(LoaderError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, ActionRef};
    use tempfile::tempdir;

    const TOML_PROJECT: &str = r#"
        name = "demo"
        defaultSystem = "gcc"
        incremental = true
        parallel = 4
        outputPath = "build"

        [[systems]]
        name = "gcc"
        compiler = "gcc"

        [[actions]]
        type = "compile"
        name = "build"
        sourcePaths = ["src/*.c"]
        nextAction = "link"

        [[actions]]
        type = "link"
        name = "link"
        linker = "gcc"
        outputPath = "bin/app"

        [[targets]]
        name = "all"
        actions = ["build", { type = "shell", command = "echo done" }]
    "#;

    #[test]
    fn test_load_toml_project() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("rivet.toml");
        fs::write(&path, TOML_PROJECT).unwrap();

        // --- Execute ---
        let loaded = load_project(&path).unwrap();

        // --- Assert ---
        let project = &loaded.project;
        assert_eq!(project.name.as_deref(), Some("demo"));
        assert!(project.incremental);
        assert_eq!(project.parallel, Some(4));
        assert_eq!(project.settings.get("outputPath"), Some(&serde_json::json!("build")));
        assert_eq!(project.actions[0].kind, ActionKind::Compile);
        assert!(matches!(
            &project.actions[0].next_action,
            Some(ActionRef::Named(name)) if name == "link"
        ));
        let target = project.find_target("all").unwrap();
        assert!(matches!(&target.actions[1], ActionRef::Inline(a) if a.kind == ActionKind::Shell));
        assert_eq!(loaded.root, dunce::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_load_json_project() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rivet.json");
        fs::write(
            &path,
            r#"{ "targets": [{ "name": "t", "actions": [{ "type": "remove", "paths": "build" }] }] }"#,
        )
        .unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.project.targets.len(), 1);
    }

    #[test]
    fn test_find_config_prefers_toml() {
        let dir = tempdir().unwrap();
        assert!(matches!(find_config(dir.path()), Err(LoaderError::NotFound(_))));

        fs::write(dir.path().join("rivet.json"), "{}").unwrap();
        assert_eq!(find_config(dir.path()).unwrap(), dir.path().join("rivet.json"));

        fs::write(dir.path().join("rivet.toml"), "").unwrap();
        assert_eq!(find_config(dir.path()).unwrap(), dir.path().join("rivet.toml"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rivet.toml");
        fs::write(
            &path,
            r#"
            [[targets]]
            name = "all"
            [[targets]]
            name = "all"
            "#,
        )
        .unwrap();

        let err = load_project(&path).unwrap_err();
        assert!(matches!(err, LoaderError::Duplicate { kind: "target", .. }));
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rivet.toml");
        fs::write(&path, "targets = [").unwrap();
        let err = load_project(&path).unwrap_err();
        assert!(err.to_string().contains("rivet.toml"));

        let yaml = dir.path().join("rivet.yaml");
        fs::write(&yaml, "").unwrap();
        assert!(matches!(load_project(&yaml), Err(LoaderError::UnsupportedFormat(_))));
    }
}
