// src/core/discovery.rs

//! # Dependency Discovery
//!
//! Finds the files a source depends on. Two strategies exist:
//!
//! - **Compiler rules**: the compiler is asked for a make-style rule (`-MM` by
//!   default) and the rule body is parsed into paths.
//! - **Patterns**: user-supplied regexes scan the source text for include and
//!   import statements, which are resolved against the source directory and the
//!   include paths.
//!
//! Every result is a list of canonical paths (see `paths::canonical_path`),
//! without `.` and without the source itself.

use crate::core::paths::canonical_path;
use crate::system::executor::{ExecutionError, SpawnOptions, Spawner};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref RULE_CONTINUATION_RE: Regex = Regex::new(r"\\\r?\n").unwrap();
}

const NAME_GROUP: &str = "name";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Dependency rule command failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Compiler exited with code {code} while listing dependencies of '{source_path}'.")]
    CompilerExit { code: i32, source_path: String },
    #[error("Could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid dependency pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Dependency pattern '{0}' has no named capture group 'name'.")]
    MissingNameGroup(String),
}

impl DiscoveryError {
    /// Pattern errors come from configuration, not from the environment.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidPattern { .. } | Self::MissingNameGroup(_))
    }
}

type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// The configured way of discovering dependencies.
#[derive(Debug)]
pub enum Discovery<'a> {
    None,
    Compiler(CompilerRules<'a>),
    Patterns(PatternScanner),
}

impl Discovery<'_> {
    /// Lists the direct dependencies of `source`.
    pub fn discover(&self, source: &Path, cwd: &Path) -> DiscoveryResult<Vec<String>> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::Compiler(rules) => rules.discover(source, cwd),
            Self::Patterns(scanner) => scanner.discover(source, cwd),
        }
    }
}

// --- Compiler rule output ---

/// Asks the compiler for a make rule and parses its prerequisites.
pub struct CompilerRules<'a> {
    pub spawner: &'a dyn Spawner,
    pub compiler: String,
    /// Flags placed before the dependency flag (include paths, defines).
    pub args: Vec<String>,
    pub dependency_flag: String,
    pub env: &'a HashMap<String, String>,
}

impl std::fmt::Debug for CompilerRules<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerRules")
            .field("compiler", &self.compiler)
            .field("args", &self.args)
            .field("dependency_flag", &self.dependency_flag)
            .finish_non_exhaustive()
    }
}

impl CompilerRules<'_> {
    fn discover(&self, source: &Path, cwd: &Path) -> DiscoveryResult<Vec<String>> {
        let mut args = self.args.clone();
        args.push(self.dependency_flag.clone());
        args.push(source.to_string_lossy().into_owned());

        let options = SpawnOptions {
            cwd,
            env: self.env,
            shell: false,
            timeout: None,
        };
        let output = self.spawner.capture(&self.compiler, &args, &options)?;
        if output.exit_code != 0 {
            return Err(DiscoveryError::CompilerExit {
                code: output.exit_code,
                source_path: source.display().to_string(),
            });
        }

        let self_key = canonical_path(source, cwd);
        let mut dependencies = Vec::new();
        for token in parse_rule_prerequisites(&output.stdout) {
            let key = canonical_path(Path::new(&token), cwd);
            if key == "." || key == self_key || dependencies.contains(&key) {
                continue;
            }
            dependencies.push(key);
        }
        log::trace!(
            "Compiler rule for '{}' lists {} dependencies.",
            self_key,
            dependencies.len()
        );
        Ok(dependencies)
    }
}

/// Extracts the prerequisite tokens of make-style rules (`obj: dep dep \`).
pub fn parse_rule_prerequisites(rule_text: &str) -> Vec<String> {
    let joined = RULE_CONTINUATION_RE.replace_all(rule_text, " ");
    let mut tokens = Vec::new();
    for line in joined.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let body = match find_rule_colon(line) {
            Some(idx) => line.get(idx + 1..).unwrap_or(""),
            None => line,
        };
        tokens.extend(split_rule_tokens(body));
    }
    tokens
}

/// The rule separator: the first `:` not part of a drive letter (`C:\`).
fn find_rule_colon(line: &str) -> Option<usize> {
    line.char_indices()
        .find(|&(idx, ch)| {
            ch == ':'
                && !line
                    .get(idx + 1..)
                    .is_some_and(|rest| rest.starts_with('\\') || rest.starts_with('/'))
        })
        .map(|(idx, _)| idx)
}

/// Splits on whitespace; `\ ` is a literal space inside a token.
fn split_rule_tokens(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&' ') {
            current.push(' ');
            chars.next();
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// --- Source patterns ---

/// Scans source text with include and import regexes.
#[derive(Debug)]
pub struct PatternScanner {
    includes: Vec<Regex>,
    imports: Vec<Regex>,
    include_paths: Vec<PathBuf>,
    import_extensions: Vec<String>,
}

impl PatternScanner {
    /// Compiles the patterns. Each must define a capture group named `name`.
    pub fn new(
        include_patterns: &[String],
        import_patterns: &[String],
        include_paths: Vec<PathBuf>,
        import_extensions: Vec<String>,
    ) -> DiscoveryResult<Self> {
        Ok(Self {
            includes: compile_named(include_patterns)?,
            imports: compile_named(import_patterns)?,
            include_paths,
            import_extensions,
        })
    }

    fn discover(&self, source: &Path, cwd: &Path) -> DiscoveryResult<Vec<String>> {
        let source_abs = if source.is_absolute() {
            source.to_path_buf()
        } else {
            cwd.join(source)
        };
        let text = fs::read_to_string(&source_abs).map_err(|e| DiscoveryError::Io {
            path: source_abs.display().to_string(),
            source: e,
        })?;
        let source_dir = source_abs.parent().unwrap_or(cwd).to_path_buf();

        let mut search_dirs = vec![source_dir];
        search_dirs.extend(self.include_paths.iter().map(|p| cwd.join(p)));

        let mut found = Vec::new();
        for re in &self.includes {
            for name in captured_names(re, &text) {
                match resolve_include(name, &search_dirs) {
                    Some(path) => found.push(path),
                    None => log::trace!("Include '{}' not resolved; skipping.", name),
                }
            }
        }
        for re in &self.imports {
            for name in captured_names(re, &text) {
                let segments: Vec<&str> = name.split('.').filter(|s| !s.is_empty()).collect();
                let resolved = search_dirs
                    .iter()
                    .find_map(|dir| resolve_import(dir, &segments, &self.import_extensions));
                match resolved {
                    Some(path) => found.push(path),
                    None => log::trace!("Import '{}' not resolved; skipping.", name),
                }
            }
        }

        let self_key = canonical_path(source, cwd);
        let mut dependencies: Vec<String> = Vec::new();
        for path in found {
            let key = canonical_path(&path, cwd);
            if key != self_key && !dependencies.contains(&key) {
                dependencies.push(key);
            }
        }
        Ok(dependencies)
    }
}

fn compile_named(patterns: &[String]) -> DiscoveryResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            let re = Regex::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            if !re.capture_names().flatten().any(|n| n == NAME_GROUP) {
                return Err(DiscoveryError::MissingNameGroup(pattern.clone()));
            }
            Ok(re)
        })
        .collect()
}

fn captured_names<'t>(re: &Regex, text: &'t str) -> Vec<&'t str> {
    re.captures_iter(text)
        .filter_map(|caps| caps.name(NAME_GROUP))
        .map(|m| m.as_str())
        .collect()
}

/// First directory (source dir, then include paths) containing `name` wins.
fn resolve_include(name: &str, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    search_dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Spellings a module segment may have on disk, without duplicates.
fn segment_variants(segment: &str) -> Vec<String> {
    let hyphenated = segment.replace('_', "-");
    let candidates = [
        segment.to_string(),
        segment.to_lowercase(),
        hyphenated.clone(),
        hyphenated.to_lowercase(),
    ];
    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Walks `segments` below `base`. Every segment but the last must be a
/// directory; the last may be a file, bare or with one of `extensions`.
fn resolve_import(base: &Path, segments: &[&str], extensions: &[String]) -> Option<PathBuf> {
    let (last, parents) = segments.split_last()?;
    let mut current = base.to_path_buf();

    for segment in parents {
        current = segment_variants(segment)
            .into_iter()
            .map(|variant| current.join(variant))
            .find(|candidate| candidate.is_dir())?;
    }

    for variant in segment_variants(last) {
        let bare = current.join(&variant);
        if bare.is_file() {
            return Some(bare);
        }
        for extension in extensions {
            let candidate = current.join(format!("{}{}", variant, extension));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::RecordingSpawner;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    // --- Rule Parsing Tests ---

    #[test]
    fn test_parse_rule_joins_continuations_and_escapes() {
        let rule = "main.o: src/main.c include/a\\ b.h \\\n  include/c.h\n";
        let tokens = parse_rule_prerequisites(rule);
        assert_eq!(tokens, vec!["src/main.c", "include/a b.h", "include/c.h"]);
    }

    #[test]
    fn test_parse_rule_keeps_windows_drive_letters() {
        let tokens = parse_rule_prerequisites("x.o: C:\\inc\\x.h");
        assert_eq!(tokens, vec!["C:\\inc\\x.h"]);
    }

    #[test]
    fn test_compiler_rules_drop_self_and_dot() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.c"), "");
        write(&dir.path().join("a.h"), "");
        let spawner = RecordingSpawner::with_stdout("a.o: a.c . a.h \\\n a.h\n");
        let env = HashMap::new();
        let rules = CompilerRules {
            spawner: &spawner,
            compiler: "cc".to_string(),
            args: vec!["-Iinclude".to_string()],
            dependency_flag: "-MM".to_string(),
            env: &env,
        };

        // --- Execute ---
        let deps = Discovery::Compiler(rules)
            .discover(Path::new("a.c"), dir.path())
            .unwrap();

        // --- Assert ---
        assert_eq!(deps, vec!["a.h"]);
        let calls = spawner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "cc");
        assert_eq!(calls[0].args, vec!["-Iinclude", "-MM", "a.c"]);
    }

    #[test]
    fn test_compiler_rules_report_non_zero_exit() {
        let dir = tempdir().unwrap();
        let spawner = RecordingSpawner::failing_with(1);
        let env = HashMap::new();
        let rules = CompilerRules {
            spawner: &spawner,
            compiler: "cc".to_string(),
            args: Vec::new(),
            dependency_flag: "-MM".to_string(),
            env: &env,
        };
        let result = rules.discover(Path::new("a.c"), dir.path());
        assert!(matches!(result, Err(DiscoveryError::CompilerExit { code: 1, .. })));
    }

    // --- Pattern Tests ---

    #[test]
    fn test_patterns_require_name_group() {
        let result = PatternScanner::new(&[r#"#include "(.*)""#.to_string()], &[], vec![], vec![]);
        assert!(matches!(result, Err(DiscoveryError::MissingNameGroup(_))));
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_includes_prefer_source_dir_then_include_paths_in_order() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("src/main.c"), "#include \"local.h\"\n#include \"shared.h\"\n#include \"sys.h\"\n");
        write(&root.join("src/local.h"), "");
        write(&root.join("inc1/local.h"), "");
        write(&root.join("inc1/shared.h"), "");
        write(&root.join("inc2/shared.h"), "");

        let scanner = PatternScanner::new(
            &[r#"#include\s+"(?P<name>[^"]+)""#.to_string()],
            &[],
            vec![PathBuf::from("inc1"), PathBuf::from("inc2")],
            vec![],
        )
        .unwrap();

        // --- Execute ---
        let deps = scanner.discover(Path::new("src/main.c"), root).unwrap();

        // --- Assert ---
        assert_eq!(deps, vec!["src/local.h", "inc1/shared.h"]);
    }

    #[test]
    fn test_imports_resolve_segment_variants_and_extensions() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("app/main.mod"), "import Net_Utils.http_client;\nimport missing.module;\n");
        write(&root.join("lib/net-utils/http-client.mod"), "");

        let scanner = PatternScanner::new(
            &[],
            &[r"import\s+(?P<name>[\w.]+);".to_string()],
            vec![PathBuf::from("lib")],
            vec![".mod".to_string()],
        )
        .unwrap();

        // --- Execute ---
        let deps = scanner.discover(Path::new("app/main.mod"), root).unwrap();

        // --- Assert ---
        assert_eq!(deps, vec!["lib/net-utils/http-client.mod"]);
    }

    #[test]
    fn test_segment_variants_are_deduplicated() {
        assert_eq!(segment_variants("abc"), vec!["abc"]);
        assert_eq!(
            segment_variants("My_Mod"),
            vec!["My_Mod", "my_mod", "My-Mod", "my-mod"]
        );
    }
}
