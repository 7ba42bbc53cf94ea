// src/actions/fetch.rs

use crate::actions::copy_path;
use crate::constants::{defaults, keys};
use crate::core::action_runner::{ActionBody, ActionResult};
use crate::core::context::ActionContext;

/// Downloads a URL to a file, optionally through the blob cache.
#[derive(Debug, Default)]
pub struct FetchAction;

impl ActionBody for FetchAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let resolver = &cx.resolver;
        let url: String = resolver.require(keys::URL)?;
        let output = cx.require_path(keys::OUTPUT_PATH)?;
        let use_cache = resolver.get_bool_or(keys::CACHE, false)?;
        let retries = resolver.get_as::<u32>(keys::RETRIES)?.unwrap_or(0);
        let timeout = cx.timeout()?;
        let cache = if use_cache { cx.run.cache } else { None };

        if let Some(hit) = cache.and_then(|c| c.get_file(&url)) {
            log::info!("Using cached copy of '{}'.", url);
            if !cx.dry_run() {
                copy_path(&hit.path, &output)?;
            }
            return Ok(());
        }

        if let Some(parent) = output.parent() {
            cx.create_dir_all(parent)?;
        }
        let args = vec![
            "-fsSL".to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            url.clone(),
        ];

        let mut attempt = 0;
        loop {
            match cx.run_process(defaults::FETCH_PROGRAM, &args, false, timeout) {
                Ok(()) => break,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    log::warn!("Fetching '{}' failed ({}); retry {} of {}.", url, e, attempt, retries);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(cache) = cache {
            if !cx.dry_run() {
                cache.add_file(&url, Some(&output))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{action, run_context};
    use crate::core::cache::{BlobCache, DirectoryCache};
    use crate::core::context::{RunContext, RunOptions};
    use crate::core::test_support::RecordingSpawner;
    use crate::models::{ActionKind, Project, Target};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fetch_downloads_and_populates_cache() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("cache"));
        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = RunContext {
            cache: Some(&cache),
            ..run_context(&project, &target, &spawner, dir.path(), RunOptions::default())
        };
        let fetch = action(
            ActionKind::Fetch,
            json!({ "url": "https://example.org/zlib.tar.gz", "outputPath": "dl/zlib.tar.gz", "cache": true }),
        );

        // --- Execute ---
        let cx = crate::core::context::ActionContext::new(&run, &fetch, None).unwrap();
        FetchAction.run(&cx).unwrap();

        // --- Assert ---
        let calls = spawner.calls_to("curl");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args.last().unwrap(), "https://example.org/zlib.tar.gz");
        assert!(dir.path().join("dl/zlib.tar.gz").exists());
        assert!(cache.get_file("https://example.org/zlib.tar.gz").is_some());
    }

    #[test]
    fn test_fetch_uses_cache_hit_without_spawning() {
        let dir = tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("cache"));
        let seed = dir.path().join("seed");
        fs::write(&seed, "cached").unwrap();
        cache.add_file("https://example.org/a", Some(&seed)).unwrap();

        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::new();
        let run = RunContext {
            cache: Some(&cache),
            ..run_context(&project, &target, &spawner, dir.path(), RunOptions::default())
        };
        let fetch = action(
            ActionKind::Fetch,
            json!({ "url": "https://example.org/a", "outputPath": "out/a", "cache": true }),
        );

        let cx = crate::core::context::ActionContext::new(&run, &fetch, None).unwrap();
        FetchAction.run(&cx).unwrap();

        assert!(spawner.calls().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("out/a")).unwrap(), "cached");
    }

    #[test]
    fn test_fetch_retries_then_fails() {
        let dir = tempdir().unwrap();
        let project = Project::default();
        let target = Target::default();
        let spawner = RecordingSpawner::failing_with(22);
        let run = run_context(&project, &target, &spawner, dir.path(), RunOptions::default());
        let fetch = action(
            ActionKind::Fetch,
            json!({ "url": "https://example.org/a", "outputPath": "a", "retries": 2 }),
        );

        let cx = crate::core::context::ActionContext::new(&run, &fetch, None).unwrap();
        let err = FetchAction.run(&cx).unwrap_err();

        assert!(!err.is_malformed());
        assert_eq!(spawner.calls().len(), 3);
    }
}
