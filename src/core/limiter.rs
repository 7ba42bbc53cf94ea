// src/core/limiter.rs

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Runs independent tasks with at most `limit` in flight (a limit of 0 counts
/// as 1).
///
/// Every task runs to completion whatever the others do; a task that panics is
/// reported as an error in its slot. Results keep the order of `tasks`.
pub fn run_bounded<T, F>(tasks: Vec<F>, limit: usize) -> Result<Vec<Result<T>>>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    let threads = limit.max(1);
    log::trace!("Running {} task(s), at most {} at a time.", tasks.len(), threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("rivet-worker-{}", i))
        .build()
        .context("Failed to start the build worker pool")?;

    Ok(pool.install(|| {
        tasks
            .into_par_iter()
            .enumerate()
            .map(|(i, task)| match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(result) => result,
                Err(payload) => Err(anyhow!("Task #{} panicked: {}", i, panic_message(&*payload))),
            })
            .collect()
    }))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
