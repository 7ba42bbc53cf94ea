// src/core/timer.rs

use std::time::Instant;

/// A RAII timer. Logs the elapsed time of a block at debug level when dropped.
#[derive(Debug)]
pub struct BlockTimer {
    name: String,
    start: Instant,
}

impl BlockTimer {
    /// Creates a new timer and starts it immediately.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for BlockTimer {
    fn drop(&mut self) {
        log::debug!(
            "[{}] finished in {} ms",
            self.name,
            self.start.elapsed().as_millis()
        );
    }
}
