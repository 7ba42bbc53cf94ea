// src/core/mod.rs

pub mod action_runner;
pub mod cache;
pub mod config_loader;
pub mod config_resolver;
pub mod context;
pub mod dependencies;
pub mod discovery;
pub mod dispatcher;
pub mod graph;
pub mod limiter;
pub mod paths;
pub mod scheduler;
pub mod timer;

#[cfg(test)]
pub mod test_support;
