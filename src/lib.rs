//! # rivet
//!
//! A declarative build-orchestration engine. A project file declares systems
//! (toolchain profiles), actions (compile, link, shell, fetch, extract, extern
//! acquisition and a few filesystem operations) and targets (ordered action
//! lists). `core::scheduler::ActionListRunner` runs a target depth-first
//! without recursion, and compile actions rebuild only what changed, using
//! file modification times and a persisted per-source dependency map.

pub mod actions;
pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
