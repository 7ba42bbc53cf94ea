//! # System Interaction Layer
//!
//! The boundary between the engine and the operating system.
//!
//! - **`executor`**: the `Spawner` seam and its process-backed implementation,
//!   with shell execution, timeouts and output capture.

pub mod executor;
