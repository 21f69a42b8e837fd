//! Scheduler runner: drives the scans of every collection and executes the
//! admitted payloads on tokio tasks bounded by the bulkhead.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, client registration, accessors
//! - `execution`: scan cycle, poll tasks, payload processing and the run loop

mod core;
mod execution;

pub use self::core::Scheduler;
