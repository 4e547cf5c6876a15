//! Scheduler layer
//!
//! Admits events into run groups and drives each run across the variant
//! matrix, cancelling runs that a newer event for the same group supersedes.

pub mod coordinator;
pub mod pipeline;

pub use coordinator::{RunCoordinator, RunTicket};
pub use pipeline::{PipelineExecutor, Stages};
