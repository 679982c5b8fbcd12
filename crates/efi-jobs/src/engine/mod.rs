//! The job lifecycle engine.
//!
//! [`JobHandler`] decides what happens to a single job; [`JobManager`] runs
//! one pass over the store, RUNNING jobs first, then NEW jobs up to the
//! configured limit.

pub mod lifecycle;
pub mod pass;

pub use lifecycle::JobHandler;
pub use pass::{JobManager, PassSummary};
