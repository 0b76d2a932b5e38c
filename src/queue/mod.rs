//! Serialized background work
//!
//! Each concern area (loading, recordings, import, processing) owns one
//! `TaskQueue`. Work on one queue never overlaps; separate queues run
//! concurrently.

mod task_queue;

pub use task_queue::{TaskQueue, TaskQueues};
