//! Managed pools and their live-resizable work queues
//!
//! This module provides:
//! - A FIFO blocking queue whose bound can change while in use
//! - Per-pool handles with atomically updated capacity parameters and counters
//! - The registry shared by the reporter and the config applier

mod handle;
mod queue;
mod registry;

#[cfg(test)]
mod tests;

pub use handle::{Job, PoolHandle, PoolHandleBuilder, TaskGuard};
pub use queue::{QueueStats, ResizableQueue, QUEUE_TYPE, UNBOUNDED, UNBOUNDED_REMAINING};
pub use registry::PoolRegistry;
