//! Managed pool handle
//!
//! A `PoolHandle` is the agent's view of one worker pool: its capacity
//! parameters, its work queue and the live counters the hosting executor
//! maintains. Every field is independently atomic so the reporter can read
//! while the applier writes, without a handle-wide lock.

use super::queue::{ResizableQueue, QUEUE_TYPE};
use crate::error::{AgentError, Result};
use crate::models::{PoolConfigInfo, PoolWorkState};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Unit of work queued on a managed pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a managed pool
pub struct PoolHandle {
    name: String,
    thread_name_prefix: String,
    core_pool_size: AtomicU32,
    maximum_pool_size: AtomicU32,
    keep_alive_seconds: AtomicU64,
    queue: Arc<ResizableQueue<Job>>,
    active_count: AtomicUsize,
    completed_task_count: AtomicU64,
    largest_pool_size: AtomicUsize,
    task_count: AtomicU64,
    pool_size: AtomicUsize,
}

impl PoolHandle {
    /// Start building a handle for the named pool
    pub fn builder(name: impl Into<String>) -> PoolHandleBuilder {
        PoolHandleBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    pub fn core_pool_size(&self) -> u32 {
        self.core_pool_size.load(Ordering::Acquire)
    }

    pub fn maximum_pool_size(&self) -> u32 {
        self.maximum_pool_size.load(Ordering::Acquire)
    }

    pub fn keep_alive_seconds(&self) -> u64 {
        self.keep_alive_seconds.load(Ordering::Acquire)
    }

    /// Shared work queue the hosting executor consumes from
    pub fn queue(&self) -> &Arc<ResizableQueue<Job>> {
        &self.queue
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    pub fn completed_task_count(&self) -> u64 {
        self.completed_task_count.load(Ordering::Relaxed)
    }

    pub fn largest_pool_size(&self) -> usize {
        self.largest_pool_size.load(Ordering::Relaxed)
    }

    pub fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::Relaxed)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_core_pool_size(&self, size: u32) {
        self.core_pool_size.store(size, Ordering::Release);
    }

    pub(crate) fn set_maximum_pool_size(&self, size: u32) {
        self.maximum_pool_size.store(size, Ordering::Release);
    }

    pub(crate) fn set_keep_alive_seconds(&self, secs: u64) {
        self.keep_alive_seconds.store(secs, Ordering::Release);
    }

    /// Record that a task was handed to the pool
    pub fn record_submitted(&self) {
        self.task_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker thread joining the pool
    pub fn worker_started(&self) {
        let size = self.pool_size.fetch_add(1, Ordering::Relaxed) + 1;
        self.largest_pool_size.fetch_max(size, Ordering::Relaxed);
    }

    /// Record a worker thread leaving the pool
    pub fn worker_stopped(&self) {
        let _ = self
            .pool_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Mark a task as running until the returned guard is dropped
    pub fn begin_task(&self) -> TaskGuard<'_> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        TaskGuard { handle: self }
    }

    /// Static configuration as reported on init
    pub fn config_info(&self) -> PoolConfigInfo {
        self.config_with_capacity(self.queue.capacity())
    }

    /// Configuration plus live metrics captured now. Queue figures come from
    /// a single lock acquisition, so `queue_size + queue_remaining_capacity`
    /// always matches the reported bound.
    pub fn work_state(&self) -> PoolWorkState {
        let queue = self.queue.stats();
        PoolWorkState {
            config: self.config_with_capacity(queue.capacity),
            active_count: self.active_count(),
            queue_remaining_capacity: queue.remaining,
            completed_task_count: self.completed_task_count(),
            largest_pool_size: self.largest_pool_size(),
            task_count: self.task_count(),
            pool_size: self.pool_size(),
            queue_size: queue.len,
            captured_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    fn config_with_capacity(&self, queue_capacity: usize) -> PoolConfigInfo {
        PoolConfigInfo {
            pool_name: self.name.clone(),
            core_pool_size: self.core_pool_size(),
            maximum_pool_size: self.maximum_pool_size(),
            keep_alive_seconds: self.keep_alive_seconds(),
            thread_name_prefix: self.thread_name_prefix.clone(),
            queue_type: QUEUE_TYPE.to_string(),
            queue_capacity,
        }
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("name", &self.name)
            .field("core_pool_size", &self.core_pool_size())
            .field("maximum_pool_size", &self.maximum_pool_size())
            .field("keep_alive_seconds", &self.keep_alive_seconds())
            .field("queue", &self.queue)
            .finish()
    }
}

/// Running-task marker returned by [`PoolHandle::begin_task`]
pub struct TaskGuard<'a> {
    handle: &'a PoolHandle,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.handle.active_count.fetch_sub(1, Ordering::Relaxed);
        self.handle.completed_task_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Builder for [`PoolHandle`]
pub struct PoolHandleBuilder {
    name: String,
    thread_name_prefix: Option<String>,
    core_pool_size: u32,
    maximum_pool_size: u32,
    keep_alive_seconds: u64,
    queue_capacity: usize,
}

impl PoolHandleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            thread_name_prefix: None,
            core_pool_size: 1,
            maximum_pool_size: 1,
            keep_alive_seconds: 60,
            queue_capacity: super::queue::UNBOUNDED,
        }
    }

    pub fn core_pool_size(mut self, size: u32) -> Self {
        self.core_pool_size = size;
        self
    }

    pub fn maximum_pool_size(mut self, size: u32) -> Self {
        self.maximum_pool_size = size;
        self
    }

    pub fn keep_alive_seconds(mut self, secs: u64) -> Self {
        self.keep_alive_seconds = secs;
        self
    }

    /// Queue bound, `0` for unbounded
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Defaults to `"<name>-"`
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<PoolHandle> {
        if self.core_pool_size == 0 {
            return Err(AgentError::InvalidPoolSize {
                field: "corePoolSize",
                requested: 0,
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.maximum_pool_size < self.core_pool_size {
            return Err(AgentError::InvalidPoolSize {
                field: "maximumPoolSize",
                requested: i64::from(self.maximum_pool_size),
                reason: format!("below corePoolSize {}", self.core_pool_size),
            });
        }

        let thread_name_prefix = self
            .thread_name_prefix
            .unwrap_or_else(|| format!("{}-", self.name));

        Ok(PoolHandle {
            name: self.name,
            thread_name_prefix,
            core_pool_size: AtomicU32::new(self.core_pool_size),
            maximum_pool_size: AtomicU32::new(self.maximum_pool_size),
            keep_alive_seconds: AtomicU64::new(self.keep_alive_seconds),
            queue: Arc::new(ResizableQueue::new(self.queue_capacity)),
            active_count: AtomicUsize::new(0),
            completed_task_count: AtomicU64::new(0),
            largest_pool_size: AtomicUsize::new(0),
            task_count: AtomicU64::new(0),
            pool_size: AtomicUsize::new(0),
        })
    }
}
