//! Registry of managed pools keyed by pool name

use super::handle::PoolHandle;
use crate::error::{AgentError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-wide map of pool name -> handle.
///
/// Entries are never removed. Iteration follows registration order.
#[derive(Default)]
pub struct PoolRegistry {
    pools: RwLock<IndexMap<String, Arc<PoolHandle>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool. A second registration under the same name keeps
    /// the original handle and returns it.
    pub fn register(&self, handle: PoolHandle) -> Arc<PoolHandle> {
        let mut pools = self.pools.write();
        if let Some(existing) = pools.get(handle.name()) {
            warn!(pool = %handle.name(), "Pool already registered, keeping existing handle");
            return Arc::clone(existing);
        }

        debug!(
            pool = %handle.name(),
            core = handle.core_pool_size(),
            max = handle.maximum_pool_size(),
            "Registering pool"
        );
        let handle = Arc::new(handle);
        pools.insert(handle.name().to_string(), Arc::clone(&handle));
        handle
    }

    /// Look up a pool by name
    pub fn get(&self, name: &str) -> Result<Arc<PoolHandle>> {
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    /// Handles in registration order. The registry lock is released before
    /// this returns.
    pub fn snapshot(&self) -> Vec<Arc<PoolHandle>> {
        self.pools.read().values().cloned().collect()
    }

    /// Visit every handle in registration order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&PoolHandle),
    {
        for handle in self.snapshot() {
            f(&handle);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}
