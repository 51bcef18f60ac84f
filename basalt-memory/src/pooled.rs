//! # Pool Allocator
//!
//! Top-level allocator that keeps one [`MemoryPool`] per memory type,
//! created lazily on first use, and enforces a global ceiling on the
//! number of logical allocations. The ceiling models the driver's hard
//! limit on distinct memory objects; it is independent of total bytes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use basalt_core::{Error, MemoryDevice, Result};

use crate::allocator::Allocator;
use crate::heap::MemoryProperties;
use crate::memory::DeviceMemory;
use crate::policy::BlockPolicy;
use crate::pool::MemoryPool;

// ============================================================================
// Pool Allocator Configuration
// ============================================================================

/// Configuration for a [`PoolAllocator`].
#[derive(Debug, Clone)]
pub struct PoolAllocatorDesc {
    /// Ceiling on the number of logical allocations across all pools.
    pub max_allocations: u32,
    /// Growth policy handed to every lazily created pool.
    pub block_policy: BlockPolicy,
}

impl Default for PoolAllocatorDesc {
    fn default() -> Self {
        Self {
            max_allocations: 4096,
            block_policy: BlockPolicy::Exact,
        }
    }
}

impl PoolAllocatorDesc {
    /// Set the allocation ceiling.
    pub fn with_max_allocations(mut self, max: u32) -> Self {
        self.max_allocations = max;
        self
    }

    /// Set the default block policy.
    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }
}

// ============================================================================
// Pool Allocator
// ============================================================================

/// Pooled allocator with one pool per memory type and a global
/// allocation-count cap.
pub struct PoolAllocator {
    device: Arc<dyn MemoryDevice>,
    properties: Arc<MemoryProperties>,
    pools: Mutex<BTreeMap<u32, Arc<MemoryPool>>>,
    count: AtomicU32,
    desc: PoolAllocatorDesc,
}

impl PoolAllocator {
    /// Create a pool allocator.
    pub fn new(
        device: Arc<dyn MemoryDevice>,
        properties: Arc<MemoryProperties>,
        desc: PoolAllocatorDesc,
    ) -> Self {
        Self {
            device,
            properties,
            pools: Mutex::new(BTreeMap::new()),
            count: AtomicU32::new(0),
            desc,
        }
    }

    /// The pool serving a memory type, created on first use.
    pub fn pool(&self, type_index: u32) -> Result<Arc<MemoryPool>> {
        let memory_type = *self
            .properties
            .memory_type(type_index)
            .ok_or(Error::NoSuitableMemoryType {
                type_filter: 1 << type_index,
                required: Default::default(),
            })?;

        let mut pools = self.pools.lock().unwrap();
        Ok(Arc::clone(pools.entry(type_index).or_insert_with(|| {
            Arc::new(MemoryPool::new(
                Arc::clone(&self.device),
                memory_type,
                self.desc.block_policy.clone(),
            ))
        })))
    }

    /// Number of logical allocations admitted since the last reset.
    pub fn allocation_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// The configured allocation ceiling.
    pub fn max_allocations(&self) -> u32 {
        self.desc.max_allocations
    }

    /// Mark every allocation in every pool destroyed; blocks are retained.
    /// Resets the allocation count.
    pub fn release(&self) {
        let pools = self.pools.lock().unwrap();
        for pool in pools.values() {
            pool.release();
        }
        self.count.store(0, Ordering::Release);
    }

    /// Destroy every pool's blocks outright. Resets the allocation count.
    pub fn close(&self) {
        let pools = self.pools.lock().unwrap();
        for pool in pools.values() {
            pool.close();
        }
        self.count.store(0, Ordering::Release);
    }

    /// Admit one allocation against the ceiling.
    fn reserve(&self) -> Result<()> {
        let max = self.desc.max_allocations;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count < max {
                    Some(count + 1)
                } else {
                    None
                }
            })
            .map(|_| ())
            .map_err(|_| Error::TooManyAllocations { max })
    }
}

impl Allocator for PoolAllocator {
    fn properties(&self) -> &MemoryProperties {
        &self.properties
    }

    fn allocate_with_type(&self, type_index: u32, size: u64) -> Result<DeviceMemory> {
        self.reserve()?;

        let result = self
            .pool(type_index)
            .and_then(|pool| pool.allocate(size));
        if result.is_err() {
            // Return the admitted slot so the cap stays accurate.
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
        result
    }
}
