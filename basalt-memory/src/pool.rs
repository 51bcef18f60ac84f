//! # Memory Pools
//!
//! One growable list of blocks per memory type. Allocation tries, in
//! order: the smallest sufficient destroyed sub-allocation anywhere in the
//! pool (revived in place), uncarved space in an existing block, and
//! finally a new block sized by the growth policy. A single mutex per pool
//! guards the block list, bump offsets and slot tables reached through it.

use std::sync::{Arc, Mutex};

use basalt_core::{Error, MemoryDevice, Result};

use crate::block::Block;
use crate::heap::MemoryType;
use crate::memory::DeviceMemory;
use crate::policy::BlockPolicy;

// ============================================================================
// Pool Statistics
// ============================================================================

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of blocks.
    pub blocks: usize,
    /// Live sub-allocations.
    pub live_allocations: usize,
    /// Destroyed, reusable sub-allocations.
    pub destroyed_allocations: usize,
    /// Total raw bytes owned by the pool.
    pub total_bytes: u64,
    /// Bytes not held by a live sub-allocation.
    pub free_bytes: u64,
}

// ============================================================================
// Memory Pool
// ============================================================================

struct PoolState {
    blocks: Vec<Block>,
    policy: BlockPolicy,
    total: u64,
}

/// Growable pool of blocks for one memory type.
pub struct MemoryPool {
    device: Arc<dyn MemoryDevice>,
    memory_type: MemoryType,
    state: Mutex<PoolState>,
}

impl MemoryPool {
    /// Create an empty pool for one memory type.
    pub fn new(
        device: Arc<dyn MemoryDevice>,
        memory_type: MemoryType,
        policy: BlockPolicy,
    ) -> Self {
        Self {
            device,
            memory_type,
            state: Mutex::new(PoolState {
                blocks: Vec::new(),
                policy,
                total: 0,
            }),
        }
    }

    /// The memory type this pool serves.
    pub fn memory_type(&self) -> &MemoryType {
        &self.memory_type
    }

    /// Replace the growth policy for future blocks.
    pub fn set_policy(&self, policy: BlockPolicy) {
        self.state.lock().unwrap().policy = policy;
    }

    /// Allocate `size` bytes from the pool.
    pub fn allocate(&self, size: u64) -> Result<DeviceMemory> {
        let mut state = self.state.lock().unwrap();

        // Smallest sufficient destroyed sub-allocation, revived in place.
        // The matched slot keeps its original size; the pool does not
        // split or right-size it.
        let candidate = state
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.smallest_destroyed_slot(size).map(|(slot, n)| (i, slot, n)))
            .min_by_key(|&(_, _, n)| n);
        if let Some((index, slot, _)) = candidate {
            if let Some(memory) = state.blocks[index].revive(slot) {
                log::trace!(
                    "pool type {} reused a destroyed slot for {} bytes",
                    self.memory_type.index,
                    size
                );
                return Ok(memory);
            }
        }

        // Uncarved space in an existing block.
        for block in &state.blocks {
            if block.remaining() >= size {
                if let Some(memory) = block.allocate(size) {
                    return Ok(memory);
                }
            }
        }

        // Grow.
        let block = self.grow(&mut state, size)?;
        block
            .allocate(size)
            .ok_or(Error::AllocationFailed {
                type_index: self.memory_type.index,
                size,
            })
    }

    /// Eagerly grow the pool by at least `size` free bytes without
    /// performing a logical allocation.
    pub fn init(&self, size: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.grow(&mut state, size)?;
        Ok(())
    }

    fn grow<'a>(&self, state: &'a mut PoolState, size: u64) -> Result<&'a Block> {
        let adjusted = state.policy.apply(size, state.total);
        if adjusted < size {
            return Err(Error::PolicyViolation {
                requested: size,
                adjusted,
            });
        }

        let allocation = self.device.allocate(self.memory_type.index, adjusted)?;
        if !allocation.handle.is_valid() || allocation.size < adjusted {
            return Err(Error::AllocationFailed {
                type_index: self.memory_type.index,
                size: adjusted,
            });
        }

        log::debug!(
            "pool type {} grew by {} bytes ({} total)",
            self.memory_type.index,
            allocation.size,
            state.total + allocation.size
        );

        state.total += allocation.size;
        state.blocks.push(Block::new(
            Arc::clone(&self.device),
            allocation,
            self.memory_type.index,
            self.memory_type.is_host_visible(),
        ));
        Ok(state.blocks.last().unwrap())
    }

    /// Mark every live sub-allocation destroyed; blocks are retained for
    /// reuse.
    pub fn release(&self) {
        let state = self.state.lock().unwrap();
        for block in &state.blocks {
            block.release_all();
        }
        log::debug!("pool type {} released", self.memory_type.index);
    }

    /// Destroy every block outright, returning all raw memory to the
    /// driver. The pool stays usable and starts again from empty.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        for block in &state.blocks {
            block.destroy();
        }
        state.blocks.clear();
        state.total = 0;
        log::debug!("pool type {} closed", self.memory_type.index);
    }

    /// Total raw bytes owned by the pool.
    pub fn size(&self) -> u64 {
        self.state.lock().unwrap().total
    }

    /// Bytes not held by a live sub-allocation.
    pub fn free(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.blocks.iter().map(|b| b.free()).sum()
    }

    /// Number of live sub-allocations.
    pub fn count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.blocks.iter().map(|b| b.live_count()).sum()
    }

    /// Snapshot of the pool's statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().unwrap();
        PoolStats {
            blocks: state.blocks.len(),
            live_allocations: state.blocks.iter().map(|b| b.live_count()).sum(),
            destroyed_allocations: state.blocks.iter().map(|b| b.destroyed_count()).sum(),
            total_bytes: state.total,
            free_bytes: state.blocks.iter().map(|b| b.free()).sum(),
        }
    }
}
