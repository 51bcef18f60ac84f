//! # Memory Blocks
//!
//! A block wraps one raw driver allocation and carves it linearly into
//! sub-allocations. The bump offset only ever moves forward; destroyed
//! sub-allocations are recorded in the slot table and revived in place by
//! the owning pool, never reclaimed by the bump pointer.

use std::sync::{Arc, Mutex};

use basalt_core::{Error, MemoryDevice, RawAllocation, Result};

use crate::memory::{DeviceMemory, RawMemory};

// ============================================================================
// Slot Table
// ============================================================================

/// One sub-allocation record.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    size: u64,
    destroyed: bool,
}

struct BlockState {
    bump: u64,
    slots: Vec<Slot>,
    closed: bool,
}

/// Shared block state reachable from handed-out sub-allocations.
pub(crate) struct BlockShared {
    raw: Arc<RawMemory>,
    state: Mutex<BlockState>,
}

impl BlockShared {
    /// Mark a sub-allocation destroyed. Errors if it already is, or if the
    /// whole block was destroyed.
    pub(crate) fn destroy_slot(&self, slot: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::AlreadyDestroyed);
        }
        let record = state
            .slots
            .get_mut(slot as usize)
            .ok_or(Error::AlreadyDestroyed)?;
        if record.destroyed {
            return Err(Error::AlreadyDestroyed);
        }
        record.destroyed = true;
        Ok(())
    }

    pub(crate) fn slot_destroyed(&self, slot: u32) -> bool {
        let state = self.state.lock().unwrap();
        if state.closed {
            return true;
        }
        state
            .slots
            .get(slot as usize)
            .map_or(true, |record| record.destroyed)
    }
}

// ============================================================================
// Block
// ============================================================================

/// One raw driver allocation, linearly sub-allocated.
pub struct Block {
    shared: Arc<BlockShared>,
}

impl Block {
    /// Wrap a raw driver allocation.
    pub(crate) fn new(
        device: Arc<dyn MemoryDevice>,
        allocation: RawAllocation,
        type_index: u32,
        host_visible: bool,
    ) -> Self {
        let raw = RawMemory::new(device, allocation, type_index, host_visible);
        Self {
            shared: Arc::new(BlockShared {
                raw: Arc::new(raw),
                state: Mutex::new(BlockState {
                    bump: 0,
                    slots: Vec::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Raw size of the block in bytes.
    pub fn size(&self) -> u64 {
        self.shared.raw.size()
    }

    /// Space never yet carved from the bump pointer.
    pub fn remaining(&self) -> u64 {
        let state = self.shared.state.lock().unwrap();
        if state.closed {
            return 0;
        }
        self.shared.raw.size() - state.bump
    }

    /// Bytes not held by a live sub-allocation: uncarved space plus
    /// destroyed slots.
    pub fn free(&self) -> u64 {
        let state = self.shared.state.lock().unwrap();
        if state.closed {
            return 0;
        }
        let live: u64 = state
            .slots
            .iter()
            .filter(|s| !s.destroyed)
            .map(|s| s.size)
            .sum();
        self.shared.raw.size() - live
    }

    /// Number of live sub-allocations.
    pub fn live_count(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.slots.iter().filter(|s| !s.destroyed).count()
    }

    /// Number of destroyed, reusable sub-allocations.
    pub fn destroyed_count(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        if state.closed {
            return 0;
        }
        state.slots.iter().filter(|s| s.destroyed).count()
    }

    /// Bump-allocate `size` bytes, or `None` if the uncarved space is too
    /// small.
    pub fn allocate(&self, size: u64) -> Option<DeviceMemory> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed || self.shared.raw.size() - state.bump < size {
            return None;
        }

        let offset = state.bump;
        state.bump += size;
        let slot = state.slots.len() as u32;
        state.slots.push(Slot {
            offset,
            size,
            destroyed: false,
        });

        Some(DeviceMemory::pooled(
            Arc::clone(&self.shared.raw),
            Arc::clone(&self.shared),
            slot,
            offset,
            size,
        ))
    }

    /// Smallest destroyed slot that can hold `size` bytes, as
    /// `(slot, slot_size)`.
    pub(crate) fn smallest_destroyed_slot(&self, size: u64) -> Option<(u32, u64)> {
        let state = self.shared.state.lock().unwrap();
        if state.closed {
            return None;
        }
        state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.destroyed && s.size >= size)
            .min_by_key(|(_, s)| s.size)
            .map(|(i, s)| (i as u32, s.size))
    }

    /// Revive a destroyed slot in place, at its original offset and size.
    pub(crate) fn revive(&self, slot: u32) -> Option<DeviceMemory> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let record = state.slots.get_mut(slot as usize)?;
        if !record.destroyed {
            return None;
        }
        record.destroyed = false;
        let (offset, size) = (record.offset, record.size);

        Some(DeviceMemory::pooled(
            Arc::clone(&self.shared.raw),
            Arc::clone(&self.shared),
            slot,
            offset,
            size,
        ))
    }

    /// Mark every live sub-allocation destroyed.
    pub(crate) fn release_all(&self) {
        let mut state = self.shared.state.lock().unwrap();
        for slot in &mut state.slots {
            slot.destroyed = true;
        }
    }

    /// Free the raw memory and clear every sub-allocation record.
    /// Sub-allocations handed out from this block must not be used again.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
            state.slots.clear();
        }
        self.shared.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::HostDevice;

    fn block(size: u64) -> (Arc<HostDevice>, Block) {
        let device = Arc::new(HostDevice::new());
        let allocation = device.allocate(1, size).unwrap();
        (device.clone(), Block::new(device, allocation, 1, true))
    }

    #[test]
    fn test_bump_allocation_offsets() {
        let (_device, block) = block(256);

        let a = block.allocate(100).unwrap();
        let b = block.allocate(50).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 100);
        assert_eq!(block.remaining(), 106);
        assert_eq!(block.free(), 106);
    }

    #[test]
    fn test_allocate_past_capacity() {
        let (_device, block) = block(128);
        assert!(block.allocate(100).is_some());
        assert!(block.allocate(29).is_none());
        assert!(block.allocate(28).is_some());
    }

    #[test]
    fn test_free_counts_destroyed_slots_remaining_does_not() {
        let (_device, block) = block(256);

        let a = block.allocate(100).unwrap();
        let _b = block.allocate(100).unwrap();
        a.destroy().unwrap();

        // The bump pointer never rewinds; free space does grow.
        assert_eq!(block.remaining(), 56);
        assert_eq!(block.free(), 156);
        assert_eq!(block.live_count(), 1);
        assert_eq!(block.destroyed_count(), 1);
    }

    #[test]
    fn test_revive_in_place() {
        let (_device, block) = block(256);

        let a = block.allocate(80).unwrap();
        a.destroy().unwrap();

        let (slot, size) = block.smallest_destroyed_slot(64).unwrap();
        assert_eq!(size, 80);
        let revived = block.revive(slot).unwrap();
        assert_eq!(revived.offset(), 0);
        assert_eq!(revived.size(), 80);
        assert!(!revived.is_destroyed());
        assert!(block.smallest_destroyed_slot(1).is_none());
    }

    #[test]
    fn test_smallest_destroyed_slot_picks_minimum() {
        let (_device, block) = block(512);

        let a = block.allocate(200).unwrap();
        let b = block.allocate(90).unwrap();
        let c = block.allocate(120).unwrap();
        a.destroy().unwrap();
        b.destroy().unwrap();
        c.destroy().unwrap();

        let (_, size) = block.smallest_destroyed_slot(100).unwrap();
        assert_eq!(size, 120);
    }

    #[test]
    fn test_mapping_any_suballocation_steals_block_mapping() {
        let (_device, block) = block(256);

        let a = block.allocate(64).unwrap();
        let b = block.allocate(64).unwrap();

        let region_a = a.map(0, 64).unwrap();
        let region_b = b.map(0, 64).unwrap();
        assert_eq!(region_b.offset(), 64);

        assert!(!region_a.is_valid());
        assert!(matches!(region_a.bytes(0, 1), Err(Error::StaleMapping)));
    }

    #[test]
    fn test_destroy_block_invalidates_suballocations() {
        let (device, block) = block(256);

        let a = block.allocate(64).unwrap();
        block.destroy();

        assert!(a.is_destroyed());
        assert_eq!(a.destroy(), Err(Error::AlreadyDestroyed));
        assert!(matches!(a.map(0, 8), Err(Error::AlreadyDestroyed)));
        assert!(block.allocate(8).is_none());
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn test_double_destroy_suballocation() {
        let (_device, block) = block(64);
        let a = block.allocate(32).unwrap();
        assert!(a.destroy().is_ok());
        assert_eq!(a.destroy(), Err(Error::AlreadyDestroyed));
    }

    #[test]
    fn test_release_all_marks_everything() {
        let (_device, block) = block(256);
        let _a = block.allocate(64).unwrap();
        let _b = block.allocate(64).unwrap();

        block.release_all();
        assert_eq!(block.live_count(), 0);
        assert_eq!(block.destroyed_count(), 2);
        assert_eq!(block.free(), 256);
    }
}
