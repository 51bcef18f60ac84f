//! # Device Memory and Mapped Regions
//!
//! Handles to logical allocations and CPU-addressable windows into
//! host-visible memory.
//!
//! A raw driver allocation supports one mapping at a time: mapping any
//! sub-allocation (re)maps the whole underlying block, superseding the
//! previous mapping. Instead of letting a superseded [`Region`] operate on
//! a dangling pointer, every raw allocation carries an atomic mapping
//! epoch; a region records the epoch it was created under and each access
//! re-validates it, failing with [`Error::StaleMapping`].

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use basalt_core::{Error, MemoryDevice, MemoryHandle, RawAllocation, Result};

use crate::block::BlockShared;

// ============================================================================
// Raw Memory
// ============================================================================

/// One raw driver allocation, shared by every view into it.
pub(crate) struct RawMemory {
    device: Arc<dyn MemoryDevice>,
    handle: MemoryHandle,
    size: u64,
    type_index: u32,
    host_visible: bool,
    map_epoch: AtomicU64,
    released: AtomicBool,
}

impl RawMemory {
    pub(crate) fn new(
        device: Arc<dyn MemoryDevice>,
        allocation: RawAllocation,
        type_index: u32,
        host_visible: bool,
    ) -> Self {
        Self {
            device,
            handle: allocation.handle,
            size: allocation.size,
            type_index,
            host_visible,
            map_epoch: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn type_index(&self) -> u32 {
        self.type_index
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Free the driver allocation. Returns false if already released.
    /// Any live region becomes stale.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.map_epoch.fetch_add(1, Ordering::AcqRel);
        self.device.free(self.handle);
        true
    }

    /// Map a window of the allocation, superseding any prior mapping.
    pub(crate) fn map_window(raw: &Arc<Self>, offset: u64, size: u64) -> Result<Region> {
        if raw.is_released() {
            return Err(Error::AlreadyDestroyed);
        }
        if !raw.host_visible {
            return Err(Error::NotHostVisible {
                type_index: raw.type_index,
            });
        }
        if offset + size > raw.size {
            return Err(Error::OutOfBounds {
                offset,
                size,
                limit: raw.size,
            });
        }

        let ptr = raw
            .device
            .map(raw.handle, offset, size)
            .map_err(|_| Error::MappingFailed {
                type_index: raw.type_index,
            })?;

        let epoch = raw.map_epoch.fetch_add(1, Ordering::AcqRel) + 1;

        Ok(Region {
            raw: Arc::clone(raw),
            ptr,
            offset,
            size,
            epoch,
        })
    }
}

impl Drop for RawMemory {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            self.device.free(self.handle);
        }
    }
}

// ============================================================================
// Region
// ============================================================================

/// A mapped, CPU-addressable window into host-visible device memory.
pub struct Region {
    raw: Arc<RawMemory>,
    ptr: NonNull<u8>,
    offset: u64,
    size: u64,
    epoch: u64,
}

// SAFETY: the pointer targets driver-owned memory that is never moved, and
// every access re-validates the mapping epoch before dereferencing.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Byte offset of this window within the raw allocation.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of this window in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check whether this region still refers to the current mapping.
    pub fn is_valid(&self) -> bool {
        !self.raw.is_released() && self.epoch == self.raw.map_epoch.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.raw.is_released() {
            return Err(Error::AlreadyDestroyed);
        }
        if self.epoch != self.raw.map_epoch.load(Ordering::Acquire) {
            return Err(Error::StaleMapping);
        }
        Ok(())
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<()> {
        self.check()?;
        if offset + size > self.size {
            return Err(Error::OutOfBounds {
                offset,
                size,
                limit: self.size,
            });
        }
        Ok(())
    }

    /// Immutable byte view of a sub-range.
    pub fn bytes(&self, offset: u64, size: u64) -> Result<&[u8]> {
        self.check_range(offset, size)?;
        // SAFETY: range checked against the mapped window, mapping current.
        Ok(unsafe {
            core::slice::from_raw_parts(self.ptr.as_ptr().add(offset as usize), size as usize)
        })
    }

    /// Mutable byte view of a sub-range.
    pub fn bytes_mut(&mut self, offset: u64, size: u64) -> Result<&mut [u8]> {
        self.check_range(offset, size)?;
        // SAFETY: range checked against the mapped window, mapping current,
        // and the mutable borrow is exclusive through `&mut self`.
        Ok(unsafe {
            core::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset as usize), size as usize)
        })
    }

    /// Copy `data` into the window at `offset`.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.bytes_mut(offset, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    /// Copy `out.len()` bytes from the window at `offset`.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.bytes(offset, out.len() as u64)?);
        Ok(())
    }

    /// Unmap the window.
    ///
    /// Fails with [`Error::StaleMapping`] if the mapping was already
    /// superseded by a later `map` on the same raw allocation.
    pub fn unmap(self) -> Result<()> {
        self.check()?;
        self.raw.device.unmap(self.raw.handle);
        self.raw.map_epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

// ============================================================================
// Device Memory
// ============================================================================

enum Backing {
    /// Owns its raw allocation; destroy frees it.
    Dedicated,
    /// A carved view into a block; destroy marks the slot for reuse.
    Pooled {
        block: Arc<BlockShared>,
        slot: u32,
    },
}

/// Handle to one logical device-memory allocation.
pub struct DeviceMemory {
    raw: Arc<RawMemory>,
    backing: Backing,
    offset: u64,
    size: u64,
}

impl DeviceMemory {
    pub(crate) fn dedicated(raw: RawMemory) -> Self {
        let size = raw.size();
        Self {
            raw: Arc::new(raw),
            backing: Backing::Dedicated,
            offset: 0,
            size,
        }
    }

    pub(crate) fn pooled(
        raw: Arc<RawMemory>,
        block: Arc<BlockShared>,
        slot: u32,
        offset: u64,
        size: u64,
    ) -> Self {
        Self {
            raw,
            backing: Backing::Pooled { block, slot },
            offset,
            size,
        }
    }

    /// Allocation size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte offset within the raw allocation (zero for dedicated memory).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Index of the memory type this allocation came from.
    pub fn memory_type_index(&self) -> u32 {
        self.raw.type_index()
    }

    /// Whether this allocation has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        match &self.backing {
            Backing::Dedicated => self.raw.is_released(),
            Backing::Pooled { block, slot } => block.slot_destroyed(*slot),
        }
    }

    /// Destroy the allocation.
    ///
    /// Dedicated memory is returned to the driver; pooled memory is marked
    /// for in-place reuse by its pool. Destroying twice is an error.
    pub fn destroy(&self) -> Result<()> {
        match &self.backing {
            Backing::Dedicated => {
                if self.raw.release() {
                    Ok(())
                } else {
                    Err(Error::AlreadyDestroyed)
                }
            },
            Backing::Pooled { block, slot } => block.destroy_slot(*slot),
        }
    }

    /// Map a window of this allocation.
    ///
    /// Mapping delegates to the owning raw allocation, so mapping any
    /// sub-allocation supersedes an existing mapping anywhere on the same
    /// block; the superseded region fails loudly on its next use.
    pub fn map(&self, offset: u64, size: u64) -> Result<Region> {
        if self.is_destroyed() {
            return Err(Error::AlreadyDestroyed);
        }
        if offset + size > self.size {
            return Err(Error::OutOfBounds {
                offset,
                size,
                limit: self.size,
            });
        }
        RawMemory::map_window(&self.raw, self.offset + offset, size)
    }
}
