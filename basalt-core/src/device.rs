//! # Driver Abstraction
//!
//! The narrow seam between the allocator stack and the graphics driver:
//! raw allocate/free of device memory and map/unmap of host-visible
//! memory, over opaque handles.

use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

// ============================================================================
// Memory Handle
// ============================================================================

/// Opaque driver handle to one raw device-memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MemoryHandle(pub u64);

impl MemoryHandle {
    /// Null/invalid handle.
    pub const NULL: Self = Self(0);

    /// Creates from raw value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if valid.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

// ============================================================================
// Raw Allocation
// ============================================================================

/// Result of one raw driver allocation.
#[derive(Debug, Clone, Copy)]
pub struct RawAllocation {
    /// Driver handle.
    pub handle: MemoryHandle,
    /// Actual size the driver granted, in bytes.
    pub size: u64,
}

// ============================================================================
// Memory Device Trait
// ============================================================================

/// Driver-side device-memory operations.
///
/// Implementations wrap the real driver primitive. The allocator stack
/// treats every failure as fatal to the requesting call; implementations
/// must not retry internally.
pub trait MemoryDevice: Send + Sync {
    /// Allocate `size` bytes of the given memory type.
    fn allocate(&self, type_index: u32, size: u64) -> Result<RawAllocation>;

    /// Free a raw allocation.
    fn free(&self, handle: MemoryHandle);

    /// Map a byte range of a host-visible allocation.
    fn map(&self, handle: MemoryHandle, offset: u64, size: u64) -> Result<NonNull<u8>>;

    /// Unmap a previously mapped allocation.
    fn unmap(&self, handle: MemoryHandle);
}

// ============================================================================
// Host Device
// ============================================================================

/// System-memory reference implementation of [`MemoryDevice`].
///
/// Backs every allocation with a zeroed host buffer and accepts any memory
/// type index. Mapping returns a pointer into the buffer, so host-visible
/// semantics are exercised for real. The allocation-call counter lets
/// callers observe exactly how many raw allocations a workload issued.
pub struct HostDevice {
    buffers: Mutex<BTreeMap<u64, Box<[u8]>>>,
    next_handle: AtomicU64,
    allocation_calls: AtomicU64,
}

impl HostDevice {
    /// Create a new host device.
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            allocation_calls: AtomicU64::new(0),
        }
    }

    /// Total number of raw allocation calls ever issued.
    pub fn allocation_calls(&self) -> u64 {
        self.allocation_calls.load(Ordering::Relaxed)
    }

    /// Number of raw allocations currently live.
    pub fn live_allocations(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice for HostDevice {
    fn allocate(&self, type_index: u32, size: u64) -> Result<RawAllocation> {
        if size == 0 {
            return Err(Error::AllocationFailed { type_index, size });
        }

        let data = vec![0u8; size as usize].into_boxed_slice();
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().unwrap().insert(handle, data);
        self.allocation_calls.fetch_add(1, Ordering::Relaxed);

        Ok(RawAllocation {
            handle: MemoryHandle(handle),
            size,
        })
    }

    fn free(&self, handle: MemoryHandle) {
        self.buffers.lock().unwrap().remove(&handle.raw());
    }

    fn map(&self, handle: MemoryHandle, offset: u64, size: u64) -> Result<NonNull<u8>> {
        let mut buffers = self.buffers.lock().unwrap();
        let data = buffers
            .get_mut(&handle.raw())
            .ok_or(Error::StaleMapping)?;

        let limit = data.len() as u64;
        if offset + size > limit {
            return Err(Error::OutOfBounds {
                offset,
                size,
                limit,
            });
        }

        // The boxed slice never moves while it lives in the map, so the
        // pointer stays valid until `free` removes the entry.
        NonNull::new(unsafe { data.as_mut_ptr().add(offset as usize) })
            .ok_or(Error::StaleMapping)
    }

    fn unmap(&self, _handle: MemoryHandle) {}
}
