//! # Allocators
//!
//! The allocator seam and the direct (unpooled) implementation. Pooled
//! allocation lives in [`crate::pooled`]; callers that want to mix the two
//! route through [`crate::service`].

use std::sync::Arc;

use basalt_core::{Error, MemoryDevice, Result};

use crate::heap::MemoryProperties;
use crate::memory::{DeviceMemory, RawMemory};
use crate::select::MemoryRequest;

// ============================================================================
// Allocator Trait
// ============================================================================

/// A device-memory allocator.
pub trait Allocator: Send + Sync {
    /// The memory properties snapshot this allocator works against.
    fn properties(&self) -> &MemoryProperties;

    /// Allocate exactly `size` bytes of the given memory type.
    fn allocate_with_type(&self, type_index: u32, size: u64) -> Result<DeviceMemory>;

    /// Select a memory type for the request, then allocate.
    ///
    /// Selection is the single-pass walk: the first type covering the
    /// required set is remembered as a fallback and any type covering the
    /// optimal set wins immediately.
    fn allocate(&self, request: &MemoryRequest) -> Result<DeviceMemory> {
        let type_index = self
            .properties()
            .find_memory_type(request.type_filter, request.required, request.optimal)
            .ok_or(Error::NoSuitableMemoryType {
                type_filter: request.type_filter,
                required: request.required,
            })?;
        self.allocate_with_type(type_index, request.size)
    }
}

// ============================================================================
// Direct Allocator
// ============================================================================

/// Allocator that forwards every request straight to the driver.
///
/// No pooling: each call is a real hardware allocation and each destroy a
/// real free. Appropriate for large, long-lived, or one-off allocations.
pub struct DirectAllocator {
    device: Arc<dyn MemoryDevice>,
    properties: Arc<MemoryProperties>,
}

impl DirectAllocator {
    /// Create a direct allocator.
    pub fn new(device: Arc<dyn MemoryDevice>, properties: Arc<MemoryProperties>) -> Self {
        Self { device, properties }
    }
}

impl Allocator for DirectAllocator {
    fn properties(&self) -> &MemoryProperties {
        &self.properties
    }

    fn allocate_with_type(&self, type_index: u32, size: u64) -> Result<DeviceMemory> {
        let memory_type =
            self.properties
                .memory_type(type_index)
                .ok_or(Error::NoSuitableMemoryType {
                    type_filter: 1 << type_index,
                    required: Default::default(),
                })?;

        let allocation = self.device.allocate(type_index, size)?;
        if !allocation.handle.is_valid() || allocation.size < size {
            // A short or null result from the driver is an internal
            // invariant violation, not something to retry.
            if allocation.handle.is_valid() {
                self.device.free(allocation.handle);
            }
            return Err(Error::AllocationFailed { type_index, size });
        }

        Ok(DeviceMemory::dedicated(RawMemory::new(
            Arc::clone(&self.device),
            allocation,
            type_index,
            memory_type.is_host_visible(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::{HostDevice, MemoryPropertyFlags, RawAllocation};
    use crate::select::MemoryRequest;

    fn direct() -> (Arc<HostDevice>, DirectAllocator) {
        let device = Arc::new(HostDevice::new());
        let properties = Arc::new(MemoryProperties::default());
        (device.clone(), DirectAllocator::new(device, properties))
    }

    #[test]
    fn test_every_call_hits_the_driver() {
        let (device, allocator) = direct();

        let a = allocator.allocate_with_type(0, 256).unwrap();
        let b = allocator.allocate_with_type(0, 256).unwrap();
        assert_eq!(device.allocation_calls(), 2);
        assert_eq!(a.size(), 256);

        a.destroy().unwrap();
        b.destroy().unwrap();
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn test_allocate_selects_then_delegates() {
        let (device, allocator) = direct();

        let request = MemoryRequest::new(
            128,
            0b111,
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::empty(),
        );
        let memory = allocator.allocate(&request).unwrap();
        assert_eq!(memory.memory_type_index(), 1);
        assert_eq!(device.allocation_calls(), 1);
    }

    #[test]
    fn test_allocate_fails_without_matching_type() {
        let (_device, allocator) = direct();

        let request = MemoryRequest::new(
            128,
            0b111,
            MemoryPropertyFlags::PROTECTED,
            MemoryPropertyFlags::empty(),
        );
        assert!(matches!(
            allocator.allocate(&request),
            Err(Error::NoSuitableMemoryType { .. })
        ));
    }

    #[test]
    fn test_unknown_type_index_rejected() {
        let (_device, allocator) = direct();
        assert!(allocator.allocate_with_type(9, 64).is_err());
    }

    #[test]
    fn test_short_driver_result_is_fatal() {
        struct ShortDevice;
        impl MemoryDevice for ShortDevice {
            fn allocate(&self, _type_index: u32, size: u64) -> Result<RawAllocation> {
                Ok(RawAllocation {
                    handle: basalt_core::MemoryHandle(7),
                    size: size / 2,
                })
            }
            fn free(&self, _handle: basalt_core::MemoryHandle) {}
            fn map(
                &self,
                _handle: basalt_core::MemoryHandle,
                _offset: u64,
                _size: u64,
            ) -> Result<std::ptr::NonNull<u8>> {
                Err(Error::StaleMapping)
            }
            fn unmap(&self, _handle: basalt_core::MemoryHandle) {}
        }

        let allocator = DirectAllocator::new(
            Arc::new(ShortDevice),
            Arc::new(MemoryProperties::default()),
        );
        assert!(matches!(
            allocator.allocate_with_type(0, 64),
            Err(Error::AllocationFailed {
                type_index: 0,
                size: 64
            })
        ));
    }
}
