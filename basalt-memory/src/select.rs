//! # Memory Type Selection
//!
//! Matching a size/type-filter requirement plus required/optimal property
//! sets against the enumerated memory types.

use std::sync::Arc;

use basalt_core::{Error, MemoryPropertyFlags, Result};

use crate::heap::{MemoryProperties, MemoryType};

// ============================================================================
// Memory Requirements
// ============================================================================

/// Low-level requirements produced by buffer/image creation.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRequirements {
    /// Size in bytes; must be non-zero.
    pub size: u64,
    /// Bitmask of suitable memory types; must be non-zero.
    pub memory_type_bits: u32,
}

impl MemoryRequirements {
    /// Create new requirements.
    pub fn new(size: u64, memory_type_bits: u32) -> Self {
        Self {
            size,
            memory_type_bits,
        }
    }
}

// ============================================================================
// Sharing Mode
// ============================================================================

/// Queue sharing mode of the resource the memory backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharingMode {
    /// Owned by one queue family at a time.
    #[default]
    Exclusive,
    /// Concurrently accessible from multiple queue families.
    Concurrent,
}

// ============================================================================
// Memory Profile
// ============================================================================

/// A request's intent: how the resource is used and which memory
/// properties it needs or prefers.
///
/// `usage` is the resource-specific usage flag set (buffer or image);
/// it must be non-empty. `optimal` need not be a superset of `required`.
#[derive(Debug, Clone, Copy)]
pub struct MemoryProfile<U> {
    /// Resource usage flags.
    pub usage: U,
    /// Sharing mode.
    pub sharing: SharingMode,
    /// Properties the memory type must have.
    pub required: MemoryPropertyFlags,
    /// Properties the memory type should ideally have.
    pub optimal: MemoryPropertyFlags,
}

impl<U: Copy> MemoryProfile<U> {
    /// Create a profile with required properties only.
    pub fn new(usage: U, required: MemoryPropertyFlags) -> Self {
        Self {
            usage,
            sharing: SharingMode::Exclusive,
            required,
            optimal: MemoryPropertyFlags::empty(),
        }
    }

    /// Set the optimal property set.
    pub fn with_optimal(mut self, optimal: MemoryPropertyFlags) -> Self {
        self.optimal = optimal;
        self
    }

    /// Set the sharing mode.
    pub fn with_sharing(mut self, sharing: SharingMode) -> Self {
        self.sharing = sharing;
        self
    }

    /// Combine with requirements into the erased request the allocator
    /// stack consumes.
    pub fn request(&self, requirements: &MemoryRequirements) -> MemoryRequest {
        MemoryRequest {
            size: requirements.size,
            type_filter: requirements.memory_type_bits,
            required: self.required,
            optimal: self.optimal,
        }
    }
}

// ============================================================================
// Memory Request
// ============================================================================

/// The low-level shape handed to selection and routing.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRequest {
    /// Size in bytes; must be non-zero.
    pub size: u64,
    /// Bitmask of acceptable memory type indices; must be non-zero.
    pub type_filter: u32,
    /// Properties the selected type must have.
    pub required: MemoryPropertyFlags,
    /// Properties the selected type should ideally have.
    pub optimal: MemoryPropertyFlags,
}

impl MemoryRequest {
    /// Create a new request.
    pub fn new(
        size: u64,
        type_filter: u32,
        required: MemoryPropertyFlags,
        optimal: MemoryPropertyFlags,
    ) -> Self {
        Self {
            size,
            type_filter,
            required,
            optimal,
        }
    }
}

// ============================================================================
// Memory Selector
// ============================================================================

/// Matches requests to concrete memory types over a properties snapshot.
#[derive(Clone)]
pub struct MemorySelector {
    properties: Arc<MemoryProperties>,
}

impl MemorySelector {
    /// Create a selector over a snapshot.
    pub fn new(properties: Arc<MemoryProperties>) -> Self {
        Self { properties }
    }

    /// The underlying snapshot.
    pub fn properties(&self) -> &MemoryProperties {
        &self.properties
    }

    /// Select a memory type for the request.
    ///
    /// Two passes over the filtered types: any type covering both the
    /// required and optimal sets wins outright; otherwise any type
    /// covering the required set; otherwise the selection fails with the
    /// request attached.
    pub fn select(&self, request: &MemoryRequest) -> Result<&MemoryType> {
        let filtered = || {
            self.properties
                .types()
                .iter()
                .filter(|t| (request.type_filter & (1 << t.index)) != 0)
        };

        let preferred = request.required | request.optimal;
        if let Some(ty) = filtered().find(|t| t.property_flags.contains(preferred)) {
            return Ok(ty);
        }
        if let Some(ty) = filtered().find(|t| t.property_flags.contains(request.required)) {
            return Ok(ty);
        }

        Err(Error::NoSuitableMemoryType {
            type_filter: request.type_filter,
            required: request.required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::MemoryHeap;
    use basalt_core::HeapFlags;

    fn two_type_snapshot() -> Arc<MemoryProperties> {
        Arc::new(MemoryProperties::new(
            vec![
                MemoryHeap::new(0, 1024, HeapFlags::DEVICE_LOCAL),
                MemoryHeap::new(1, 1024, HeapFlags::empty()),
            ],
            vec![
                MemoryType::new(0, 0, MemoryPropertyFlags::DEVICE_LOCAL),
                MemoryType::new(1, 1, MemoryPropertyFlags::CPU_TO_GPU),
            ],
        ))
    }

    #[test]
    fn test_optimal_wins_over_required() {
        // Device-local and host-visible+coherent types, empty required,
        // optimal host-visible: the host-visible type is chosen.
        let selector = MemorySelector::new(two_type_snapshot());
        let request = MemoryRequest::new(
            64,
            0b11,
            MemoryPropertyFlags::empty(),
            MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(selector.select(&request).unwrap().index, 1);
    }

    #[test]
    fn test_selected_index_is_in_filter() {
        let selector = MemorySelector::new(two_type_snapshot());
        let request = MemoryRequest::new(
            64,
            0b10,
            MemoryPropertyFlags::empty(),
            MemoryPropertyFlags::empty(),
        );
        let ty = selector.select(&request).unwrap();
        assert_ne!(request.type_filter & (1 << ty.index), 0);
    }

    #[test]
    fn test_required_fallback() {
        let selector = MemorySelector::new(two_type_snapshot());
        let request = MemoryRequest::new(
            64,
            0b11,
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::PROTECTED,
        );
        assert_eq!(selector.select(&request).unwrap().index, 1);
    }

    #[test]
    fn test_empty_filter_fails() {
        let selector = MemorySelector::new(two_type_snapshot());
        let request = MemoryRequest::new(
            64,
            0b100,
            MemoryPropertyFlags::empty(),
            MemoryPropertyFlags::empty(),
        );
        assert!(matches!(
            selector.select(&request),
            Err(Error::NoSuitableMemoryType { type_filter: 0b100, .. })
        ));
    }

    #[test]
    fn test_unsatisfiable_required_fails() {
        let selector = MemorySelector::new(two_type_snapshot());
        let request = MemoryRequest::new(
            64,
            0b11,
            MemoryPropertyFlags::PROTECTED,
            MemoryPropertyFlags::empty(),
        );
        assert!(selector.select(&request).is_err());
    }

    #[test]
    fn test_two_pass_and_single_pass_agree_on_selectability() {
        let snapshot = two_type_snapshot();
        let selector = MemorySelector::new(snapshot.clone());

        let cases = [
            (0b11, MemoryPropertyFlags::empty(), MemoryPropertyFlags::HOST_VISIBLE),
            (0b11, MemoryPropertyFlags::DEVICE_LOCAL, MemoryPropertyFlags::empty()),
            (0b01, MemoryPropertyFlags::HOST_VISIBLE, MemoryPropertyFlags::empty()),
            (0b11, MemoryPropertyFlags::PROTECTED, MemoryPropertyFlags::PROTECTED),
        ];

        for (filter, required, optimal) in cases {
            let request = MemoryRequest::new(16, filter, required, optimal);
            let two_pass = selector.select(&request).is_ok();
            let single_pass = snapshot.find_memory_type(filter, required, optimal).is_some();
            assert_eq!(two_pass, single_pass, "filter {:#b}", filter);
        }
    }

    #[test]
    fn test_profile_request_erasure() {
        bitflags::bitflags! {
            #[derive(Debug, Clone, Copy)]
            struct BufferUsage: u32 { const VERTEX = 1; }
        }

        let profile = MemoryProfile::new(BufferUsage::VERTEX, MemoryPropertyFlags::HOST_VISIBLE)
            .with_optimal(MemoryPropertyFlags::GPU_TO_CPU);
        let request = profile.request(&MemoryRequirements::new(256, 0b11));

        assert_eq!(request.size, 256);
        assert_eq!(request.type_filter, 0b11);
        assert_eq!(request.required, MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(request.optimal, MemoryPropertyFlags::GPU_TO_CPU);
    }
}
