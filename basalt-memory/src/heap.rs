//! # Memory Heaps and Types
//!
//! Immutable descriptors of the hardware memory layout, captured once at
//! startup and passed by reference into everything that selects or pools
//! memory. Heap back-references are plain indices into the snapshot, not
//! live pointers.

use basalt_core::{HeapFlags, MemoryPropertyFlags};

// ============================================================================
// Memory Heap
// ============================================================================

/// A physical memory heap.
#[derive(Debug, Clone, Copy)]
pub struct MemoryHeap {
    /// Heap index within the enumeration.
    pub index: u32,
    /// Heap size in bytes.
    pub size: u64,
    /// Heap flags.
    pub flags: HeapFlags,
}

impl MemoryHeap {
    /// Create a new heap descriptor.
    pub fn new(index: u32, size: u64, flags: HeapFlags) -> Self {
        Self { index, size, flags }
    }

    /// Check if device local.
    pub fn is_device_local(&self) -> bool {
        self.flags.contains(HeapFlags::DEVICE_LOCAL)
    }
}

// ============================================================================
// Memory Type
// ============================================================================

/// A memory type: a heap plus a set of access properties.
#[derive(Debug, Clone, Copy)]
pub struct MemoryType {
    /// Type index; matches the driver's bit position in type filters.
    pub index: u32,
    /// Index of the owning heap in the snapshot.
    pub heap_index: u32,
    /// Access properties.
    pub property_flags: MemoryPropertyFlags,
}

impl MemoryType {
    /// Create a new memory type descriptor.
    pub fn new(index: u32, heap_index: u32, property_flags: MemoryPropertyFlags) -> Self {
        Self {
            index,
            heap_index,
            property_flags,
        }
    }

    /// Check if device local.
    pub fn is_device_local(&self) -> bool {
        self.property_flags
            .contains(MemoryPropertyFlags::DEVICE_LOCAL)
    }

    /// Check if host visible.
    pub fn is_host_visible(&self) -> bool {
        self.property_flags
            .contains(MemoryPropertyFlags::HOST_VISIBLE)
    }
}

// ============================================================================
// Memory Properties
// ============================================================================

/// Snapshot of the device's memory heaps and types.
///
/// Built once from the hardware enumeration; type and heap indices are
/// positional, so `types[i].index == i` always holds.
#[derive(Debug, Clone)]
pub struct MemoryProperties {
    heaps: Vec<MemoryHeap>,
    types: Vec<MemoryType>,
}

impl MemoryProperties {
    /// Create a snapshot from enumerated heaps and types.
    ///
    /// # Panics
    ///
    /// Panics if any descriptor's index does not match its position, or if
    /// a type references a heap outside the snapshot.
    pub fn new(heaps: Vec<MemoryHeap>, types: Vec<MemoryType>) -> Self {
        for (i, heap) in heaps.iter().enumerate() {
            assert_eq!(heap.index as usize, i, "heap index must be positional");
        }
        for (i, ty) in types.iter().enumerate() {
            assert_eq!(ty.index as usize, i, "type index must be positional");
            assert!(
                (ty.heap_index as usize) < heaps.len(),
                "type references unknown heap"
            );
        }
        Self { heaps, types }
    }

    /// All memory types.
    pub fn types(&self) -> &[MemoryType] {
        &self.types
    }

    /// All memory heaps.
    pub fn heaps(&self) -> &[MemoryHeap] {
        &self.heaps
    }

    /// Get a memory type by index.
    pub fn memory_type(&self, index: u32) -> Option<&MemoryType> {
        self.types.get(index as usize)
    }

    /// Get a heap by index.
    pub fn heap(&self, index: u32) -> Option<&MemoryHeap> {
        self.heaps.get(index as usize)
    }

    /// Heap owning the given memory type.
    pub fn heap_of(&self, ty: &MemoryType) -> &MemoryHeap {
        &self.heaps[ty.heap_index as usize]
    }

    /// Memory types backed by the given heap.
    pub fn types_for_heap(&self, heap_index: u32) -> impl Iterator<Item = &MemoryType> {
        self.types
            .iter()
            .filter(move |t| t.heap_index == heap_index)
    }

    /// Single-pass memory type search.
    ///
    /// Walks the filtered types once, returning immediately on a type whose
    /// properties cover both the required and optimal sets, and otherwise
    /// remembering the first type that covers `required` as the fallback.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        required: MemoryPropertyFlags,
        optimal: MemoryPropertyFlags,
    ) -> Option<u32> {
        let mut fallback = None;

        for ty in &self.types {
            if (type_filter & (1 << ty.index)) == 0 {
                continue;
            }
            if ty.property_flags.contains(required | optimal) {
                return Some(ty.index);
            }
            if fallback.is_none() && ty.property_flags.contains(required) {
                fallback = Some(ty.index);
            }
        }

        fallback
    }

    /// Find a device-local memory type.
    pub fn find_device_local(&self, type_filter: u32) -> Option<u32> {
        self.find_memory_type(
            type_filter,
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
    }

    /// Find an upload (CPU to GPU) memory type.
    pub fn find_upload(&self, type_filter: u32) -> Option<u32> {
        self.find_memory_type(
            type_filter,
            MemoryPropertyFlags::CPU_TO_GPU,
            MemoryPropertyFlags::CPU_TO_GPU,
        )
    }
}

impl Default for MemoryProperties {
    /// Plausible two-heap snapshot for tests and demos.
    fn default() -> Self {
        Self::new(
            vec![
                MemoryHeap::new(0, 4 * 1024 * 1024 * 1024, HeapFlags::DEVICE_LOCAL),
                MemoryHeap::new(1, 16 * 1024 * 1024 * 1024, HeapFlags::empty()),
            ],
            vec![
                MemoryType::new(0, 0, MemoryPropertyFlags::DEVICE_LOCAL),
                MemoryType::new(1, 1, MemoryPropertyFlags::CPU_TO_GPU),
                MemoryType::new(2, 1, MemoryPropertyFlags::GPU_TO_CPU),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_indices() {
        let props = MemoryProperties::default();
        for (i, ty) in props.types().iter().enumerate() {
            assert_eq!(ty.index as usize, i);
        }
    }

    #[test]
    #[should_panic(expected = "type index must be positional")]
    fn test_non_positional_type_rejected() {
        MemoryProperties::new(
            vec![MemoryHeap::new(0, 1024, HeapFlags::empty())],
            vec![MemoryType::new(3, 0, MemoryPropertyFlags::empty())],
        );
    }

    #[test]
    fn test_heap_back_reference() {
        let props = MemoryProperties::default();
        let ty = props.memory_type(1).unwrap();
        let heap = props.heap_of(ty);
        assert_eq!(heap.index, 1);
        assert_eq!(props.types_for_heap(1).count(), 2);
        assert_eq!(props.types_for_heap(0).count(), 1);
    }

    #[test]
    fn test_find_prefers_optimal() {
        let props = MemoryProperties::default();
        // Both type 1 and 2 satisfy HOST_VISIBLE; optimal HOST_CACHED picks 2.
        let index = props.find_memory_type(
            0b110,
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED,
        );
        assert_eq!(index, Some(2));
    }

    #[test]
    fn test_find_falls_back_to_first_required() {
        let props = MemoryProperties::default();
        let index = props.find_memory_type(
            0b111,
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::PROTECTED,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn test_find_respects_filter() {
        let props = MemoryProperties::default();
        let index = props.find_memory_type(
            0b001,
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(index, None);
    }
}
