//! # Memory Flag Sets
//!
//! Property and heap flag sets mirroring the hardware enumeration.

use bitflags::bitflags;

// ============================================================================
// Memory Property Flags
// ============================================================================

bitflags! {
    /// Access properties of a memory type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        /// Device local memory (fast GPU access).
        const DEVICE_LOCAL = 1 << 0;
        /// Host visible memory (CPU can map).
        const HOST_VISIBLE = 1 << 1;
        /// Host coherent memory (no flush/invalidate needed).
        const HOST_COHERENT = 1 << 2;
        /// Host cached memory (faster CPU reads).
        const HOST_CACHED = 1 << 3;
        /// Lazily allocated memory.
        const LAZILY_ALLOCATED = 1 << 4;
        /// Protected memory.
        const PROTECTED = 1 << 5;
    }
}

impl Default for MemoryPropertyFlags {
    fn default() -> Self {
        MemoryPropertyFlags::empty()
    }
}

impl MemoryPropertyFlags {
    /// GPU only (device local, not host visible).
    pub const GPU_ONLY: Self = Self::DEVICE_LOCAL;
    /// CPU to GPU (upload heap).
    pub const CPU_TO_GPU: Self =
        Self::from_bits_truncate(Self::HOST_VISIBLE.bits() | Self::HOST_COHERENT.bits());
    /// GPU to CPU (readback heap).
    pub const GPU_TO_CPU: Self = Self::from_bits_truncate(
        Self::HOST_VISIBLE.bits() | Self::HOST_COHERENT.bits() | Self::HOST_CACHED.bits(),
    );
}

// ============================================================================
// Heap Flags
// ============================================================================

bitflags! {
    /// Flags of a physical memory heap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeapFlags: u32 {
        /// Device local heap.
        const DEVICE_LOCAL = 1 << 0;
        /// Multi-instance heap.
        const MULTI_INSTANCE = 1 << 1;
    }
}

impl Default for HeapFlags {
    fn default() -> Self {
        HeapFlags::empty()
    }
}
