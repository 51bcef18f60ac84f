//! # BASALT Memory - GPU Memory Management
//!
//! Pooled device-memory allocation layered over the raw driver primitive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Allocation Service                      │
//! │        (predicate routing over allocators)               │
//! ├───────────────────────────┬──────────────────────────────┤
//! │      PoolAllocator        │       DirectAllocator        │
//! │  (per-type pools, cap)    │   (one driver call each)     │
//! ├───────────────────────────┴──────────────────────────────┤
//! │       MemoryPool  →  Block  →  DeviceMemory / Region     │
//! │  (growth policy)    (bump carving, slot reuse)           │
//! ├──────────────────────────────────────────────────────────┤
//! │        MemoryProperties snapshot + MemorySelector        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Type selection**: filter mask plus required/optimal property sets
//! - **Pooling**: one growable pool of blocks per memory type
//! - **Sub-allocation**: linear bump carving with size-based slot reuse
//! - **Growth policies**: literal, proportional, page-quantized
//! - **Mapped regions**: epoch-validated byte access to host-visible memory

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod block;
pub mod heap;
pub mod memory;
pub mod policy;
pub mod pool;
pub mod pooled;
pub mod select;
pub mod service;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::allocator::{Allocator, DirectAllocator};
    pub use crate::block::Block;
    pub use crate::heap::{MemoryHeap, MemoryProperties, MemoryType};
    pub use crate::memory::{DeviceMemory, Region};
    pub use crate::policy::BlockPolicy;
    pub use crate::pool::{MemoryPool, PoolStats};
    pub use crate::pooled::{PoolAllocator, PoolAllocatorDesc};
    pub use crate::select::{
        MemoryProfile, MemoryRequest, MemoryRequirements, MemorySelector, SharingMode,
    };
    pub use crate::service::{AllocationService, RoutingAllocationService};
    pub use basalt_core::{
        Error, HeapFlags, HostDevice, MemoryDevice, MemoryHandle, MemoryPropertyFlags,
        RawAllocation, Result,
    };
}

pub use prelude::*;
