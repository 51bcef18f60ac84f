//! # BASALT Core
//!
//! Foundational types for BASALT GPU memory management: the unified error
//! type, memory property flag sets, and the driver abstraction that the
//! allocator stack is layered on top of.
//!
//! The driver is deliberately a narrow seam: four operations (allocate,
//! free, map, unmap) over opaque handles. Everything above it - type
//! selection, pooling, sub-allocation - lives in `basalt-memory`.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod flags;

pub use device::{HostDevice, MemoryDevice, MemoryHandle, RawAllocation};
pub use error::{Error, Result};
pub use flags::{HeapFlags, MemoryPropertyFlags};
