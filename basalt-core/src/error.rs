//! # BASALT Error Handling
//!
//! Unified error type for the allocation stack.
//!
//! Every failure is fatal to the requesting call; the core never retries
//! or falls back on its own. Callers that want a second attempt with a
//! different allocator do so through the routing layer, explicitly.

use core::fmt;

use crate::flags::MemoryPropertyFlags;

// ============================================================================
// Result Type
// ============================================================================

/// BASALT result type alias.
pub type Result<T> = core::result::Result<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Unified allocation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // ========================================================================
    // Selection Errors
    // ========================================================================
    /// No enumerated memory type matches the filter and required properties.
    NoSuitableMemoryType {
        /// Type filter bitmask from the request.
        type_filter: u32,
        /// Required property set from the request.
        required: MemoryPropertyFlags,
    },

    // ========================================================================
    // Allocation Errors
    // ========================================================================
    /// The driver call failed, returned a null handle, or returned less
    /// memory than requested.
    AllocationFailed {
        /// Memory type the allocation was attempted against.
        type_index: u32,
        /// Requested size in bytes.
        size: u64,
    },
    /// A growth policy produced a size smaller than the request.
    PolicyViolation {
        /// Bytes the caller asked for.
        requested: u64,
        /// Bytes the policy decided on.
        adjusted: u64,
    },
    /// The global allocation-count ceiling was reached.
    TooManyAllocations {
        /// Configured maximum number of allocations.
        max: u32,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation on a memory object that was already destroyed.
    AlreadyDestroyed,
    /// Mapping was requested on a memory type that is not host visible.
    NotHostVisible {
        /// Offending memory type index.
        type_index: u32,
    },
    /// The region's mapping was superseded or torn down; the handle is stale.
    StaleMapping,
    /// The driver failed to map host-visible memory.
    MappingFailed {
        /// Memory type the mapping was attempted against.
        type_index: u32,
    },
    /// A byte range does not fit inside its backing window.
    OutOfBounds {
        /// Range start.
        offset: u64,
        /// Range length.
        size: u64,
        /// Size of the window the range must fit in.
        limit: u64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuitableMemoryType {
                type_filter,
                required,
            } => write!(
                f,
                "no suitable memory type for filter {:#b} and required properties {:?}",
                type_filter, required
            ),
            Self::AllocationFailed { type_index, size } => write!(
                f,
                "device allocation of {} bytes failed for memory type {}",
                size, type_index
            ),
            Self::PolicyViolation {
                requested,
                adjusted,
            } => write!(
                f,
                "block policy produced {} bytes for a {} byte request",
                adjusted, requested
            ),
            Self::TooManyAllocations { max } => {
                write!(f, "maximum number of allocations exceeded ({})", max)
            },
            Self::AlreadyDestroyed => write!(f, "memory object already destroyed"),
            Self::NotHostVisible { type_index } => {
                write!(f, "memory type {} is not host visible", type_index)
            },
            Self::StaleMapping => write!(f, "mapped region is stale"),
            Self::MappingFailed { type_index } => {
                write!(f, "mapping failed for memory type {}", type_index)
            },
            Self::OutOfBounds {
                offset,
                size,
                limit,
            } => write!(
                f,
                "range {}..{} out of bounds for {} byte window",
                offset,
                offset + size,
                limit
            ),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::TooManyAllocations { max: 4 };
        assert_eq!(
            err.to_string(),
            "maximum number of allocations exceeded (4)"
        );

        let err = Error::OutOfBounds {
            offset: 8,
            size: 16,
            limit: 12,
        };
        assert_eq!(err.to_string(), "range 8..24 out of bounds for 12 byte window");
    }

    #[test]
    fn test_selection_error_carries_request() {
        let err = Error::NoSuitableMemoryType {
            type_filter: 0b101,
            required: MemoryPropertyFlags::HOST_VISIBLE,
        };
        match err {
            Error::NoSuitableMemoryType { type_filter, .. } => assert_eq!(type_filter, 0b101),
            _ => unreachable!(),
        }
    }
}
