//! # Allocation Service
//!
//! The facade resource subsystems talk to: it selects a memory type for a
//! request and dispatches to one of several allocators by predicate over
//! the requested properties. Pure strategy dispatch; if the resolved
//! allocator fails, the error propagates unchanged.

use std::sync::Arc;

use basalt_core::Result;

use crate::allocator::Allocator;
use crate::heap::MemoryProperties;
use crate::memory::DeviceMemory;
use crate::select::{MemoryProfile, MemoryRequest, MemoryRequirements, MemorySelector};

// ============================================================================
// Allocation Service Trait
// ============================================================================

/// Facade over allocator selection and memory-type selection.
pub trait AllocationService: Send + Sync {
    /// Allocate memory for the given requirements and intent.
    fn allocate<U: Copy>(
        &self,
        requirements: &MemoryRequirements,
        profile: &MemoryProfile<U>,
    ) -> Result<DeviceMemory>;
}

// ============================================================================
// Routing Allocation Service
// ============================================================================

type RoutePredicate = Box<dyn Fn(&MemoryRequest) -> bool + Send + Sync>;

struct Route {
    matches: RoutePredicate,
    allocator: Arc<dyn Allocator>,
}

/// Allocation service that picks an allocator per request.
///
/// Routes are consulted in registration order; the first whose predicate
/// matches wins, and the configured default serves everything else.
pub struct RoutingAllocationService {
    selector: MemorySelector,
    routes: Vec<Route>,
    fallback: Arc<dyn Allocator>,
}

impl RoutingAllocationService {
    /// Create a service with a default allocator and no routes.
    pub fn new(properties: Arc<MemoryProperties>, fallback: Arc<dyn Allocator>) -> Self {
        Self {
            selector: MemorySelector::new(properties),
            routes: Vec::new(),
            fallback,
        }
    }

    /// Append a route. Earlier routes take precedence.
    pub fn route<F>(mut self, matches: F, allocator: Arc<dyn Allocator>) -> Self
    where
        F: Fn(&MemoryRequest) -> bool + Send + Sync + 'static,
    {
        self.routes.push(Route {
            matches: Box::new(matches),
            allocator,
        });
        self
    }

    /// The selector shared by every request.
    pub fn selector(&self) -> &MemorySelector {
        &self.selector
    }

    fn resolve(&self, request: &MemoryRequest) -> &Arc<dyn Allocator> {
        self.routes
            .iter()
            .find(|route| (route.matches)(request))
            .map(|route| &route.allocator)
            .unwrap_or(&self.fallback)
    }
}

impl AllocationService for RoutingAllocationService {
    fn allocate<U: Copy>(
        &self,
        requirements: &MemoryRequirements,
        profile: &MemoryProfile<U>,
    ) -> Result<DeviceMemory> {
        let request = profile.request(requirements);
        let memory_type = self.selector.select(&request)?;
        self.resolve(&request)
            .allocate_with_type(memory_type.index, request.size)
    }
}
