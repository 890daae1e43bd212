//! Resolved per-route plan: ordered transform lists plus execution policy.

pub mod builder;
pub mod provider;

use crate::config::FailureMode;
use crate::message::context::Side;
use crate::transform::Transform;
use std::time::Duration;

pub use builder::PlanBuilder;
pub use provider::{
    normalize_path, plan_cache_key, CachingPlanProvider, PlanError, PlanProvider, RouteEntry,
    RoutePolicy, RouteStore, RouteTable,
};

/// One scheduled transform. `order` is the ascending scheduling key within a
/// side; by convention multiples of ten so inserts never renumber, but any
/// integer is valid.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub order: i32,
    pub transform: Transform,
}

impl PlanEntry {
    pub fn new(order: i32, transform: Transform) -> Self {
        Self { order, transform }
    }
}

/// Ordered request/response transform lists plus timeout and failure policy.
///
/// `timeout == Duration::ZERO` means "use the global default". The explicit
/// failure-mode flag is load-bearing: the enum's own default must never
/// silently decide the policy, so an unset mode falls back to the global
/// default instead.
#[derive(Debug, Clone)]
pub struct TransformationPlan {
    pub request: Vec<PlanEntry>,
    pub response: Vec<PlanEntry>,
    pub timeout: Duration,
    pub failure_mode: FailureMode,
    pub explicit_failure_mode: bool,
    pub allow_parallel: bool,
}

impl TransformationPlan {
    /// Pass-through plan; global defaults everywhere.
    pub fn empty() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
            timeout: Duration::ZERO,
            failure_mode: FailureMode::default(),
            explicit_failure_mode: false,
            allow_parallel: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }

    pub fn entries(&self, side: Side) -> &[PlanEntry] {
        match side {
            Side::Request => &self.request,
            Side::Response => &self.response,
        }
    }

    /// Copy of one side's entries, stably sorted ascending by order; ties
    /// keep insertion order.
    pub fn sorted_entries(&self, side: Side) -> Vec<PlanEntry> {
        let mut entries = self.entries(side).to_vec();
        entries.sort_by_key(|entry| entry.order);
        entries
    }

    fn side_signature(entries: &[PlanEntry]) -> Vec<(i32, &'static str)> {
        entries
            .iter()
            .map(|entry| (entry.order, entry.transform.name()))
            .collect()
    }
}

impl Default for TransformationPlan {
    fn default() -> Self {
        Self::empty()
    }
}

// Equality is structural: entry orders and names per side plus policy.
impl PartialEq for TransformationPlan {
    fn eq(&self, other: &Self) -> bool {
        Self::side_signature(&self.request) == Self::side_signature(&other.request)
            && Self::side_signature(&self.response) == Self::side_signature(&other.response)
            && self.timeout == other.timeout
            && self.failure_mode == other.failure_mode
            && self.explicit_failure_mode == other.explicit_failure_mode
            && self.allow_parallel == other.allow_parallel
    }
}

impl Eq for TransformationPlan {}
