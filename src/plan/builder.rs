//! Resolves persisted route rows into a ready-to-run plan.

use crate::message::context::Side;
use crate::plan::provider::{RouteEntry, RoutePolicy};
use crate::plan::{PlanEntry, TransformationPlan};
use crate::telemetry::event_id;
use crate::transform::params::TransformParams;
use crate::transform::TransformCatalog;
use std::sync::Arc;

/// Turns route rows into configured transform instances. Rows with unknown
/// keys or failing configuration are logged and dropped; the plan continues
/// with every other row.
#[derive(Clone)]
pub struct PlanBuilder {
    catalog: Arc<TransformCatalog>,
}

impl PlanBuilder {
    pub fn new(catalog: Arc<TransformCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TransformCatalog {
        &self.catalog
    }

    pub fn build(&self, rows: &[RouteEntry], policy: &RoutePolicy) -> TransformationPlan {
        let mut request = Vec::new();
        let mut response = Vec::new();

        for row in rows {
            let params = row
                .params
                .as_deref()
                .map(TransformParams::from_json_str)
                .unwrap_or_default();

            match self.catalog.create(&row.transformer, &params) {
                Ok(transform) => {
                    let entry = PlanEntry::new(row.order, transform);
                    match row.side {
                        Side::Request => request.push(entry),
                        Side::Response => response.push(entry),
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "reqrep::plan",
                        event = "plan_row_dropped",
                        event_id = event_id::PLAN_ROW_DROPPED,
                        transform = %row.transformer,
                        side = row.side.as_str(),
                        order = row.order,
                        path = %row.path,
                        error = %err,
                    );
                }
            }
        }

        TransformationPlan {
            request,
            response,
            timeout: policy.timeout,
            failure_mode: policy.failure_mode.unwrap_or_default(),
            explicit_failure_mode: policy.failure_mode.is_some(),
            allow_parallel: policy.allow_parallel,
        }
    }
}
