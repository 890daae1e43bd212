#![forbid(unsafe_code)]

//! Framework-agnostic HTTP request/response transformation pipeline.
//!
//! For every exchange the host resolves a route-specific plan through a
//! [`plan::PlanProvider`], runs the request-side transforms over a
//! [`message::MessageContext`], forwards to the backend, runs the
//! response-side transforms, and writes the bytes from
//! [`message::Payload::flush`] back to the wire.

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod plan;
pub mod redact;
pub mod telemetry;
pub mod transform;

pub use config::{FailureMode, GlobalOptions};
pub use error::{Error, Result};
pub use message::{
    Address, BufferedContext, MessageContext, MessageHeaders, Payload, Side, StreamingContext,
};
pub use pipeline::{PipelineError, PipelineExecutor, PipelineReport};
pub use plan::{
    CachingPlanProvider, PlanBuilder, PlanEntry, PlanProvider, RouteEntry, RoutePolicy, RouteStore,
    RouteTable, TransformationPlan,
};
pub use transform::{Transform, TransformCatalog, TransformError, TransformParams};
