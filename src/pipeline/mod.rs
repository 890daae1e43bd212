pub mod executor;

use crate::message::context::Side;
use thiserror::Error;

pub use executor::{EntryReport, EntryStatus, PipelineExecutor, PipelineReport};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raised only under `StopPipeline`; the host translates this into a
    /// 502 gateway error and stops the exchange.
    #[error("{side} transformation failed in `{transform}`")]
    TransformationFailed { transform: String, side: Side },
    /// The client went away; not a transform failure, never enters failure
    /// handling.
    #[error("exchange aborted by client")]
    ClientAbort,
}
