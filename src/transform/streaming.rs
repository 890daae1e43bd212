//! Streaming transforms. The typed context face keeps these away from the
//! buffered body accessors; the body flows through untouched.

use crate::message::context::StreamingContext;
use crate::transform::params::TransformParams;
use crate::transform::{StreamingTransform, TransformError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// No-op that makes streaming passthrough visible in traces.
#[derive(Default)]
pub struct StreamingPassthrough;

impl StreamingPassthrough {
    pub const NAME: &'static str = "streaming-passthrough";

    pub fn from_params(_params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self)
    }
}

#[async_trait]
impl StreamingTransform for StreamingPassthrough {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut StreamingContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        tracing::debug!(
            target: "reqrep::transform",
            event = "streaming_passthrough",
            transform = Self::NAME,
            content_type = ctx.content_type().unwrap_or(""),
        );
        Ok(())
    }
}

/// Marks a streamed exchange with a header; the only mutation a streaming
/// transform is allowed is headers/address.
pub struct StreamingContentTag {
    name: String,
    value: String,
}

impl StreamingContentTag {
    pub const NAME: &'static str = "streaming-content-tag";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params
                .string("name")
                .unwrap_or_else(|| "X-Streamed-By".to_string()),
            value: params
                .string("value")
                .unwrap_or_else(|| "reqrep-gateway".to_string()),
        })
    }
}

#[async_trait]
impl StreamingTransform for StreamingContentTag {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut StreamingContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().set(self.name.clone(), self.value.clone());
        Ok(())
    }
}
