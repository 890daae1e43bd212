//! Header-editing transforms.

use crate::message::context::{BufferedContext, Side};
use crate::transform::params::TransformParams;
use crate::transform::{BufferedTransform, TransformError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Default response headers stripped by `remove-internal-headers`.
pub const DEFAULT_INTERNAL_HEADERS: [&str; 7] = [
    "X-Internal-Token",
    "X-Backend-Version",
    "X-Upstream-Address",
    "Server",
    "X-Powered-By",
    "X-AspNet-Version",
    "X-AspNetMvc-Version",
];

/// 32 lowercase hex characters, no dashes.
pub(crate) fn hex_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Sets a header, replacing any existing values.
pub struct AddHeader {
    name: String,
    value: String,
}

impl AddHeader {
    pub const NAME: &'static str = "add-header";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params.require_string("name")?,
            value: params.require_string("value")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for AddHeader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().set(self.name.clone(), self.value.clone());
        Ok(())
    }
}

pub struct RemoveHeader {
    name: String,
}

impl RemoveHeader {
    pub const NAME: &'static str = "remove-header";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params.require_string("name")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for RemoveHeader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.headers().contains(&self.name)
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().remove(&self.name);
        Ok(())
    }
}

pub struct RenameHeader {
    from: String,
    to: String,
}

impl RenameHeader {
    pub const NAME: &'static str = "rename-header";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            from: params.require_string("from")?,
            to: params.require_string("to")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for RenameHeader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.headers().contains(&self.from)
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().rename(&self.from, &self.to);
        Ok(())
    }
}

/// Appends a value, keeping existing entries for the name.
pub struct AppendHeader {
    name: String,
    value: String,
}

impl AppendHeader {
    pub const NAME: &'static str = "append-header";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params.require_string("name")?,
            value: params.require_string("value")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for AppendHeader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut()
            .append(self.name.clone(), self.value.clone());
        Ok(())
    }
}

/// Injects a correlation id when absent (or unconditionally with
/// `overwrite`).
pub struct CorrelationId {
    header: String,
    overwrite: bool,
}

impl CorrelationId {
    pub const NAME: &'static str = "correlation-id";
    const DEFAULT_HEADER: &'static str = "X-Correlation-Id";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            header: params
                .string("header")
                .unwrap_or_else(|| Self::DEFAULT_HEADER.to_string()),
            overwrite: params.bool_or("overwrite", false),
        })
    }
}

#[async_trait]
impl BufferedTransform for CorrelationId {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if self.overwrite || !ctx.headers().contains(&self.header) {
            ctx.headers_mut().set(self.header.clone(), hex_id());
        }
        Ok(())
    }
}

/// Propagates an inbound request id, minting one when the client sent none.
pub struct RequestId {
    header: String,
}

impl RequestId {
    pub const NAME: &'static str = "request-id";
    const DEFAULT_HEADER: &'static str = "X-Request-Id";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            header: params
                .string("header")
                .unwrap_or_else(|| Self::DEFAULT_HEADER.to_string()),
        })
    }
}

#[async_trait]
impl BufferedTransform for RequestId {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().set_if_absent(self.header.clone(), hex_id());
        Ok(())
    }
}

/// Drops the Authorization header before the exchange leaves the gateway.
#[derive(Default)]
pub struct StripAuthorization;

impl StripAuthorization {
    pub const NAME: &'static str = "strip-authorization";

    pub fn from_params(_params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self)
    }
}

#[async_trait]
impl BufferedTransform for StripAuthorization {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.headers().contains("Authorization")
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut().remove("Authorization");
        Ok(())
    }
}

/// Removes implementation-revealing response headers.
pub struct RemoveInternalHeaders {
    names: Vec<String>,
}

impl RemoveInternalHeaders {
    pub const NAME: &'static str = "remove-internal-headers";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        let mut names = params.list("headers");
        if names.is_empty() {
            names = DEFAULT_INTERNAL_HEADERS
                .iter()
                .map(|name| name.to_string())
                .collect();
        }
        Ok(Self { names })
    }
}

#[async_trait]
impl BufferedTransform for RemoveInternalHeaders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        for name in &self.names {
            ctx.headers_mut().remove(name);
        }
        Ok(())
    }
}

/// Tags outgoing responses with the gateway's identity headers.
pub struct GatewayResponseTag {
    version: String,
    processed_by: String,
}

impl GatewayResponseTag {
    pub const NAME: &'static str = "gateway-response-tag";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            version: params
                .string("version")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            processed_by: params
                .string("processedBy")
                .unwrap_or_else(|| "reqrep-gateway".to_string()),
        })
    }
}

#[async_trait]
impl BufferedTransform for GatewayResponseTag {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.side() == Side::Response
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.headers_mut()
            .set("X-Gateway-Version", self.version.clone());
        ctx.headers_mut()
            .set("X-Processed-By", self.processed_by.clone());
        Ok(())
    }
}
