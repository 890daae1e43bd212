//! Transform contract and catalog.
//!
//! A transform is configured once from its parameter bag when a route plan
//! is built, then shared across every exchange routed to that plan. The two
//! trait families receive different context faces, so a streaming transform
//! cannot name the JSON or buffer accessors at all.

pub mod address;
pub mod catalog;
pub mod headers;
pub mod json;
pub mod jwt;
pub mod params;
pub mod streaming;

use crate::message::address::AddressError;
use crate::message::context::{BufferedContext, StreamingContext};
use crate::message::payload::PayloadError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use catalog::TransformCatalog;
pub use params::TransformParams;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("missing required parameter `{key}`")]
    MissingParam { key: String },
    #[error("invalid parameter `{key}`: {reason}")]
    InvalidParam { key: String, reason: String },
    #[error("no transform registered for key `{key}`")]
    UnknownTransformer { key: String },
    #[error("transform timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("{0}")]
    Apply(String),
}

impl TransformError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingParam { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A transform that may read or rewrite the buffered body alongside headers,
/// address and method.
#[async_trait]
pub trait BufferedTransform: Send + Sync {
    /// Stable kebab-case name used in logs, spans and route rows.
    fn name(&self) -> &'static str;

    /// Synchronous, allocation-free guard; a false return skips the apply
    /// step entirely.
    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError>;
}

/// A transform restricted to headers and address; the body flows through as
/// an untouched stream.
#[async_trait]
pub trait StreamingTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_apply(&self, ctx: &StreamingContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    async fn apply(
        &self,
        ctx: &mut StreamingContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformFamily {
    Buffered,
    Streaming,
}

impl TransformFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformFamily::Buffered => "buffered",
            TransformFamily::Streaming => "streaming",
        }
    }
}

/// A configured transform instance, dispatched by family so each receives
/// only its legal context face.
#[derive(Clone)]
pub enum Transform {
    Buffered(Arc<dyn BufferedTransform>),
    Streaming(Arc<dyn StreamingTransform>),
}

impl Transform {
    pub fn buffered<T: BufferedTransform + 'static>(transform: T) -> Self {
        Transform::Buffered(Arc::new(transform))
    }

    pub fn streaming<T: StreamingTransform + 'static>(transform: T) -> Self {
        Transform::Streaming(Arc::new(transform))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Buffered(inner) => inner.name(),
            Transform::Streaming(inner) => inner.name(),
        }
    }

    pub fn family(&self) -> TransformFamily {
        match self {
            Transform::Buffered(_) => TransformFamily::Buffered,
            Transform::Streaming(_) => TransformFamily::Streaming,
        }
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name())
            .field("family", &self.family().as_str())
            .finish()
    }
}
