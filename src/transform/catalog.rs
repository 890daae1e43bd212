//! Keyed registry of transform factories. Each plan build resolves route
//! rows through this catalog into fresh configured instances.

use crate::transform::address::{
    AddQueryParam, HostRewrite, MethodOverride, PathPrefixRewrite, PathRegexRewrite,
    RemoveQueryParam,
};
use crate::transform::headers::{
    AddHeader, AppendHeader, CorrelationId, GatewayResponseTag, RemoveHeader,
    RemoveInternalHeaders, RenameHeader, RequestId, StripAuthorization,
};
use crate::transform::json::{
    GatewayMetadata, JsonAddField, JsonRemoveField, JsonRenameField, JsonSetPath,
};
use crate::transform::jwt::{JwtClaimsExtract, JwtForward};
use crate::transform::params::TransformParams;
use crate::transform::streaming::{StreamingContentTag, StreamingPassthrough};
use crate::transform::{Transform, TransformError};
use std::collections::HashMap;

type Factory = fn(&TransformParams) -> Result<Transform, TransformError>;

/// Transient keyed lookup: `create` builds a fresh instance per call, so
/// plans never share configured state.
pub struct TransformCatalog {
    factories: HashMap<&'static str, Factory>,
}

impl TransformCatalog {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Catalog with every built-in transform registered.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();

        catalog.register(AddHeader::NAME, |params| {
            Ok(Transform::buffered(AddHeader::from_params(params)?))
        });
        catalog.register(RemoveHeader::NAME, |params| {
            Ok(Transform::buffered(RemoveHeader::from_params(params)?))
        });
        catalog.register(RenameHeader::NAME, |params| {
            Ok(Transform::buffered(RenameHeader::from_params(params)?))
        });
        catalog.register(AppendHeader::NAME, |params| {
            Ok(Transform::buffered(AppendHeader::from_params(params)?))
        });
        catalog.register(CorrelationId::NAME, |params| {
            Ok(Transform::buffered(CorrelationId::from_params(params)?))
        });
        catalog.register(RequestId::NAME, |params| {
            Ok(Transform::buffered(RequestId::from_params(params)?))
        });
        catalog.register(StripAuthorization::NAME, |params| {
            Ok(Transform::buffered(StripAuthorization::from_params(params)?))
        });
        catalog.register(RemoveInternalHeaders::NAME, |params| {
            Ok(Transform::buffered(RemoveInternalHeaders::from_params(
                params,
            )?))
        });
        catalog.register(GatewayResponseTag::NAME, |params| {
            Ok(Transform::buffered(GatewayResponseTag::from_params(params)?))
        });
        catalog.register(PathPrefixRewrite::NAME, |params| {
            Ok(Transform::buffered(PathPrefixRewrite::from_params(params)?))
        });
        catalog.register(PathRegexRewrite::NAME, |params| {
            Ok(Transform::buffered(PathRegexRewrite::from_params(params)?))
        });
        catalog.register(AddQueryParam::NAME, |params| {
            Ok(Transform::buffered(AddQueryParam::from_params(params)?))
        });
        catalog.register(RemoveQueryParam::NAME, |params| {
            Ok(Transform::buffered(RemoveQueryParam::from_params(params)?))
        });
        catalog.register(HostRewrite::NAME, |params| {
            Ok(Transform::buffered(HostRewrite::from_params(params)?))
        });
        catalog.register(MethodOverride::NAME, |params| {
            Ok(Transform::buffered(MethodOverride::from_params(params)?))
        });
        catalog.register(JsonAddField::NAME, |params| {
            Ok(Transform::buffered(JsonAddField::from_params(params)?))
        });
        catalog.register(JsonRemoveField::NAME, |params| {
            Ok(Transform::buffered(JsonRemoveField::from_params(params)?))
        });
        catalog.register(JsonRenameField::NAME, |params| {
            Ok(Transform::buffered(JsonRenameField::from_params(params)?))
        });
        catalog.register(JsonSetPath::NAME, |params| {
            Ok(Transform::buffered(JsonSetPath::from_params(params)?))
        });
        catalog.register(GatewayMetadata::NAME, |params| {
            Ok(Transform::buffered(GatewayMetadata::from_params(params)?))
        });
        catalog.register(JwtForward::NAME, |params| {
            Ok(Transform::buffered(JwtForward::from_params(params)?))
        });
        catalog.register(JwtClaimsExtract::NAME, |params| {
            Ok(Transform::buffered(JwtClaimsExtract::from_params(params)?))
        });
        catalog.register(StreamingPassthrough::NAME, |params| {
            Ok(Transform::streaming(StreamingPassthrough::from_params(
                params,
            )?))
        });
        catalog.register(StreamingContentTag::NAME, |params| {
            Ok(Transform::streaming(StreamingContentTag::from_params(
                params,
            )?))
        });

        catalog
    }

    pub fn register(&mut self, key: &'static str, factory: Factory) {
        self.factories.insert(key, factory);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Builds a fresh configured instance for the key.
    pub fn create(&self, key: &str, params: &TransformParams) -> Result<Transform, TransformError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| TransformError::UnknownTransformer {
                key: key.to_string(),
            })?;
        factory(params)
    }
}

impl Default for TransformCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
