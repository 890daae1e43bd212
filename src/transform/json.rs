//! JSON body transforms. All of them mutate the payload's shared tree in
//! place; none are safe under the plan-level parallel flag.

use crate::message::context::BufferedContext;
use crate::transform::headers::hex_id;
use crate::transform::params::TransformParams;
use crate::transform::{BufferedTransform, TransformError};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tokio_util::sync::CancellationToken;

/// Adds (or replaces) a top-level field.
pub struct JsonAddField {
    field: String,
    value: JsonValue,
}

impl JsonAddField {
    pub const NAME: &'static str = "json-add-field";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            field: params.require_string("field")?,
            value: params.value("value").cloned().unwrap_or(JsonValue::Null),
        })
    }
}

#[async_trait]
impl BufferedTransform for JsonAddField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.is_json()
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if let Some(JsonValue::Object(map)) = ctx.json_mut().await? {
            map.insert(self.field.clone(), self.value.clone());
        }
        Ok(())
    }
}

pub struct JsonRemoveField {
    field: String,
}

impl JsonRemoveField {
    pub const NAME: &'static str = "json-remove-field";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            field: params.require_string("field")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for JsonRemoveField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.is_json()
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if let Some(JsonValue::Object(map)) = ctx.json_mut().await? {
            map.remove(&self.field);
        }
        Ok(())
    }
}

pub struct JsonRenameField {
    from: String,
    to: String,
}

impl JsonRenameField {
    pub const NAME: &'static str = "json-rename-field";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            from: params.require_string("from")?,
            to: params.require_string("to")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for JsonRenameField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.is_json()
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if let Some(JsonValue::Object(map)) = ctx.json_mut().await? {
            if let Some(value) = map.remove(&self.from) {
                map.insert(self.to.clone(), value);
            }
        }
        Ok(())
    }
}

/// Sets a value at a dot-delimited path, creating intermediate objects on
/// the way down. Non-object intermediates are overwritten.
pub struct JsonSetPath {
    segments: Vec<String>,
    value: JsonValue,
}

impl JsonSetPath {
    pub const NAME: &'static str = "json-set-path";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        let raw = params.require_string("path")?;
        let segments: Vec<String> = raw
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(TransformError::invalid("path", "no usable segments"));
        }
        Ok(Self {
            segments,
            value: params.value("value").cloned().unwrap_or(JsonValue::Null),
        })
    }
}

#[async_trait]
impl BufferedTransform for JsonSetPath {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.is_json()
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let Some(tree) = ctx.json_mut().await? else {
            return Ok(());
        };
        set_nested(tree, &self.segments, self.value.clone());
        Ok(())
    }
}

fn set_nested(target: &mut JsonValue, segments: &[String], value: JsonValue) {
    let mut cursor = target;
    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx == segments.len() - 1;
        let map = ensure_object(cursor);
        if is_last {
            map.insert(segment.clone(), value);
            return;
        }
        cursor = map
            .entry(segment.clone())
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    }
}

fn ensure_object(value: &mut JsonValue) -> &mut JsonMap<String, JsonValue> {
    if !value.is_object() {
        *value = JsonValue::Object(JsonMap::new());
    }
    match value {
        JsonValue::Object(map) => map,
        _ => unreachable!("value ensured to be object"),
    }
}

/// Stamps a top-level `_gateway` object with version, processing time and a
/// fresh request id.
pub struct GatewayMetadata {
    version: String,
}

impl GatewayMetadata {
    pub const NAME: &'static str = "gateway-metadata";
    const FIELD: &'static str = "_gateway";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            version: params
                .string("version")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        })
    }

    fn metadata(&self) -> JsonValue {
        json!({
            "version": self.version,
            "processedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "requestId": hex_id(),
        })
    }
}

#[async_trait]
impl BufferedTransform for GatewayMetadata {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.is_json()
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let metadata = self.metadata();
        let needs_seed = match ctx.json_mut().await? {
            Some(JsonValue::Object(map)) => {
                map.insert(Self::FIELD.to_string(), metadata.clone());
                false
            }
            Some(_) => false,
            None => true,
        };
        if needs_seed {
            // Empty body: the metadata object becomes the body.
            ctx.set_json(json!({ "_gateway": metadata }))?;
        }
        Ok(())
    }
}
