#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqrep::message::context::BufferedContext;
use reqrep::transform::{BufferedTransform, TransformError};
use reqrep::{Address, GlobalOptions, MessageContext, MessageHeaders, Payload, PipelineExecutor};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn executor() -> PipelineExecutor {
    PipelineExecutor::new(Arc::new(GlobalOptions::default()))
}

pub fn executor_with(options: GlobalOptions) -> PipelineExecutor {
    PipelineExecutor::new(Arc::new(options))
}

pub fn request_context(method: &str, url: &str, payload: Payload) -> MessageContext {
    MessageContext::request(
        method,
        Address::parse(url).expect("test url should parse"),
        MessageHeaders::new(),
        payload,
        CancellationToken::new(),
    )
}

pub fn response_context(url: &str, payload: Payload) -> MessageContext {
    MessageContext::response(
        "GET",
        Address::parse(url).expect("test url should parse"),
        MessageHeaders::new(),
        payload,
        CancellationToken::new(),
    )
}

pub fn json_payload(body: &str) -> Payload {
    Payload::from_buffer(
        Some("application/json".to_string()),
        body.as_bytes().to_vec(),
    )
}

pub fn is_hex_id(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Compact unsigned JWS for claim-extraction tests.
pub fn unsigned_token(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

/// Records its label on apply so tests can assert observed ordering.
pub struct RecordingTransform {
    pub label: &'static str,
    pub log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl BufferedTransform for RecordingTransform {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn apply(
        &self,
        _ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        self.log.lock().expect("order log lock").push(self.label);
        Ok(())
    }
}

/// Always fails, under a configurable name.
pub struct FailingTransform {
    pub label: &'static str,
}

#[async_trait]
impl BufferedTransform for FailingTransform {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn apply(
        &self,
        _ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        Err(TransformError::Apply("forced failure".to_string()))
    }
}

/// Sleeps past any reasonable per-transform deadline.
pub struct SlowTransform {
    pub delay: Duration,
}

#[async_trait]
impl BufferedTransform for SlowTransform {
    fn name(&self) -> &'static str {
        "slow-transform"
    }

    async fn apply(
        &self,
        _ctx: &mut BufferedContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(()),
            _ = cancel.cancelled() => Err(TransformError::Apply("cancelled".to_string())),
        }
    }
}
