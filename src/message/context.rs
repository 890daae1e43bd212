//! Typed view of one HTTP message during pipeline execution.

use crate::message::address::Address;
use crate::message::headers::MessageHeaders;
use crate::message::payload::{BodyReader, Payload, PayloadError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Which leg of the exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Request,
    Response,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Request => "request",
            Side::Response => "response",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of one HTTP exchange: method, address, headers, payload and the
/// exchange's abort signal. Built by the host, mutated only by transforms
/// while the pipeline runs, discarded at pipeline exit.
#[derive(Debug)]
pub struct MessageContext {
    side: Side,
    method: String,
    address: Address,
    headers: MessageHeaders,
    payload: Payload,
    cancellation: CancellationToken,
}

impl MessageContext {
    pub fn request(
        method: impl Into<String>,
        address: Address,
        headers: MessageHeaders,
        payload: Payload,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            side: Side::Request,
            method: method.into(),
            address,
            headers,
            payload,
            cancellation,
        }
    }

    pub fn response(
        method: impl Into<String>,
        address: Address,
        headers: MessageHeaders,
        payload: Payload,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            side: Side::Response,
            method: method.into(),
            address,
            headers,
            payload,
            cancellation,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request side only; on the response side the assignment is ignored.
    pub fn set_method(&mut self, method: impl Into<String>) {
        if self.side == Side::Request {
            self.method = method.into();
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Mutable on both sides; response-side mutation is advisory and the
    /// host ignores it.
    pub fn address_mut(&mut self) -> &mut Address {
        &mut self.address
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Narrowed view handed to buffered transforms.
    pub fn buffered_view(&mut self) -> BufferedContext<'_> {
        BufferedContext { inner: self }
    }

    /// Narrowed view handed to streaming transforms.
    pub fn streaming_view(&mut self) -> StreamingContext<'_> {
        StreamingContext { inner: self }
    }
}

/// Context face for buffered transforms: headers, address, method and the
/// buffered payload operations.
pub struct BufferedContext<'a> {
    inner: &'a mut MessageContext,
}

impl BufferedContext<'_> {
    pub fn side(&self) -> Side {
        self.inner.side
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.inner.set_method(method);
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn address_mut(&mut self) -> &mut Address {
        &mut self.inner.address
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.inner.headers
    }

    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.inner.headers
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.payload.content_type()
    }

    pub fn has_body(&self) -> bool {
        self.inner.payload.has_body()
    }

    pub fn is_json(&self) -> bool {
        self.inner.payload.is_json()
    }

    pub async fn json(&mut self) -> Result<Option<&JsonValue>, PayloadError> {
        self.inner.payload.json().await
    }

    pub async fn json_mut(&mut self) -> Result<Option<&mut JsonValue>, PayloadError> {
        self.inner.payload.json_mut().await
    }

    pub fn set_json(&mut self, value: JsonValue) -> Result<(), PayloadError> {
        self.inner.payload.set_json(value)
    }

    pub async fn buffer(&mut self) -> Result<&[u8], PayloadError> {
        self.inner.payload.buffer().await
    }

    pub fn set_buffer(&mut self, bytes: impl Into<Bytes>) -> Result<(), PayloadError> {
        self.inner.payload.set_buffer(bytes)
    }
}

/// Context face for streaming transforms: headers and address only; body
/// access is limited to the pipe reader and stream replacement.
pub struct StreamingContext<'a> {
    inner: &'a mut MessageContext,
}

impl StreamingContext<'_> {
    pub fn side(&self) -> Side {
        self.inner.side
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn address_mut(&mut self) -> &mut Address {
        &mut self.inner.address
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.inner.headers
    }

    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.inner.headers
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.payload.content_type()
    }

    pub fn has_body(&self) -> bool {
        self.inner.payload.has_body()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.payload.is_streaming()
    }

    pub fn take_reader(&mut self) -> Result<BodyReader, PayloadError> {
        self.inner.payload.take_reader()
    }

    pub fn replace_stream(&mut self, reader: BodyReader) {
        self.inner.payload.replace_stream(reader);
    }
}
