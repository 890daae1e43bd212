//! Lazy, single-parse, single-serialize body abstraction.
//!
//! A payload starts from either the host's incoming byte reader or a
//! pre-read buffer and is drained on first access. JSON bodies are parsed at
//! most once per instance and the tree is mutated in place; the wire bytes
//! are produced exactly once by [`Payload::flush`], after every transform
//! has run. Streaming payloads never pass through the buffered path.

use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

const JSON_CONTENT_TYPE_PREFIXES: [&str; 3] = [
    "application/json",
    "application/graphql",
    "application/ndjson",
];

const STREAMING_CONTENT_TYPE_PREFIXES: [&str; 5] = [
    "application/octet-stream",
    "multipart/",
    "application/grpc",
    "application/protobuf",
    "application/vnd.google.protobuf",
];

const PARSE_UNSTARTED: u8 = 0;
const PARSE_IN_PROGRESS: u8 = 1;
const PARSE_DONE: u8 = 2;

pub fn is_json_content_type(content_type: &str) -> bool {
    let lowered = content_type.trim().to_ascii_lowercase();
    JSON_CONTENT_TYPE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

pub fn is_streaming_content_type(content_type: &str) -> bool {
    let lowered = content_type.trim().to_ascii_lowercase();
    STREAMING_CONTENT_TYPE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload access violation: {reason}")]
    AccessViolation { reason: &'static str },
    #[error("payload already flushed")]
    AlreadyFlushed,
    #[error("failed to drain payload reader: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialise payload tree: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One HTTP message body with lazy buffering and a cached JSON tree.
pub struct Payload {
    content_type: Option<String>,
    reader: Option<BodyReader>,
    buffer: Option<Bytes>,
    parsed: Option<JsonValue>,
    replacement: Option<BodyReader>,
    json_dirty: bool,
    buffer_dirty: bool,
    flushed: bool,
    parse_state: AtomicU8,
}

impl Payload {
    /// Payload backed by the host's incoming byte stream.
    pub fn from_reader(content_type: Option<String>, reader: BodyReader) -> Self {
        Self {
            content_type,
            reader: Some(reader),
            buffer: None,
            parsed: None,
            replacement: None,
            json_dirty: false,
            buffer_dirty: false,
            flushed: false,
            parse_state: AtomicU8::new(PARSE_UNSTARTED),
        }
    }

    /// Payload backed by bytes the host already captured.
    pub fn from_buffer(content_type: Option<String>, buffer: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            reader: None,
            buffer: Some(buffer.into()),
            parsed: None,
            replacement: None,
            json_dirty: false,
            buffer_dirty: false,
            flushed: false,
            parse_state: AtomicU8::new(PARSE_UNSTARTED),
        }
    }

    pub fn empty() -> Self {
        Self {
            content_type: None,
            reader: None,
            buffer: None,
            parsed: None,
            replacement: None,
            json_dirty: false,
            buffer_dirty: false,
            flushed: false,
            parse_state: AtomicU8::new(PARSE_UNSTARTED),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn has_body(&self) -> bool {
        self.reader.is_some()
            || self.replacement.is_some()
            || self.parsed.is_some()
            || self.buffer.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_json_content_type)
    }

    pub fn is_streaming(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_streaming_content_type)
    }

    /// Raw body bytes, buffering through the reader on first call. Buffered
    /// face only.
    pub async fn buffer(&mut self) -> Result<&[u8], PayloadError> {
        self.ensure_buffered("buffer access on streaming payload")?;
        self.fill_buffer().await?;
        Ok(self.buffer.as_deref().unwrap_or(&[]))
    }

    /// The single cached parse result. `None` for an empty or malformed
    /// body. Buffered face only; errors on a non-JSON content type.
    pub async fn json(&mut self) -> Result<Option<&JsonValue>, PayloadError> {
        self.parse_once().await?;
        Ok(self.parsed.as_ref())
    }

    /// Mutable handle to the cached tree; mutations are in place and shared
    /// with every later transform in the chain. Handing out mutable access
    /// marks the tree dirty so flush re-serialises it.
    pub async fn json_mut(&mut self) -> Result<Option<&mut JsonValue>, PayloadError> {
        self.parse_once().await?;
        if self.parsed.is_some() {
            self.json_dirty = true;
        }
        Ok(self.parsed.as_mut())
    }

    /// Replaces the cached tree, clears cached bytes, marks the payload
    /// JSON-dirty so flush re-serialises exactly once.
    pub fn set_json(&mut self, value: JsonValue) -> Result<(), PayloadError> {
        if !self.is_json() {
            return Err(PayloadError::AccessViolation {
                reason: "json replacement on non-json payload",
            });
        }
        self.parsed = Some(value);
        self.buffer = None;
        self.json_dirty = true;
        self.buffer_dirty = false;
        // The tree is now authoritative; nothing left to parse.
        self.parse_state.store(PARSE_DONE, Ordering::Release);
        Ok(())
    }

    /// Replaces the body bytes, clears the cached tree, marks buffer-dirty.
    /// A later `json` call parses the new bytes.
    pub fn set_buffer(&mut self, bytes: impl Into<Bytes>) -> Result<(), PayloadError> {
        self.ensure_buffered("buffer replacement on streaming payload")?;
        self.buffer = Some(bytes.into());
        self.parsed = None;
        self.buffer_dirty = true;
        self.json_dirty = false;
        self.parse_state.store(PARSE_UNSTARTED, Ordering::Release);
        Ok(())
    }

    /// Hands out the underlying reader. Streaming face only; the single
    /// legal body access for streaming transforms.
    pub fn take_reader(&mut self) -> Result<BodyReader, PayloadError> {
        self.reader.take().ok_or(PayloadError::AccessViolation {
            reason: "no pipe reader available",
        })
    }

    /// Substitutes an alternative stream to be flushed at exchange exit.
    pub fn replace_stream(&mut self, reader: BodyReader) {
        self.replacement = Some(reader);
    }

    pub fn has_replacement(&self) -> bool {
        self.replacement.is_some()
    }

    /// Renders the final wire bytes. Deterministic priority: replaced
    /// stream, dirty JSON, dirty buffer, cached buffer, then a single drain
    /// of the reader. A clean unparsed body is returned byte-identical;
    /// flush is terminal.
    pub async fn flush(&mut self) -> Result<Bytes, PayloadError> {
        if self.flushed {
            return Err(PayloadError::AlreadyFlushed);
        }

        let bytes = if let Some(mut replacement) = self.replacement.take() {
            let mut collected = Vec::new();
            replacement.read_to_end(&mut collected).await?;
            Bytes::from(collected)
        } else if self.json_dirty {
            match &self.parsed {
                Some(tree) => Bytes::from(serde_json::to_vec(tree)?),
                None => Bytes::new(),
            }
        } else if let Some(buffer) = &self.buffer {
            buffer.clone()
        } else if let Some(mut reader) = self.reader.take() {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected).await?;
            Bytes::from(collected)
        } else {
            Bytes::new()
        };

        self.flushed = true;
        Ok(bytes)
    }

    fn ensure_buffered(&self, reason: &'static str) -> Result<(), PayloadError> {
        if self.is_streaming() {
            return Err(PayloadError::AccessViolation { reason });
        }
        Ok(())
    }

    async fn fill_buffer(&mut self) -> Result<(), PayloadError> {
        if self.buffer.is_some() {
            return Ok(());
        }
        if let Some(mut reader) = self.reader.take() {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected).await?;
            self.buffer = Some(Bytes::from(collected));
        }
        Ok(())
    }

    /// First-parse guard: an atomic tri-state word instead of a mutex. The
    /// winner of the Unstarted to InProgress transition parses and publishes
    /// with a release store; losers cooperatively yield until Done. Under
    /// the default sequential plan this is one uncontended compare-exchange.
    async fn parse_once(&mut self) -> Result<(), PayloadError> {
        if !self.is_json() {
            return Err(PayloadError::AccessViolation {
                reason: "json access on non-json payload",
            });
        }

        match self.parse_state.compare_exchange(
            PARSE_UNSTARTED,
            PARSE_IN_PROGRESS,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.fill_buffer().await?;
                self.parsed = match &self.buffer {
                    Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes).ok(),
                    _ => None,
                };
                self.parse_state.store(PARSE_DONE, Ordering::Release);
            }
            Err(PARSE_IN_PROGRESS) => {
                while self.parse_state.load(Ordering::Acquire) != PARSE_DONE {
                    tokio::task::yield_now().await;
                }
            }
            Err(_) => {}
        }

        Ok(())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("content_type", &self.content_type)
            .field("has_reader", &self.reader.is_some())
            .field("has_buffer", &self.buffer.is_some())
            .field("has_tree", &self.parsed.is_some())
            .field("has_replacement", &self.replacement.is_some())
            .field("json_dirty", &self.json_dirty)
            .field("buffer_dirty", &self.buffer_dirty)
            .field("flushed", &self.flushed)
            .finish()
    }
}
