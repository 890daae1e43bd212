//! Contracts and helpers for the embedding host.
//!
//! The host owns the wire: it builds one [`MessageContext`] per exchange
//! side, captures the downstream response body into a buffered sink before
//! forwarding, and writes the bytes from `Payload::flush` back out. The
//! helpers here cover the two subtle pieces: restoring a swapped response
//! sink on every exit path, and translating a `StopPipeline` abort into the
//! gateway error response.

use crate::message::context::Side;
use crate::message::headers::MessageHeaders;
use crate::pipeline::PipelineError;

/// Status the host answers with when the pipeline stops the exchange.
pub const GATEWAY_ERROR_STATUS: u16 = 502;

/// Plain-text body for the gateway error response.
pub fn gateway_error_body(side: Side, transform: &str) -> String {
    format!("Gateway error: {side} transformation failed in '{transform}'.")
}

/// Renders the gateway error for a pipeline abort; `None` for client
/// aborts, which the host handles as a disconnect instead.
pub fn gateway_error_for(error: &PipelineError) -> Option<(u16, String)> {
    match error {
        PipelineError::TransformationFailed { transform, side } => {
            Some((GATEWAY_ERROR_STATUS, gateway_error_body(*side, transform)))
        }
        PipelineError::ClientAbort => None,
    }
}

/// Scoped guard around the host's response-body sink swap. The original
/// sink goes back into the slot on drop, on every control-flow exit
/// including panics inside the forwarder.
pub struct SinkSwapGuard<'a, S> {
    slot: &'a mut S,
    original: Option<S>,
}

impl<'a, S> SinkSwapGuard<'a, S> {
    /// Puts `replacement` into the slot and remembers the original.
    pub fn swap(slot: &'a mut S, replacement: S) -> Self {
        let original = std::mem::replace(slot, replacement);
        Self {
            slot,
            original: Some(original),
        }
    }

    /// Peek at the sink currently in the slot (the replacement).
    pub fn current(&self) -> &S {
        self.slot
    }

    pub fn current_mut(&mut self) -> &mut S {
        self.slot
    }

    /// Restores the original sink and hands back the replacement with
    /// whatever it captured.
    pub fn restore(mut self) -> S {
        let original = self
            .original
            .take()
            .expect("guard restores at most once");
        std::mem::replace(self.slot, original)
    }
}

impl<S> Drop for SinkSwapGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            *self.slot = original;
        }
    }
}

/// Rewrites `Content-Length` after flush when the body length changed;
/// leaves chunked/absent lengths alone.
pub fn adjust_content_length(headers: &mut MessageHeaders, new_len: usize) {
    if let Some(declared) = headers.get("Content-Length") {
        if declared.trim().parse::<usize>() != Ok(new_len) {
            headers.set("Content-Length", new_len.to_string());
        }
    }
}
