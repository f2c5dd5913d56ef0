// W3C Trace Context propagation
//
// Lets a CI job hang the test trace under its own span.
// Reference: https://www.w3.org/TR/trace-context/
//
// Format: version-trace_id-parent_id-trace_flags
// Example: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01

use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::Context;
use std::fmt;
use thiserror::Error;

/// Parsed `traceparent` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub version: u8,
    pub trace_id: [u8; 16],
    pub parent_id: [u8; 8],
    pub trace_flags: u8,
}

/// Trace Context parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceContextError {
    #[error("Invalid traceparent format (expected: version-trace_id-parent_id-flags)")]
    InvalidFormat,
    #[error("Invalid version (must be 00)")]
    InvalidVersion,
    #[error("Invalid trace_id (must be 32 hex characters)")]
    InvalidTraceId,
    #[error("Invalid parent_id (must be 16 hex characters)")]
    InvalidParentId,
    #[error("Invalid trace_flags (must be 2 hex characters)")]
    InvalidTraceFlags,
    #[error("Trace ID cannot be all zeros")]
    AllZeroTraceId,
    #[error("Parent ID cannot be all zeros")]
    AllZeroParentId,
}

fn decode_hex<const N: usize>(field: &str, err: TraceContextError) -> Result<[u8; N], TraceContextError> {
    let mut bytes = [0u8; N];
    if field.len() != N * 2 {
        return Err(err);
    }
    hex::decode_to_slice(field, &mut bytes).map_err(|_| err)?;
    Ok(bytes)
}

impl TraceContext {
    /// Parse a W3C traceparent string
    pub fn parse(traceparent: &str) -> Result<Self, TraceContextError> {
        let parts: Vec<&str> = traceparent.trim().split('-').collect();
        let [version, trace_id, parent_id, flags] = parts.as_slice() else {
            return Err(TraceContextError::InvalidFormat);
        };

        let [version] = decode_hex::<1>(version, TraceContextError::InvalidVersion)?;
        if version != 0 {
            return Err(TraceContextError::InvalidVersion);
        }

        let trace_id = decode_hex::<16>(trace_id, TraceContextError::InvalidTraceId)?;
        if trace_id.iter().all(|&b| b == 0) {
            return Err(TraceContextError::AllZeroTraceId);
        }

        let parent_id = decode_hex::<8>(parent_id, TraceContextError::InvalidParentId)?;
        if parent_id.iter().all(|&b| b == 0) {
            return Err(TraceContextError::AllZeroParentId);
        }

        let [trace_flags] = decode_hex::<1>(flags, TraceContextError::InvalidTraceFlags)?;

        Ok(TraceContext {
            version,
            trace_id,
            parent_id,
            trace_flags,
        })
    }

    /// Check if trace is sampled (trace_flags & 0x01)
    pub fn is_sampled(&self) -> bool {
        self.trace_flags & 0x01 != 0
    }

    pub fn otel_trace_id(&self) -> TraceId {
        TraceId::from_bytes(self.trace_id)
    }

    pub fn otel_parent_id(&self) -> SpanId {
        SpanId::from_bytes(self.parent_id)
    }

    /// Context whose remote span becomes the parent of the test trace
    pub fn to_context(&self) -> Context {
        let span_context = SpanContext::new(
            self.otel_trace_id(),
            self.otel_parent_id(),
            TraceFlags::new(self.trace_flags),
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            hex::encode(self.trace_id),
            hex::encode(self.parent_id),
            self.trace_flags
        )
    }
}
