// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.
// Copyright 2025 Veecle GmbH.
//
// This file has been modified from the original TiKV implementation.

//! Trace context identifiers.
//!
//! # Core Types
//!
//! - [`TraceId`]: A 16-byte identifier shared by every span of a trace.
//! - [`SpanId`]: An 8-byte identifier of a single span.
//! - [`TraceFlags`]: The W3C trace flags byte.
//! - [`SpanContext`]: Everything needed to correlate a record with its span.
//!
//! Both ids are written to the wire as raw big-endian bytes and formatted as lowercase hex.

use std::fmt;
use std::str::FromStr;

/// A 16-byte trace identifier. The all-zero value is invalid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct TraceId(pub u128);

impl TraceId {
    /// The invalid, all-zero trace id.
    pub const INVALID: Self = Self(0);

    /// Returns `true` unless this is [`TraceId::INVALID`].
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Returns the wire representation.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Creates a trace id from its wire representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(TraceId)
    }
}

impl serde::Serialize for TraceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> serde::Deserialize<'de> for TraceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: [u8; size_of::<u128>()] = hex::serde::deserialize(deserializer)?;

        Ok(TraceId::from_bytes(bytes))
    }
}

/// An 8-byte span identifier. The all-zero value is invalid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct SpanId(pub u64);

impl SpanId {
    /// The invalid, all-zero span id.
    pub const INVALID: Self = Self(0);

    /// Returns `true` unless this is [`SpanId::INVALID`].
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Returns the wire representation.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Creates a span id from its wire representation.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(SpanId)
    }
}

impl serde::Serialize for SpanId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> serde::Deserialize<'de> for SpanId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: [u8; size_of::<u64>()] = hex::serde::deserialize(deserializer)?;

        Ok(SpanId::from_bytes(bytes))
    }
}

/// The W3C trace flags byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct TraceFlags(pub u8);

impl TraceFlags {
    /// The trace was sampled.
    pub const SAMPLED: Self = Self(0x01);

    /// Returns `true` if the sampled bit is set.
    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

/// The context a span, event or log record is correlated with.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SpanContext {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// The unique id of this span.
    pub span_id: SpanId,
    /// The W3C trace flags.
    pub trace_flags: TraceFlags,
    /// The W3C `tracestate` header value.
    pub trace_state: Option<String>,
    /// Whether the context was propagated from a remote process.
    pub is_remote: bool,
}

impl SpanContext {
    /// Creates a new local `SpanContext` with the given [`TraceId`] and [`SpanId`].
    ///
    /// # Examples
    ///
    /// ```
    /// use veecle_telemetry_otlp::id::{SpanContext, SpanId, TraceFlags, TraceId};
    ///
    /// let span_context = SpanContext::new(TraceId(12), SpanId(13), TraceFlags::SAMPLED);
    /// assert_eq!(span_context.to_string(), "0000000000000000000000000000000c:000000000000000d");
    /// ```
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            trace_flags,
            trace_state: None,
            is_remote: false,
        }
    }

    /// Marks the context as propagated from a remote process.
    pub fn with_remote(mut self, is_remote: bool) -> Self {
        self.is_remote = is_remote;
        self
    }

    /// Sets the W3C `tracestate` value.
    pub fn with_trace_state(mut self, trace_state: impl Into<String>) -> Self {
        self.trace_state = Some(trace_state.into());
        self
    }

    /// Returns `true` if both ids are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            trace_id, span_id, ..
        } = self;
        write!(f, "{trace_id}:{span_id}")
    }
}

/// Errors that can occur while parsing [`SpanContext`] from a string.
#[derive(Clone, Debug)]
pub enum ParseSpanContextError {
    /// The string is missing a `:` separator.
    MissingSeparator,

    /// The embedded [`TraceId`] failed to parse.
    InvalidTraceId(std::num::ParseIntError),

    /// The embedded [`SpanId`] failed to parse.
    InvalidSpanId(std::num::ParseIntError),
}

impl fmt::Display for ParseSpanContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator => f.write_str("missing ':' separator"),
            Self::InvalidTraceId(_) => f.write_str("failed to parse trace id"),
            Self::InvalidSpanId(_) => f.write_str("failed to parse span id"),
        }
    }
}

impl std::error::Error for ParseSpanContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingSeparator => None,
            Self::InvalidTraceId(error) => Some(error),
            Self::InvalidSpanId(error) => Some(error),
        }
    }
}

impl FromStr for SpanContext {
    type Err = ParseSpanContextError;

    /// Parses the `trace_id:span_id` form produced by [`Display`](fmt::Display); the flags are
    /// left empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((trace_id, span_id)) = s.split_once(":") else {
            return Err(ParseSpanContextError::MissingSeparator);
        };
        let trace_id =
            TraceId::from_str(trace_id).map_err(ParseSpanContextError::InvalidTraceId)?;
        let span_id = SpanId::from_str(span_id).map_err(ParseSpanContextError::InvalidSpanId)?;
        Ok(Self::new(trace_id, span_id, TraceFlags::default()))
    }
}
