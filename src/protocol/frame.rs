//! BiDi frame classification.
//!
//! The single place JSON shape knowledge lives. A frame is any JSON object;
//! classification is by shape, tolerating arbitrary extra fields:
//!
//! | Shape | Rule |
//! |-------|------|
//! | Response | `id` present |
//! | Event | `id` absent and `method` non-empty |
//! | Other | anything else |
//!
//! The framer is pure: no I/O, no channels, no locks.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Frame
// ============================================================================

/// A parsed inbound frame.
///
/// Wraps the raw JSON object so callers can classify it without losing
/// fields the proxy does not understand.
#[derive(Debug, Clone)]
pub struct Frame {
    value: Value,
}

/// Classification of a frame by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Reply to a command; carries the command id.
    Response {
        /// The command id this frame replies to.
        id: u64,
    },
    /// Asynchronous notification.
    Event {
        /// Event name in `module.eventName` format.
        method: String,
    },
    /// Anything that is neither a usable response nor an event.
    Other,
}

impl Frame {
    /// Parses a text frame into a classifiable JSON object.
    ///
    /// Returns `None` for non-JSON input or JSON that is not an object;
    /// such frames are forwarded verbatim by the caller.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        value.is_object().then_some(Self { value })
    }

    /// Wraps an already-parsed JSON object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        value.is_object().then_some(Self { value })
    }

    /// Classifies the frame by shape.
    ///
    /// A frame carrying an `id` field is a response; if the id is not a
    /// non-negative integer there is nothing to correlate against and the
    /// frame degrades to [`FrameKind::Other`].
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        if self.value.get("id").is_some() {
            return match self.command_id() {
                Some(id) => FrameKind::Response { id },
                None => FrameKind::Other,
            };
        }

        match self.method() {
            Some(method) if !method.is_empty() => FrameKind::Event {
                method: method.to_string(),
            },
            _ => FrameKind::Other,
        }
    }

    /// Returns the command id, if present and integral.
    #[inline]
    #[must_use]
    pub fn command_id(&self) -> Option<u64> {
        self.value.get("id").and_then(Value::as_u64)
    }

    /// Returns the `method` field, if present.
    #[inline]
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.value.get("method").and_then(Value::as_str)
    }

    /// Returns `true` if the frame carries an `error` field.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.value.get("error").is_some()
    }

    /// Returns the normalized error descriptor, if the frame carries one.
    #[must_use]
    pub fn error(&self) -> Option<ErrorDescriptor> {
        self.value.get("error").map(ErrorDescriptor::normalize)
    }

    /// Borrows the underlying JSON object.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Unwraps into the underlying JSON object.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

// ============================================================================
// ErrorDescriptor
// ============================================================================

/// Normalized form of a BiDi `error` field.
///
/// The wire tolerates both `{error, message}` objects and bare strings;
/// a bare string is both the kind and the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    /// Short error code.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorDescriptor {
    /// Normalizes a raw `error` field value.
    #[must_use]
    pub fn normalize(raw: &Value) -> Self {
        match raw {
            Value::String(s) => Self {
                kind: s.clone(),
                message: s.clone(),
            },
            Value::Object(map) => {
                let kind = map
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(kind.as_str())
                    .to_string();
                Self { kind, message }
            }
            other => Self {
                kind: "unknown error".to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Result Extraction
// ============================================================================

/// Extracts the `result` payload of a reply frame.
///
/// # Errors
///
/// Returns [`Error::Browser`] when the frame carries an `error` field.
pub fn into_result(frame: Value) -> Result<Value> {
    if let Some(raw) = frame.get("error") {
        let descriptor = ErrorDescriptor::normalize(raw);
        return Err(Error::browser(descriptor.kind, descriptor.message));
    }

    Ok(frame.get("result").cloned().unwrap_or(Value::Null))
}

// ============================================================================
// Tests
// ============================================================================
