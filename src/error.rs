//! Error types for the BiDi automation proxy.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vibium_proxy::{Result, Error};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let frame = session.send_internal("browsingContext.getTree", json!({})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Session setup | [`Error::LaunchFailed`], [`Error::AttachFailed`] |
//! | Extension commands | [`Error::NoContext`], [`Error::ElementNotFound`], [`Error::NavigationTimeout`] |
//! | Internal commands | [`Error::InternalTimeout`], [`Error::SessionClosed`], [`Error::Browser`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. Variants that can
/// reach an automation client are mapped to wire codes by [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Setup Errors
    // ========================================================================
    /// Browser process launch failed.
    ///
    /// Returned when the launcher cannot produce a running browser.
    #[error("browser launch failed: {message}")]
    LaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// BiDi WebSocket attach failed.
    ///
    /// Returned when the browser is running but its BiDi endpoint cannot
    /// be connected to.
    #[error("BiDi attach failed: {message}")]
    AttachFailed {
        /// Description of the attach failure.
        message: String,
    },

    // ========================================================================
    // Extension Command Errors
    // ========================================================================
    /// No top-level browsing context exists.
    ///
    /// Returned when `browsingContext.getTree` reports no contexts.
    #[error("no browsing context available")]
    NoContext,

    /// Element polling deadline expired.
    ///
    /// The message format is part of the client-visible contract.
    #[error("timeout after {timeout_ms}ms waiting for '{selector}': element not found")]
    ElementNotFound {
        /// CSS selector that never matched.
        selector: String,
        /// Total command timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Navigation wait stage deadline expired.
    ///
    /// The message names the stage that was still pending.
    #[error("timeout after {timeout_ms}ms waiting for {stage}")]
    NavigationTimeout {
        /// Event the command was waiting on (e.g. `browsingContext.load`).
        stage: String,
        /// Total command timeout in milliseconds.
        timeout_ms: u64,
    },

    // ========================================================================
    // Internal Command Errors
    // ========================================================================
    /// Internal command exceeded the 60-second hard cap.
    ///
    /// The hard cap is a deadlock guard, independent of per-command deadlines.
    #[error("internal command {method} timed out after {timeout_ms}ms")]
    InternalTimeout {
        /// BiDi method that never got a reply.
        method: String,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// Session stopped while an operation was in flight.
    #[error("session closed")]
    SessionClosed,

    /// Error response from the browser, passed through.
    #[error("browser error [{kind}]: {message}")]
    Browser {
        /// BiDi error code (or the bare error string).
        kind: String,
        /// Human-readable message.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame shape.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a launch-failed error.
    #[inline]
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }

    /// Creates an attach-failed error.
    #[inline]
    pub fn attach_failed(message: impl Into<String>) -> Self {
        Self::AttachFailed {
            message: message.into(),
        }
    }

    /// Creates an element-not-found error for an expired polling deadline.
    #[inline]
    pub fn element_not_found(selector: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
            timeout_ms,
        }
    }

    /// Creates a navigation-timeout error naming the pending stage.
    #[inline]
    pub fn navigation_timeout(stage: impl Into<String>, timeout_ms: u64) -> Self {
        Self::NavigationTimeout {
            stage: stage.into(),
            timeout_ms,
        }
    }

    /// Creates an internal-timeout error.
    #[inline]
    pub fn internal_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::InternalTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a browser error from a normalized BiDi error descriptor.
    #[inline]
    pub fn browser(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Browser {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Wire Mapping
// ============================================================================

impl Error {
    /// Returns the short error code used in extension error envelopes.
    ///
    /// Deadline-driven failures all surface as `timeout`; the message keeps
    /// them distinguishable. Browser errors pass their own code through.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::ElementNotFound { .. }
            | Self::NavigationTimeout { .. }
            | Self::InternalTimeout { .. } => "timeout",
            Self::LaunchFailed { .. } => "launch-failed",
            Self::AttachFailed { .. } => "attach-failed",
            Self::NoContext => "no-context",
            Self::SessionClosed => "session-closed",
            Self::Browser { kind, .. } => kind,
            Self::Protocol { .. } | Self::Io(_) | Self::Json(_) | Self::WebSocket(_) => "protocol",
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a deadline or hard-cap timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. }
                | Self::NavigationTimeout { .. }
                | Self::InternalTimeout { .. }
        )
    }

    /// Returns `true` if the session or its transport is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::SessionClosed | Self::WebSocket(_) | Self::Io(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_timeout_message() {
        let err = Error::element_not_found("#nope", 300);
        assert_eq!(
            err.to_string(),
            "timeout after 300ms waiting for '#nope': element not found"
        );
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn test_navigation_timeout_names_stage() {
        let err = Error::navigation_timeout("browsingContext.load", 5000);
        assert!(err.to_string().contains("browsingContext.load"));
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn test_browser_error_code_passthrough() {
        let err = Error::browser("no such frame", "frame was discarded");
        assert_eq!(err.code(), "no such frame");
        assert_eq!(
            err.to_string(),
            "browser error [no such frame]: frame was discarded"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::element_not_found("#x", 1).is_timeout());
        assert!(Error::internal_timeout("script.callFunction", 60_000).is_timeout());
        assert!(!Error::SessionClosed.is_timeout());
    }

    #[test]
    fn test_setup_codes() {
        assert_eq!(Error::launch_failed("no binary").code(), "launch-failed");
        assert_eq!(Error::attach_failed("refused").code(), "attach-failed");
        assert_eq!(Error::NoContext.code(), "no-context");
        assert_eq!(Error::protocol("bad frame").code(), "protocol");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(err.code(), "protocol");
    }
}
