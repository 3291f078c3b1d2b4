//! Northbound extension command surface.
//!
//! Extension commands are recognized by the `vibium:` method prefix and
//! composed out of standard BiDi primitives by the engine. Everything in
//! this module is shape only: method recognition, parameter structs, and
//! the response envelope.
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `vibium:find` | `{selector, context?, timeout?}` | `{tag, text, box}` |
//! | `vibium:click` | `{selector, context?, timeout?, waitBehavior?}` | `{clicked: true}` |
//! | `vibium:type` | `{selector, text, context?, timeout?, waitBehavior?}` | `{typed: true}` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;

// ============================================================================
// Constants
// ============================================================================

/// Method prefix marking extension commands.
pub const EXTENSION_PREFIX: &str = "vibium:";

/// Default extension command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// ExtensionMethod
// ============================================================================

/// A recognized extension method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionMethod {
    /// Wait for an element and describe it.
    Find,
    /// Wait for an element, click its center, wait for navigation.
    Click,
    /// Wait for an element, focus-click it, type text.
    Type,
}

impl ExtensionMethod {
    /// Recognizes an extension method by full method name.
    ///
    /// Returns `None` for anything that should be forwarded verbatim.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "vibium:find" => Some(Self::Find),
            "vibium:click" => Some(Self::Click),
            "vibium:type" => Some(Self::Type),
            _ => None,
        }
    }

    /// Returns the wire method name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Find => "vibium:find",
            Self::Click => "vibium:click",
            Self::Type => "vibium:type",
        }
    }
}

// ============================================================================
// WaitBehavior
// ============================================================================

/// Which navigation milestones a command blocks on after its action.
///
/// Defaults are asymmetric: `vibium:click` defaults to
/// [`WaitBehavior::WaitForLoad`] because clicks routinely navigate, while
/// `vibium:type` defaults to [`WaitBehavior::None`] because typing rarely
/// does. Callers relying on a `type` that navigates must opt in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitBehavior {
    /// Do not register or wait.
    #[serde(rename = "none")]
    None,

    /// Wait for `browsingContext.navigationStarted`.
    #[serde(rename = "waitForNavigationStarted")]
    WaitForNavigationStarted,

    /// Wait for navigation start, then `browsingContext.domContentLoaded`.
    #[serde(rename = "waitForDomContentLoaded")]
    WaitForDomContentLoaded,

    /// Wait for navigation start, then `browsingContext.load`.
    #[default]
    #[serde(rename = "waitForLoad")]
    WaitForLoad,
}

// ============================================================================
// Command Parameters
// ============================================================================

/// Parameters of `vibium:find`.
#[derive(Debug, Clone, Deserialize)]
pub struct FindParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Browsing context id; resolved via `getTree` when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Total deadline in milliseconds (default 30000).
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Parameters of `vibium:click`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Browsing context id; resolved via `getTree` when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Total deadline in milliseconds (default 30000).
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Navigation wait policy (default `waitForLoad`).
    #[serde(rename = "waitBehavior", default)]
    pub wait_behavior: Option<WaitBehavior>,
}

/// Parameters of `vibium:type`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Text to type, one key action pair per Unicode scalar.
    pub text: String,
    /// Browsing context id; resolved via `getTree` when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Total deadline in milliseconds (default 30000).
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Navigation wait policy (default `none`).
    #[serde(rename = "waitBehavior", default)]
    pub wait_behavior: Option<WaitBehavior>,
}

// ============================================================================
// Element Description
// ============================================================================

/// Element description returned by the polling script and by `vibium:find`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Lowercased tag name.
    pub tag: String,
    /// Trimmed text content, truncated to 100 characters.
    pub text: String,
    /// Bounding client rect.
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
}

/// Bounding client rect in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl BoundingBox {
    /// Returns the center point, rounded down to integer pixels.
    #[must_use]
    pub fn center(&self) -> (i64, i64) {
        let x = (self.x + self.width / 2.0).floor() as i64;
        let y = (self.y + self.height / 2.0).floor() as i64;
        (x, y)
    }
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Builds a success envelope for an extension command.
#[must_use]
pub fn success_frame(id: u64, result: Value) -> Value {
    json!({
        "id": id,
        "type": "success",
        "result": result,
    })
}

/// Builds an error envelope for an extension command.
///
/// Browser errors surface their original message without the crate's
/// display prefix; everything else uses the error's display form.
#[must_use]
pub fn error_frame(id: u64, error: &Error) -> Value {
    let message = match error {
        Error::Browser { message, .. } => message.clone(),
        other => other.to_string(),
    };

    json!({
        "id": id,
        "type": "error",
        "error": {
            "error": error.code(),
            "message": message,
        },
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_recognition() {
        assert_eq!(ExtensionMethod::parse("vibium:find"), Some(ExtensionMethod::Find));
        assert_eq!(ExtensionMethod::parse("vibium:click"), Some(ExtensionMethod::Click));
        assert_eq!(ExtensionMethod::parse("vibium:type"), Some(ExtensionMethod::Type));
        assert_eq!(ExtensionMethod::parse("vibium:hover"), None);
        assert_eq!(ExtensionMethod::parse("browsingContext.getTree"), None);
    }

    #[test]
    fn test_find_params_minimal() {
        let params: FindParams =
            serde_json::from_value(json!({"selector": "#nope"})).expect("parse");
        assert_eq!(params.selector, "#nope");
        assert!(params.context.is_none());
        assert!(params.timeout.is_none());
    }

    #[test]
    fn test_click_params_full() {
        let params: ClickParams = serde_json::from_value(json!({
            "selector": "button[type=submit]",
            "context": "ctx-1",
            "timeout": 5000,
            "waitBehavior": "waitForDomContentLoaded",
        }))
        .expect("parse");

        assert_eq!(params.context.as_deref(), Some("ctx-1"));
        assert_eq!(params.timeout, Some(5000));
        assert_eq!(
            params.wait_behavior,
            Some(WaitBehavior::WaitForDomContentLoaded)
        );
    }

    #[test]
    fn test_wait_behavior_default() {
        assert_eq!(WaitBehavior::default(), WaitBehavior::WaitForLoad);

        let none: WaitBehavior = serde_json::from_value(json!("none")).expect("parse");
        assert_eq!(none, WaitBehavior::None);
    }

    #[test]
    fn test_element_info_from_page_json() {
        let info: ElementInfo = serde_json::from_str(
            r#"{"tag":"button","text":"Submit","box":{"x":10.5,"y":20.0,"width":80.0,"height":30.0}}"#,
        )
        .expect("parse");

        assert_eq!(info.tag, "button");
        assert_eq!(info.bounds.center(), (50, 35));

        let out = serde_json::to_value(&info).expect("serialize");
        assert_eq!(out["box"]["width"], 80.0);
    }

    #[test]
    fn test_center_rounds_down() {
        let bounds = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
        };
        assert_eq!(bounds.center(), (2, 2));
    }

    #[test]
    fn test_success_frame_shape() {
        let frame = success_frame(7, json!({"clicked": true}));
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["type"], "success");
        assert_eq!(frame["result"]["clicked"], true);
    }

    #[test]
    fn test_error_frame_shape() {
        let err = Error::element_not_found("#nope", 300);
        let frame = error_frame(1, &err);

        assert_eq!(frame["id"], 1);
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["error"]["error"], "timeout");
        assert_eq!(
            frame["error"]["message"],
            "timeout after 300ms waiting for '#nope': element not found"
        );
    }

    #[test]
    fn test_error_frame_browser_passthrough() {
        let err = Error::browser("invalid selector", "'#(' is not a valid selector");
        let frame = error_frame(2, &err);

        assert_eq!(frame["error"]["error"], "invalid selector");
        assert_eq!(frame["error"]["message"], "'#(' is not a valid selector");
    }
}
