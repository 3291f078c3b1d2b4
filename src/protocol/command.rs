//! Southbound BiDi command payloads.
//!
//! Typed builders for the handful of standard WebDriver BiDi commands the
//! router issues on its own behalf. Everything else crosses the proxy as
//! opaque text and never takes a typed form.
//!
//! | Command | Used for |
//! |---------|----------|
//! | `session.subscribe` / `session.unsubscribe` | Navigation event delivery |
//! | `browsingContext.getTree` | Default-context resolution |
//! | `script.callFunction` | Element polling |
//! | `input.performActions` | Pointer clicks and typing |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Navigation milestones every session subscribes to at creation.
pub const NAVIGATION_EVENTS: [&str; 3] = [
    "browsingContext.navigationStarted",
    "browsingContext.domContentLoaded",
    "browsingContext.load",
];

// ============================================================================
// BrowserCommand
// ============================================================================

/// A router-originated BiDi command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowserCommand {
    /// Subscribe to a set of events.
    #[serde(rename = "session.subscribe")]
    SessionSubscribe {
        /// Event names to subscribe to.
        events: Vec<String>,
    },

    /// Remove a previous subscription.
    #[serde(rename = "session.unsubscribe")]
    SessionUnsubscribe {
        /// Subscription ids returned by `session.subscribe`.
        subscriptions: Vec<String>,
    },

    /// Fetch the browsing-context tree.
    #[serde(rename = "browsingContext.getTree")]
    GetTree {},

    /// Call a function in a page realm.
    #[serde(rename = "script.callFunction")]
    CallFunction(CallFunctionParams),

    /// Perform pointer/keyboard input actions.
    #[serde(rename = "input.performActions")]
    PerformActions(PerformActionsParams),
}

impl BrowserCommand {
    /// Returns the BiDi method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::SessionSubscribe { .. } => "session.subscribe",
            Self::SessionUnsubscribe { .. } => "session.unsubscribe",
            Self::GetTree {} => "browsingContext.getTree",
            Self::CallFunction(_) => "script.callFunction",
            Self::PerformActions(_) => "input.performActions",
        }
    }

    /// Creates a `session.subscribe` for the navigation milestones.
    #[must_use]
    pub fn subscribe_navigation() -> Self {
        Self::SessionSubscribe {
            events: NAVIGATION_EVENTS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Serializes into a full command frame with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn into_frame(self, id: u64) -> Result<Value> {
        let mut frame = serde_json::to_value(self)?;
        frame["id"] = json!(id);
        Ok(frame)
    }
}

// ============================================================================
// script.callFunction
// ============================================================================

/// Parameters for `script.callFunction`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    /// Source of the function to call.
    pub function_declaration: String,
    /// Realm target.
    pub target: ScriptTarget,
    /// Positional arguments.
    pub arguments: Vec<ScriptArgument>,
    /// Whether to await a returned promise.
    pub await_promise: bool,
    /// Result ownership model.
    pub result_ownership: String,
}

/// Realm target addressing a browsing context.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptTarget {
    /// Browsing context id.
    pub context: String,
}

/// A primitive script argument.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptArgument {
    /// BiDi value type tag.
    #[serde(rename = "type")]
    pub value_type: String,
    /// The value itself.
    pub value: String,
}

impl ScriptArgument {
    /// Creates a string argument.
    #[inline]
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value_type: "string".to_string(),
            value: value.into(),
        }
    }
}

// ============================================================================
// input.performActions
// ============================================================================

/// Parameters for `input.performActions`.
#[derive(Debug, Clone, Serialize)]
pub struct PerformActionsParams {
    /// Browsing context to act in.
    pub context: String,
    /// Input sources with their action sequences.
    pub actions: Vec<SourceActions>,
}

/// One input source and its actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SourceActions {
    /// A pointer source.
    #[serde(rename = "pointer")]
    Pointer {
        /// Source id, stable across commands.
        id: String,
        /// Pointer kind.
        parameters: PointerParameters,
        /// Action sequence.
        actions: Vec<PointerAction>,
    },

    /// A key source.
    #[serde(rename = "key")]
    Key {
        /// Source id, stable across commands.
        id: String,
        /// Action sequence.
        actions: Vec<KeyAction>,
    },
}

/// Pointer source parameters.
#[derive(Debug, Clone, Serialize)]
pub struct PointerParameters {
    /// Pointer kind (`mouse`, `pen`, `touch`).
    #[serde(rename = "pointerType")]
    pub pointer_type: String,
}

/// One pointer action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PointerAction {
    /// Move to viewport coordinates.
    #[serde(rename = "pointerMove")]
    Move {
        /// Target x, viewport pixels.
        x: i64,
        /// Target y, viewport pixels.
        y: i64,
        /// Move duration in milliseconds.
        duration: u64,
    },

    /// Press a button.
    #[serde(rename = "pointerDown")]
    Down {
        /// Button index (0 = primary).
        button: u64,
    },

    /// Release a button.
    #[serde(rename = "pointerUp")]
    Up {
        /// Button index (0 = primary).
        button: u64,
    },
}

/// One key action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum KeyAction {
    /// Press a key.
    #[serde(rename = "keyDown")]
    Down {
        /// Key value (a single Unicode scalar).
        value: String,
    },

    /// Release a key.
    #[serde(rename = "keyUp")]
    Up {
        /// Key value (a single Unicode scalar).
        value: String,
    },
}

// ============================================================================
// Action Builders
// ============================================================================

/// Builds the canonical click sequence: move, press, release at `(x, y)`.
#[must_use]
pub fn pointer_click(x: i64, y: i64) -> SourceActions {
    SourceActions::Pointer {
        id: "mouse".to_string(),
        parameters: PointerParameters {
            pointer_type: "mouse".to_string(),
        },
        actions: vec![
            PointerAction::Move { x, y, duration: 0 },
            PointerAction::Down { button: 0 },
            PointerAction::Up { button: 0 },
        ],
    }
}

/// Builds a key source typing `text` one Unicode scalar at a time.
#[must_use]
pub fn key_type(text: &str) -> SourceActions {
    let mut actions = Vec::with_capacity(text.chars().count() * 2);
    for ch in text.chars() {
        let value = ch.to_string();
        actions.push(KeyAction::Down {
            value: value.clone(),
        });
        actions.push(KeyAction::Up { value });
    }

    SourceActions::Key {
        id: "keyboard".to_string(),
        actions,
    }
}

// ============================================================================
// Tests
// ============================================================================
