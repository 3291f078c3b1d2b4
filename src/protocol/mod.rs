//! Wire protocol types.
//!
//! This module holds every piece of message-shape knowledge in the proxy:
//! BiDi frame classification, the few southbound commands the router issues
//! itself, and the northbound `vibium:` extension surface.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame classification and error normalization |
//! | `command` | Typed southbound BiDi command payloads |
//! | `extension` | `vibium:` methods, params, response envelope |

// ============================================================================
// Submodules
// ============================================================================

/// BiDi frame classification.
pub mod frame;

/// Southbound BiDi command payloads.
pub mod command;

/// Northbound extension command surface.
pub mod extension;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{BrowserCommand, CallFunctionParams, NAVIGATION_EVENTS, PerformActionsParams};
pub use extension::{
    BoundingBox, ClickParams, DEFAULT_TIMEOUT_MS, EXTENSION_PREFIX, ElementInfo, ExtensionMethod,
    FindParams, TypeParams, WaitBehavior,
};
pub use frame::{ErrorDescriptor, Frame, FrameKind};
