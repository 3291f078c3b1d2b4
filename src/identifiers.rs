//! Type-safe identifiers for proxy entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! BiDi command ids stay plain `u64` on the wire; the split between
//! client-owned and router-owned ids is a range convention, not a type:
//! router-issued ids start at [`INTERNAL_ID_START`] and only move up.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Constants
// ============================================================================

/// First command id the router may issue on a BiDi connection.
///
/// The range at and above this watermark is reserved for the router:
/// client frames carrying such ids are rejected with a protocol error
/// before reaching the browser, so a router-issued id can never collide
/// with an id a client uses.
pub const INTERNAL_ID_START: u64 = 1_000_000;

// ============================================================================
// ClientId
// ============================================================================

/// Identifies one connected automation client.
///
/// Assigned by the front-end when a client WebSocket is accepted; unique
/// for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Returns the next unique client id.
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a client id from a raw value.
    ///
    /// Intended for tests and tooling; normal code uses [`ClientId::next`].
    #[inline]
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
