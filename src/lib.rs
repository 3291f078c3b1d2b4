//! Vibium Proxy - WebDriver BiDi browser-automation proxy.
//!
//! The proxy sits between automation clients and real browsers speaking
//! WebDriver BiDi over WebSockets. Each connecting client gets a dedicated
//! browser; standard BiDi traffic relays transparently in both directions,
//! and a small set of `vibium:` extension commands composes BiDi
//! primitives into reliable high-level actions.
//!
//! # Architecture
//!
//! ```text
//! client ──ws──► server ──► router ──┬── extension engine ──► session ──ws──► browser
//!                                    └── verbatim forward ──►
//! browser frames ──► correlator ──┬── internal replies (engine)
//!                                 ├── event listener queues (engine)
//!                                 └── client passthrough
//! ```
//!
//! Key design points:
//!
//! - One session per client: browser process, BiDi connection, correlator
//!   task, pending-command map, and listener registry live and die together.
//! - The correlator is the connection's only reader; responses to
//!   router-internal command ids never reach the client, events reach both
//!   listeners and the client.
//! - Extension commands carry a single deadline; every nested wait spends
//!   remaining time against it.
//!
//! # Extension commands
//!
//! | Method | Result |
//! |--------|--------|
//! | `vibium:find` | `{tag, text, box}` |
//! | `vibium:click` | `{clicked: true}` |
//! | `vibium:type` | `{typed: true}` |
//!
//! # Quick Start
//!
//! ```no_run
//! use vibium_proxy::{Proxy, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let proxy = Proxy::builder()
//!         .browser("/usr/bin/chromium")
//!         .port(9229)
//!         .build()
//!         .await?;
//!
//!     println!("listening on {}", proxy.ws_url());
//!     proxy.run_until_ctrl_c().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Extension command implementations |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`launcher`] | Browser process supply |
//! | [`protocol`] | Frame classification and message types |
//! | [`proxy`] | Builder and top-level assembly |
//! | [`router`] | Client-to-session routing |
//! | [`server`] | Client-facing WebSocket front-end |
//! | [`session`] | Per-client state and teardown |
//! | [`transport`] | Browser-side WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Extension command implementations.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Browser process launching.
pub mod launcher;

/// Wire protocol types.
pub mod protocol;

/// Proxy assembly and configuration.
pub mod proxy;

/// Session routing.
pub mod router;

/// Client-facing WebSocket front-end.
pub mod server;

/// Per-client session state.
pub mod session;

/// Browser-side WebSocket transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Top-level assembly
pub use proxy::{Proxy, ProxyBuilder};

// Routing and sessions
pub use router::Router;
pub use server::{ClientHandle, ProxyServer};
pub use session::Session;

// Browser supply
pub use launcher::{BrowserHandle, BrowserLauncher, ProcessLauncher};

// Protocol surface
pub use protocol::{BoundingBox, ElementInfo, WaitBehavior};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ClientId;
