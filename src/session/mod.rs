//! Per-client session state.
//!
//! A [`Session`] owns everything one automation client needs: the browser
//! process handle, the BiDi connection, the pending-internal command map,
//! the event listener registry, and the stop signal that wakes every inner
//! wait on teardown.
//!
//! # Lifecycle
//!
//! ```text
//! starting ──► running ──► closing ──► closed
//!     │                       ▲
//!     └──── launch/attach ────┘  (failure goes straight to closed)
//! ```
//!
//! `running → closing` fires on client disconnect, browser disconnect, or
//! global shutdown; whichever comes first runs the ordered teardown exactly
//! once, and later triggers are no-ops.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlator` | Single reader task fanning browser frames out |
//! | `events` | Bounded listener queues for extension commands |

// ============================================================================
// Submodules
// ============================================================================

/// Single-reader frame dispatch task.
pub(crate) mod correlator;

/// Per-session event listener registry.
pub mod events;

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, INTERNAL_ID_START};
use crate::launcher::BrowserHandle;
use crate::protocol::BrowserCommand;
use crate::protocol::frame;
use crate::server::ClientHandle;
use crate::transport::BidiConnection;

use events::EventListenerRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Hard cap on any single internal command round-trip.
///
/// A deadlock guard, independent of the per-command deadlines extension
/// callers enforce on top.
pub const INTERNAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Session
// ============================================================================

/// State for one connected automation client and its dedicated browser.
pub struct Session {
    /// Handle for sending frames back to the client.
    client: ClientHandle,
    /// Browser process handle, taken at teardown.
    browser: Mutex<Option<BrowserHandle>>,
    /// BiDi connection; the correlator is its only reader.
    conn: BidiConnection,
    /// True from construction until the correlator exits.
    running: AtomicBool,
    /// Wakes every inner wait on teardown.
    stop: CancellationToken,
    /// Next router-owned command id.
    next_internal_id: AtomicU64,
    /// In-flight internal commands awaiting replies.
    pending: Mutex<FxHashMap<u64, oneshot::Sender<Value>>>,
    /// Listener queues for extension commands.
    listeners: EventListenerRegistry,
    /// Navigation subscription id, unsubscribed at teardown.
    subscription: Mutex<Option<String>>,
    /// Set once by the first teardown trigger.
    closed: AtomicBool,
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Creates a session around a launched browser and attached connection.
    #[must_use]
    pub fn new(client: ClientHandle, browser: BrowserHandle, conn: BidiConnection) -> Self {
        debug!(client = %client.id(), "session created");

        Self {
            client,
            browser: Mutex::new(Some(browser)),
            conn,
            running: AtomicBool::new(true),
            stop: CancellationToken::new(),
            next_internal_id: AtomicU64::new(INTERNAL_ID_START),
            pending: Mutex::new(FxHashMap::default()),
            listeners: EventListenerRegistry::new(),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the client handle.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client.id()
    }

    /// Returns the event listener registry.
    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &EventListenerRegistry {
        &self.listeners
    }

    /// Returns the BiDi connection.
    #[inline]
    #[must_use]
    pub(crate) fn connection(&self) -> &BidiConnection {
        &self.conn
    }

    /// Returns a clone of the stop token.
    #[inline]
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Returns `true` while the correlator is alive.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns `true` once teardown has been triggered.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the correlator as stopped.
    pub(crate) fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Removes and returns the reply slot for an internal command id.
    pub(crate) fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Value>> {
        self.pending.lock().remove(&id)
    }
}

// ============================================================================
// Session - Internal Commands
// ============================================================================

impl Session {
    /// Sends a router-originated BiDi command and waits for its reply.
    ///
    /// Returns the raw reply frame; callers extract `result` or surface the
    /// browser error as they see fit.
    ///
    /// # Errors
    ///
    /// - [`Error::InternalTimeout`] after [`INTERNAL_COMMAND_TIMEOUT`]
    /// - [`Error::SessionClosed`] if the session stops first
    /// - [`Error::WebSocket`] / [`Error::Json`] on transport failure
    pub async fn send_internal(&self, command: BrowserCommand) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let method = command.method();
        let id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let text = serde_json::to_string(&command.into_frame(id)?)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if let Err(e) = self.conn.send(&text).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let outcome = tokio::select! {
            reply = rx => reply.map_err(|_| Error::SessionClosed),
            () = tokio::time::sleep(INTERNAL_COMMAND_TIMEOUT) => Err(Error::internal_timeout(
                method,
                INTERNAL_COMMAND_TIMEOUT.as_millis() as u64,
            )),
            () = self.stop.cancelled() => Err(Error::SessionClosed),
        };

        self.pending.lock().remove(&id);
        outcome
    }

    /// Forwards a client frame to the browser unchanged.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the caller logs it and lets the
    /// correlator notice the dead connection.
    pub async fn forward_to_browser(&self, text: &str) -> Result<()> {
        self.conn.send(text).await
    }
}

// ============================================================================
// Session - Navigation Subscription
// ============================================================================

impl Session {
    /// Subscribes to the navigation milestones extension commands wait on.
    ///
    /// Called once at session creation. A failure is reported to the
    /// caller, which logs and continues: commands needing events will
    /// simply time out.
    ///
    /// # Errors
    ///
    /// Propagates internal-command failures and browser errors.
    pub async fn subscribe_navigation(&self) -> Result<()> {
        let reply = self
            .send_internal(BrowserCommand::subscribe_navigation())
            .await?;
        let result = frame::into_result(reply)?;

        let subscription = result
            .get("subscription")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if let Some(ref id) = subscription {
            debug!(client = %self.client_id(), subscription = %id, "navigation events subscribed");
        }
        *self.subscription.lock() = subscription;
        Ok(())
    }
}

// ============================================================================
// Session - Teardown
// ============================================================================

impl Session {
    /// Tears the session down.
    ///
    /// Idempotent. Order: signal stop, best-effort unsubscribe, close the
    /// BiDi connection (unblocking the correlator), terminate the browser,
    /// close the client.
    pub async fn teardown(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(client = %self.client_id(), reason, "session closing");
        self.running.store(false, Ordering::SeqCst);
        self.stop.cancel();

        // Fire-and-forget: the stop token has already aborted every
        // internal waiter, so this write cannot go through send_internal.
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            let command = BrowserCommand::SessionUnsubscribe {
                subscriptions: vec![subscription],
            };
            let id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
            match command.into_frame(id).map(|f| f.to_string()) {
                Ok(text) => {
                    if let Err(e) = self.conn.send(&text).await {
                        debug!(error = %e, "unsubscribe skipped");
                    }
                }
                Err(e) => warn!(error = %e, "unsubscribe frame build failed"),
            }
        }

        self.conn.close().await;

        let browser = self.browser.lock().take();
        if let Some(mut browser) = browser {
            browser.close().await;
        }

        self.client.close();
        info!(client = %self.client_id(), "session closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
