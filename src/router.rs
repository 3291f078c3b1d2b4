//! Session routing.
//!
//! The router maps client ids to sessions and drives the whole per-client
//! lifecycle: launch-and-attach on connect, intercept-or-forward on every
//! message, remove-and-teardown on disconnect, drain-everything on
//! shutdown. Extension commands run as transient tasks so a slow `find`
//! never blocks the client's other traffic.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine;
use crate::error::{Error, Result};
use crate::identifiers::{ClientId, INTERNAL_ID_START};
use crate::launcher::BrowserLauncher;
use crate::protocol::extension::{self, EXTENSION_PREFIX, ExtensionMethod};
use crate::protocol::frame::Frame;
use crate::server::ClientHandle;
use crate::session::{Session, correlator};
use crate::transport::BidiConnection;

// ============================================================================
// Router
// ============================================================================

/// Map from connected client to its session.
pub struct Router {
    /// Active sessions by client id.
    sessions: Mutex<FxHashMap<ClientId, Arc<Session>>>,
    /// Supplies one browser per client.
    launcher: Arc<dyn BrowserLauncher>,
    /// Correlators report browser-initiated exits here.
    disconnect_tx: mpsc::UnboundedSender<ClientId>,
}

// ============================================================================
// Router - Constructor
// ============================================================================

impl Router {
    /// Creates a router and starts its disconnect drain task.
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Arc<Self> {
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();

        let router = Arc::new(Self {
            sessions: Mutex::new(FxHashMap::default()),
            launcher,
            disconnect_tx,
        });

        // Weak reference: the drain task must not keep the router alive.
        let weak = Arc::downgrade(&router);
        tokio::spawn(async move {
            while let Some(client_id) = disconnect_rx.recv().await {
                let Some(router) = weak.upgrade() else { break };
                router
                    .remove_and_teardown(client_id, "browser disconnected")
                    .await;
            }
        });

        router
    }

    /// Returns the number of active sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

// ============================================================================
// Router - Client Hooks
// ============================================================================

impl Router {
    /// Handles a new client: launch browser, attach BiDi, start the session.
    ///
    /// On failure the client gets one error frame and is closed; nothing is
    /// left behind to tear down.
    pub async fn on_client_connect(&self, client: ClientHandle) {
        let client_id = client.id();
        info!(client = %client_id, "launching browser for client");

        let browser = match self.launcher.launch().await {
            Ok(browser) => browser,
            Err(e) => {
                warn!(client = %client_id, error = %e, "browser launch failed");
                reject(&client, &e);
                return;
            }
        };

        let conn = match BidiConnection::connect(browser.ws_url()).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(client = %client_id, error = %e, "BiDi attach failed");
                let mut browser = browser;
                browser.close().await;
                reject(&client, &e);
                return;
            }
        };

        let session = Arc::new(Session::new(client, browser, conn));
        self.sessions.lock().insert(client_id, Arc::clone(&session));

        // The correlator must be reading before any internal command can
        // see its reply, the navigation subscribe included.
        tokio::spawn(correlator::run(
            Arc::clone(&session),
            self.disconnect_tx.clone(),
        ));

        // Best-effort: without events, navigation waits just time out.
        if let Err(e) = session.subscribe_navigation().await {
            warn!(client = %client_id, error = %e, "navigation subscribe failed");
        }

        info!(client = %client_id, "session started");
    }

    /// Handles one client frame: extension methods route to the engine,
    /// everything else is forwarded to the browser verbatim.
    pub async fn on_client_message(&self, client_id: ClientId, text: String) {
        let session = { self.sessions.lock().get(&client_id).cloned() };
        let Some(session) = session else {
            debug!(client = %client_id, "message from unknown client dropped");
            return;
        };

        // Best-effort parse; unparseable frames forward unchanged and the
        // browser rejects them.
        let parsed = Frame::parse(&text);

        // Ids at or above the watermark are reserved for router-internal
        // commands. Rejecting them here, before forwarding or engine
        // dispatch, is what keeps the pending map collision-free: a reply
        // carrying an internal id can only belong to the router.
        if let Some(frame) = &parsed
            && let Some(command_id) = frame.command_id()
            && command_id >= INTERNAL_ID_START
        {
            debug!(client = %client_id, command_id, "command id in reserved range rejected");
            let error = Error::protocol(format!(
                "command id {command_id} is reserved; client ids must be below {INTERNAL_ID_START}"
            ));
            session
                .client()
                .send_frame(extension::error_frame(command_id, &error).to_string());
            return;
        }

        if let Some(frame) = &parsed
            && let Some(method) = frame.method()
            && method.starts_with(EXTENSION_PREFIX)
            && let Some(extension_method) = ExtensionMethod::parse(method)
            && let Some(command_id) = frame.command_id()
        {
            let params = frame
                .value()
                .get("params")
                .cloned()
                .unwrap_or_else(|| json!({}));

            tokio::spawn(run_extension(session, extension_method, command_id, params));
            return;
        }

        if let Err(e) = session.forward_to_browser(&text).await {
            // The correlator notices the dead connection and tears down.
            debug!(client = %client_id, error = %e, "forward to browser failed");
        }
    }

    /// Handles a client disconnect: remove-and-teardown, exactly once.
    pub async fn on_client_disconnect(&self, client_id: ClientId) {
        self.remove_and_teardown(client_id, "client disconnected")
            .await;
    }

    /// Tears down every session. Used at global shutdown.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = { self.sessions.lock().drain().collect() };
        if !sessions.is_empty() {
            info!(count = sessions.len(), "closing all sessions");
        }

        for (_, session) in sessions {
            session.teardown("shutdown").await;
        }
    }

    /// Removes a session from the map and tears it down.
    async fn remove_and_teardown(&self, client_id: ClientId, reason: &str) {
        let session = { self.sessions.lock().remove(&client_id) };
        if let Some(session) = session {
            session.teardown(reason).await;
        }
    }
}

// ============================================================================
// Extension Dispatch
// ============================================================================

/// Sends one error frame and closes a client that never got a session.
fn reject(client: &ClientHandle, error: &Error) {
    client.send_frame(extension::error_frame(0, error).to_string());
    client.close();
}

/// Runs one extension command to completion and answers the client.
async fn run_extension(
    session: Arc<Session>,
    method: ExtensionMethod,
    command_id: u64,
    params: Value,
) {
    let outcome = dispatch_extension(&session, method, params).await;

    let envelope = match outcome {
        Ok(result) => extension::success_frame(command_id, result),
        Err(e) => {
            debug!(
                client = %session.client_id(),
                method = method.name(),
                error = %e,
                "extension command failed"
            );
            extension::error_frame(command_id, &e)
        }
    };

    // A torn-down session has nobody left to answer.
    if !session.is_closed() {
        session.client().send_frame(envelope.to_string());
    }
}

/// Decodes params and runs the engine for one extension method.
async fn dispatch_extension(
    session: &Session,
    method: ExtensionMethod,
    params: Value,
) -> Result<Value> {
    match method {
        ExtensionMethod::Find => {
            let params = serde_json::from_value(params)?;
            let info = engine::find(session, params).await?;
            Ok(serde_json::to_value(info)?)
        }
        ExtensionMethod::Click => {
            let params = serde_json::from_value(params)?;
            engine::click(session, params).await?;
            Ok(json!({"clicked": true}))
        }
        ExtensionMethod::Type => {
            let params = serde_json::from_value(params)?;
            engine::type_text(session, params).await?;
            Ok(json!({"typed": true}))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
