//! Single-reader frame dispatch.
//!
//! One correlator task per session reads the BiDi connection and fans each
//! inbound frame into one of three sinks:
//!
//! 1. Responses to router-internal ids go to the waiting issuer and are
//!    *not* forwarded to the client.
//! 2. Events go to every registered listener queue *and* to the client;
//!    extension commands need event visibility without stealing events
//!    from the client's own subscriptions.
//! 3. Everything else is forwarded to the client verbatim.
//!
//! When the read side dies and the session was not already closing, the
//! correlator reports the client id so the router can remove and tear the
//! session down.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::identifiers::ClientId;
use crate::protocol::{Frame, FrameKind};

use super::Session;

// ============================================================================
// Correlator Task
// ============================================================================

/// Runs the read loop until the connection dies or the session stops.
pub(crate) async fn run(session: Arc<Session>, disconnects: mpsc::UnboundedSender<ClientId>) {
    debug!(client = %session.client_id(), "correlator started");
    let stop = session.stop_token();

    loop {
        let text = tokio::select! {
            () = stop.cancelled() => break,
            received = session.connection().receive() => match received {
                Ok(text) => text,
                Err(e) => {
                    if !session.is_closed() {
                        debug!(client = %session.client_id(), error = %e, "BiDi read failed");
                    }
                    break;
                }
            },
        };

        dispatch(&session, &text);
    }

    session.mark_stopped();

    // Browser-initiated exit: hand the session back to the router for
    // removal and teardown. Voluntary teardown already happened otherwise.
    if !session.is_closed() {
        let _ = disconnects.send(session.client_id());
    }

    debug!(client = %session.client_id(), "correlator terminated");
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes one inbound frame. Preserves server-send order: dispatch is
/// synchronous and the client-directed copy uses the original bytes.
fn dispatch(session: &Session, text: &str) {
    let Some(frame) = Frame::parse(text) else {
        trace!("unparseable browser frame forwarded");
        session.client().send_frame(text);
        return;
    };

    match frame.kind() {
        FrameKind::Response { id } => {
            if let Some(reply_tx) = session.take_pending(id) {
                trace!(id, "internal reply delivered");
                let _ = reply_tx.send(frame.into_value());
            } else {
                session.client().send_frame(text);
            }
        }

        FrameKind::Event { method } => {
            session.listeners().publish(&method, frame.value());
            session.client().send_frame(text);
        }

        FrameKind::Other => {
            session.client().send_frame(text);
        }
    }
}
