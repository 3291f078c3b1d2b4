//! WebSocket connection to one browser's BiDi endpoint.
//!
//! The connection is a framed full-duplex transport with a strict ownership
//! split: exactly one task (the session's correlator) calls [`receive`],
//! while any number of callers share [`send`]. Writes are serialized behind
//! an async mutex; no framing knowledge lives here.
//!
//! [`receive`]: BidiConnection::receive
//! [`send`]: BidiConnection::send

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// The underlying WebSocket stream type for a browser connection.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// BidiConnection
// ============================================================================

/// A framed transport to one browser.
///
/// # Contract
///
/// - `send` is serialized against concurrent callers.
/// - `receive` blocks until one text frame arrives or returns a terminal
///   error; the correlator is the only intended caller.
/// - `close` is idempotent and causes subsequent `receive` calls to fail.
pub struct BidiConnection {
    /// Write half, serialized.
    writer: Mutex<SplitSink<WsStream, Message>>,
    /// Read half; single reader by convention, guarded anyway.
    reader: Mutex<SplitStream<WsStream>>,
    /// Set once by `close`.
    closed: AtomicBool,
}

impl BidiConnection {
    /// Connects to a browser's BiDi WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttachFailed`] if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::attach_failed(format!("{url}: {e}")))?;

        debug!(url, "BiDi connection established");

        let (writer, reader) = stream.split();
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed: AtomicBool::new(false),
        })
    }

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the connection was closed locally
    /// - [`Error::WebSocket`] on transport failure
    pub async fn send(&self, text: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(text.into())).await?;
        trace!(len = text.len(), "frame sent");
        Ok(())
    }

    /// Receives the next text frame.
    ///
    /// Ping/pong and binary frames are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] once the stream ends or a Close frame
    ///   arrives
    /// - [`Error::WebSocket`] on transport failure
    pub async fn receive(&self) -> Result<String> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) | None => {
                    debug!("BiDi stream ended");
                    return Err(Error::SessionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::WebSocket(e)),
            }
        }
    }

    /// Closes the connection.
    ///
    /// Idempotent. The Close frame unblocks a pending [`receive`] once the
    /// peer acknowledges; killing the peer process has the same effect.
    ///
    /// [`receive`]: BidiConnection::receive
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(error = %e, "BiDi close handshake failed");
        }
    }

    /// Returns `true` once `close` has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
