//! Client-facing WebSocket front-end.
//!
//! Accepts automation clients and feeds the router's connect / message /
//! disconnect hooks. Each client gets a writer task draining an unbounded
//! channel into its WebSocket sink; the [`ClientHandle`] other components
//! hold is just the sending side of that channel, so forwarding a frame
//! north never blocks the correlator.
//!
//! # Connection Flow
//!
//! 1. Client connects to `ws://127.0.0.1:{port}`
//! 2. Router launches a dedicated browser and attaches its BiDi socket
//! 3. Frames relay in both directions until either side disconnects
//! 4. Disconnect triggers remove-and-teardown in the router

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::ClientId;
use crate::router::Router;

// ============================================================================
// ClientDirective
// ============================================================================

/// Instruction for a client's writer task.
pub(crate) enum ClientDirective {
    /// Send one text frame.
    Frame(String),
    /// Close the WebSocket and stop writing.
    Close,
}

// ============================================================================
// ClientHandle
// ============================================================================

/// Sending side of one connected client.
///
/// Cheap to clone; every component that needs to reach the client holds
/// one. Sends are fire-and-forget: once the client is gone they are
/// silently dropped.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::UnboundedSender<ClientDirective>,
}

impl ClientHandle {
    /// Creates a handle and the receiver its writer task drains.
    pub(crate) fn channel(id: ClientId) -> (Self, mpsc::UnboundedReceiver<ClientDirective>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queues one text frame for the client.
    pub fn send_frame(&self, text: impl Into<String>) {
        if self.tx.send(ClientDirective::Frame(text.into())).is_err() {
            trace!(client = %self.id, "frame for disconnected client dropped");
        }
    }

    /// Asks the writer task to close the WebSocket.
    ///
    /// Idempotent; harmless after the client is already gone.
    pub fn close(&self) {
        let _ = self.tx.send(ClientDirective::Close);
    }
}

// ============================================================================
// ProxyServer
// ============================================================================

/// WebSocket server automation clients connect to.
pub struct ProxyServer {
    /// Port the server is bound to.
    port: u16,
    /// Stops the accept loop.
    shutdown: CancellationToken,
}

impl ProxyServer {
    /// Binds the front-end and starts accepting clients.
    ///
    /// Use port 0 to let the OS assign one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16, router: Arc<Router>) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let actual_port = listener.local_addr()?.port();
        let shutdown = CancellationToken::new();

        let server = Arc::new(Self {
            port: actual_port,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(accept_loop(listener, router, shutdown));

        info!(port = actual_port, "proxy front-end listening");
        Ok(server)
    }

    /// Binds on localhost.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn bind_local(port: u16, router: Arc<Router>) -> Result<Arc<Self>> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), port, router).await
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL clients connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Stops accepting new clients.
    ///
    /// Existing sessions are the router's to close via `close_all`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

/// Accepts clients until shutdown.
async fn accept_loop(listener: TcpListener, router: Arc<Router>, shutdown: CancellationToken) {
    debug!("accept loop started");

    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(router, stream, addr).await {
                        warn!(?addr, error = %e, "client connection failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    debug!("accept loop terminated");
}

/// Serves one client connection to completion.
async fn handle_client(router: Arc<Router>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (sink, mut read) = ws.split();

    let id = ClientId::next();
    info!(client = %id, ?addr, "client connected");

    let (handle, rx) = ClientHandle::channel(id);
    tokio::spawn(writer_task(sink, rx));

    router.on_client_connect(handle).await;

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                router.on_client_message(id, text.to_string()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client = %id, error = %e, "client read failed");
                break;
            }
        }
    }

    info!(client = %id, "client disconnected");
    router.on_client_disconnect(id).await;
    Ok(())
}

/// Drains queued directives into the client's WebSocket sink.
async fn writer_task(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<ClientDirective>,
) {
    while let Some(directive) = rx.recv().await {
        match directive {
            ClientDirective::Frame(text) => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            ClientDirective::Close => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
