//! Shared test harness: a scripted fixture browser, a launcher that hands
//! sessions to it, and a WebSocket client driving the proxy like an
//! automation client would.

// Each test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use vibium_proxy::launcher::{BrowserHandle, BrowserLauncher};

// ============================================================================
// FixtureScript
// ============================================================================

/// Behavior of the fixture browser, fixed per test.
#[derive(Clone)]
pub struct FixtureScript {
    /// Probe result: `Some(json string)` means the element exists.
    pub element: Option<String>,
    /// Emit navigationStarted / domContentLoaded / load after each
    /// `input.performActions`.
    pub emit_navigation: bool,
    /// Hold each `script.callFunction` reply back this long, keeping the
    /// probe's internal command pending.
    pub probe_delay: Option<Duration>,
}

impl FixtureScript {
    /// A page with no matching element.
    pub fn empty_page() -> Self {
        Self {
            element: None,
            emit_navigation: false,
            probe_delay: None,
        }
    }

    /// A page with a 100x40 button at (10, 10).
    pub fn with_button() -> Self {
        Self {
            element: Some(
                r#"{"tag":"button","text":"Submit","box":{"x":10.0,"y":10.0,"width":100.0,"height":40.0}}"#
                    .to_string(),
            ),
            emit_navigation: false,
            probe_delay: None,
        }
    }

    /// A page with a button whose click navigates.
    pub fn with_navigating_button() -> Self {
        Self {
            emit_navigation: true,
            ..Self::with_button()
        }
    }

    /// Stalls every probe reply by `delay`.
    pub fn probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }
}

// ============================================================================
// FixtureBrowser
// ============================================================================

/// An in-process WebSocket server standing in for a browser's BiDi end.
pub struct FixtureBrowser {
    /// URL sessions attach to.
    pub ws_url: String,
    /// Every frame the fixture received, in order.
    pub received: Arc<Mutex<Vec<Value>>>,
    /// Set once a session's connection to the fixture ends.
    pub disconnected: Arc<AtomicBool>,
    /// Notified when a session's connection to the fixture ends.
    pub on_disconnect: Arc<Notify>,
    /// Triggers an abrupt connection drop (browser crash).
    crash_signal: Arc<Notify>,
}

impl FixtureBrowser {
    /// Binds the fixture and starts accepting BiDi connections.
    pub async fn spawn(script: FixtureScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
        let port = listener.local_addr().expect("addr").port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let disconnected = Arc::new(AtomicBool::new(false));
        let on_disconnect = Arc::new(Notify::new());
        let crash_signal = Arc::new(Notify::new());

        {
            let received = Arc::clone(&received);
            let disconnected = Arc::clone(&disconnected);
            let on_disconnect = Arc::clone(&on_disconnect);
            let crash_signal = Arc::clone(&crash_signal);

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let script = script.clone();
                    let received = Arc::clone(&received);
                    let disconnected = Arc::clone(&disconnected);
                    let on_disconnect = Arc::clone(&on_disconnect);
                    let crash_signal = Arc::clone(&crash_signal);

                    tokio::spawn(async move {
                        serve_session(stream, script, received, crash_signal).await;
                        disconnected.store(true, Ordering::SeqCst);
                        on_disconnect.notify_waiters();
                    });
                }
            });
        }

        Self {
            ws_url: format!("ws://127.0.0.1:{port}/session"),
            received,
            disconnected,
            on_disconnect,
            crash_signal,
        }
    }

    /// Severs the session's connection without a close handshake, like a
    /// killed browser process.
    pub fn crash(&self) {
        self.crash_signal.notify_one();
    }

    /// Returns received frames whose method matches.
    pub fn received_with_method(&self, method: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|frame| frame.get("method").and_then(Value::as_str) == Some(method))
            .cloned()
            .collect()
    }

    /// Waits until the session's connection to the fixture ends.
    pub async fn wait_disconnected(&self, within: Duration) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            return true;
        }
        timeout(within, self.on_disconnect.notified()).await.is_ok()
            || self.disconnected.load(Ordering::SeqCst)
    }
}

/// Serves one BiDi connection per the script.
async fn serve_session(
    stream: TcpStream,
    script: FixtureScript,
    received: Arc<Mutex<Vec<Value>>>,
    crash: Arc<Notify>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();

    loop {
        let message = tokio::select! {
            () = crash.notified() => {
                // Drop without a close handshake, like a killed process.
                return;
            }
            message = read.next() => message,
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        };

        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        received.lock().push(frame.clone());

        let id = frame.get("id").cloned().unwrap_or(json!(0));
        let method = frame.get("method").and_then(Value::as_str).unwrap_or("");

        let reply = match method {
            "session.subscribe" => {
                json!({"id": id, "type": "success", "result": {"subscription": "sub-nav-1"}})
            }
            "session.unsubscribe" => json!({"id": id, "type": "success", "result": {}}),
            "browsingContext.getTree" => json!({
                "id": id,
                "type": "success",
                "result": {"contexts": [
                    {"context": "ctx-1", "url": "about:blank", "children": []}
                ]},
            }),
            "script.callFunction" => {
                if let Some(delay) = script.probe_delay {
                    tokio::time::sleep(delay).await;
                }
                match &script.element {
                    Some(element) => json!({
                        "id": id,
                        "type": "success",
                        "result": {"type": "success", "result": {"type": "string", "value": element}},
                    }),
                    None => json!({
                        "id": id,
                        "type": "success",
                        "result": {"type": "success", "result": {"type": "null"}},
                    }),
                }
            }
            "input.performActions" => json!({"id": id, "type": "success", "result": {}}),
            _ => json!({
                "id": id,
                "type": "success",
                "result": {"echo": method, "extra": {"nested": [1, 2, 3]}},
            }),
        };

        if send_json(&mut write, &reply).await.is_err() {
            return;
        }

        if method == "input.performActions" && script.emit_navigation {
            for event in [
                "browsingContext.navigationStarted",
                "browsingContext.domContentLoaded",
                "browsingContext.load",
            ] {
                let frame = json!({
                    "type": "event",
                    "method": event,
                    "params": {"context": "ctx-1", "url": "https://example.test/next"},
                });
                if send_json(&mut write, &frame).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn send_json(
    write: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    value: &Value,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    write.send(Message::Text(value.to_string().into())).await
}

// ============================================================================
// FixtureLauncher
// ============================================================================

/// Launcher whose every "browser" is the fixture.
pub struct FixtureLauncher {
    ws_url: String,
}

impl FixtureLauncher {
    pub fn new(fixture: &FixtureBrowser) -> Arc<Self> {
        Arc::new(Self {
            ws_url: fixture.ws_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for FixtureLauncher {
    async fn launch(&self) -> vibium_proxy::Result<BrowserHandle> {
        Ok(BrowserHandle::detached(&self.ws_url))
    }
}

// ============================================================================
// TestClient
// ============================================================================

/// A raw WebSocket automation client.
pub struct TestClient {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl TestClient {
    /// Connects to the proxy front-end.
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("client connect");
        let (write, read) = ws.split();
        Self { write, read }
    }

    /// Sends one JSON frame.
    pub async fn send(&mut self, frame: Value) {
        self.write
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("client send");
    }

    /// Receives the next text frame, raw.
    pub async fn recv_text(&mut self, within: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;
            let message = timeout(remaining, self.read.next()).await.ok()??;
            match message {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Receives frames until one has the given `id`.
    pub async fn recv_response(&mut self, id: u64, within: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            let text = self.recv_text(remaining).await?;
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if frame.get("id").and_then(Value::as_u64) == Some(id) {
                return Some(frame);
            }
        }
    }

    /// Drops the connection without a close handshake.
    pub fn abandon(self) {
        drop(self);
    }

    /// Closes the connection cleanly.
    pub async fn close(mut self) {
        let _ = self.write.close().await;
    }
}
