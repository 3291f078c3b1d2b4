//! Session lifecycle scenarios: disconnects, crashes, launch failures,
//! global shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use vibium_proxy::launcher::{BrowserHandle, BrowserLauncher};
use vibium_proxy::{Error, ProxyServer, Result, Router};

use common::{FixtureBrowser, FixtureLauncher, FixtureScript, TestClient};

// ============================================================================
// Harness
// ============================================================================

async fn start_proxy(script: FixtureScript) -> (FixtureBrowser, Arc<Router>, Arc<ProxyServer>) {
    let fixture = FixtureBrowser::spawn(script).await;
    let router = Router::new(FixtureLauncher::new(&fixture));
    let server = ProxyServer::bind_local(0, Arc::clone(&router))
        .await
        .expect("bind front-end");
    (fixture, router, server)
}

/// Polls until the router holds no sessions, within the given window.
async fn wait_sessions_drained(router: &Router, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if router.session_count() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    router.session_count() == 0
}

// ============================================================================
// Scenario: disconnect during wait
// ============================================================================

#[tokio::test]
async fn client_disconnect_during_navigation_wait_tears_down() {
    // Element exists; navigation events never come, so the click parks in
    // its waitForLoad stage.
    let (fixture, router, server) = start_proxy(FixtureScript::with_button()).await;
    let mut client = TestClient::connect(&server.ws_url()).await;

    client
        .send(json!({
            "id": 7,
            "method": "vibium:click",
            "params": {"selector": "button", "timeout": 10_000},
        }))
        .await;

    // Let the click reach its wait stage, then vanish without a goodbye.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(router.session_count(), 1);
    client.abandon();

    // Teardown completes promptly: browser side closed, session gone.
    assert!(
        fixture.wait_disconnected(Duration::from_secs(1)).await,
        "browser connection not closed within 1s"
    );
    assert!(wait_sessions_drained(&router, Duration::from_secs(1)).await);
}

// ============================================================================
// Scenario: browser crash
// ============================================================================

#[tokio::test]
async fn browser_crash_closes_client_and_removes_session() {
    let (fixture, router, server) = start_proxy(FixtureScript::with_button()).await;
    let mut client = TestClient::connect(&server.ws_url()).await;

    // Prove the session is live first.
    client
        .send(json!({
            "id": 2,
            "method": "vibium:find",
            "params": {"selector": "button"},
        }))
        .await;
    let response = client
        .recv_response(2, Duration::from_secs(2))
        .await
        .expect("find response");
    assert_eq!(response["type"], "success");

    // Kill the "browser" mid-session.
    fixture.crash();

    assert!(
        wait_sessions_drained(&router, Duration::from_secs(2)).await,
        "session not removed after browser crash"
    );

    // The proxy closes the client connection during teardown.
    assert!(client.recv_text(Duration::from_secs(2)).await.is_none());
}

// ============================================================================
// Scenario: launch failure
// ============================================================================

struct BrokenLauncher;

#[async_trait::async_trait]
impl BrowserLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<BrowserHandle> {
        Err(Error::launch_failed("browser binary exploded"))
    }
}

#[tokio::test]
async fn launch_failure_sends_error_and_closes() {
    let router = Router::new(Arc::new(BrokenLauncher));
    let server = ProxyServer::bind_local(0, Arc::clone(&router))
        .await
        .expect("bind front-end");
    let mut client = TestClient::connect(&server.ws_url()).await;

    let text = client
        .recv_text(Duration::from_secs(2))
        .await
        .expect("error frame before close");
    let frame: serde_json::Value = serde_json::from_str(&text).expect("json");

    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["error"], "launch-failed");
    assert_eq!(router.session_count(), 0);

    // Nothing follows the rejection.
    assert!(client.recv_text(Duration::from_secs(1)).await.is_none());
}

// ============================================================================
// Global shutdown
// ============================================================================

#[tokio::test]
async fn close_all_tears_down_every_session() {
    let (fixture, router, server) = start_proxy(FixtureScript::with_button()).await;
    let mut client = TestClient::connect(&server.ws_url()).await;

    client
        .send(json!({
            "id": 3,
            "method": "vibium:find",
            "params": {"selector": "button"},
        }))
        .await;
    client
        .recv_response(3, Duration::from_secs(2))
        .await
        .expect("find response");
    assert_eq!(router.session_count(), 1);

    server.shutdown();
    router.close_all().await;

    assert_eq!(router.session_count(), 0);
    assert!(fixture.wait_disconnected(Duration::from_secs(1)).await);
    assert!(client.recv_text(Duration::from_secs(2)).await.is_none());
}

// ============================================================================
// Teardown idempotence (client side)
// ============================================================================

#[tokio::test]
async fn second_disconnect_trigger_is_noop() {
    let (fixture, router, server) = start_proxy(FixtureScript::with_button()).await;
    let client = TestClient::connect(&server.ws_url()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.session_count(), 1);

    // Client disconnect races browser-side teardown; both paths funnel
    // into the same exactly-once teardown.
    client.close().await;
    assert!(wait_sessions_drained(&router, Duration::from_secs(1)).await);
    fixture.crash();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.session_count(), 0);
}
