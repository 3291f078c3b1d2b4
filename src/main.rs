//! `vibium-proxy` binary.
//!
//! Environment configuration:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `VIBIUM_BROWSER` | `chromium` | Browser binary to launch per client |
//! | `VIBIUM_PORT` | `9229` | Client-facing WebSocket port |
//! | `VIBIUM_HEADLESS` | `1` | Set to `0` for a visible browser |
//! | `RUST_LOG` | `info` | Log filter |

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use vibium_proxy::{Proxy, Result, proxy::DEFAULT_PORT};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let browser = env::var("VIBIUM_BROWSER").unwrap_or_else(|_| "chromium".to_string());
    let port = env::var("VIBIUM_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let headless = env::var("VIBIUM_HEADLESS").map_or(true, |raw| raw != "0");

    let proxy = Proxy::builder()
        .browser(&browser)
        .port(port)
        .headless(headless)
        .build()
        .await?;

    info!(url = %proxy.ws_url(), browser = %browser, "vibium proxy ready");
    proxy.run_until_ctrl_c().await
}
