//! Proxy assembly and configuration.
//!
//! [`ProxyBuilder`] wires the launcher, router, and front-end together:
//!
//! ```no_run
//! use vibium_proxy::Proxy;
//!
//! # async fn example() -> vibium_proxy::Result<()> {
//! let proxy = Proxy::builder()
//!     .browser("/usr/bin/chromium")
//!     .port(9229)
//!     .build()
//!     .await?;
//!
//! println!("clients connect to {}", proxy.ws_url());
//! proxy.run_until_ctrl_c().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::launcher::{BrowserLauncher, ProcessLauncher};
use crate::router::Router;
use crate::server::ProxyServer;

// ============================================================================
// Constants
// ============================================================================

/// Default client-facing port.
pub const DEFAULT_PORT: u16 = 9229;

// ============================================================================
// ProxyBuilder
// ============================================================================

/// Configuration builder for [`Proxy`].
pub struct ProxyBuilder {
    bind_ip: IpAddr,
    port: u16,
    browser: PathBuf,
    headless: bool,
    launcher: Option<Arc<dyn BrowserLauncher>>,
}

impl ProxyBuilder {
    /// Creates a builder with defaults: localhost, port 9229, headless
    /// `chromium` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            browser: PathBuf::from("chromium"),
            headless: true,
            launcher: None,
        }
    }

    /// Sets the client-facing bind address.
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the client-facing port (0 for OS-assigned).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the browser binary the stock launcher spawns.
    #[must_use]
    pub fn browser(mut self, binary: impl Into<PathBuf>) -> Self {
        self.browser = binary.into();
        self
    }

    /// Sets headless mode for the stock launcher (default `true`).
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Replaces the launcher entirely.
    ///
    /// Overrides [`browser`](Self::browser) and
    /// [`headless`](Self::headless).
    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Builds and binds the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the front-end cannot bind.
    pub async fn build(self) -> Result<Proxy> {
        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(ProcessLauncher::new(self.browser).headless(self.headless))
        });

        let router = Router::new(launcher);
        let server = ProxyServer::bind(self.bind_ip, self.port, Arc::clone(&router)).await?;

        Ok(Proxy { router, server })
    }
}

impl Default for ProxyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Proxy
// ============================================================================

/// A running automation proxy.
pub struct Proxy {
    router: Arc<Router>,
    server: Arc<ProxyServer>,
}

impl Proxy {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::new()
    }

    /// Returns the URL automation clients connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        self.server.ws_url()
    }

    /// Returns the bound client-facing port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// Returns the session router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Serves until Ctrl-C, then closes every session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the signal handler cannot install.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Stops accepting clients and tears down every session.
    pub async fn shutdown(&self) {
        self.server.shutdown();
        self.router.close_all().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
