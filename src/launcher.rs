//! Browser process launching.
//!
//! The router only needs two things from a browser: a BiDi WebSocket URL
//! to attach to and a handle that kills the process at teardown. The
//! [`BrowserLauncher`] trait captures exactly that, so tests and embedders
//! can substitute their own browser supply.
//!
//! [`ProcessLauncher`] is the stock implementation: spawn the binary with a
//! throwaway profile, scrape the `WebDriver BiDi listening on ws://…` (or
//! DevTools) banner from its output, hand back the URL.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the browser to advertise its BiDi endpoint.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint banner printed by Firefox (BiDi) and Chromium (DevTools).
static WS_URL_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:WebDriver BiDi listening on|DevTools listening on)\s+(wss?://\S+)")
        .expect("static pattern")
});

// ============================================================================
// BrowserLauncher
// ============================================================================

/// Supplies one dedicated browser per session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launches a browser and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailed`] when no usable browser comes up.
    async fn launch(&self) -> Result<BrowserHandle>;
}

// ============================================================================
// ProcessGuard
// ============================================================================

/// Guards a child process and ensures it is killed when dropped.
struct ProcessGuard {
    /// The child process handle.
    child: Option<Child>,
    /// Process ID for logging.
    pid: u32,
}

impl ProcessGuard {
    /// Creates a new process guard.
    fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        debug!(pid, "process guard created");
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Kills the process and waits for it to exit.
    async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!(pid = self.pid, "killing browser process");
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "failed to kill process");
            }
            if let Err(e) = child.wait().await {
                debug!(pid = self.pid, error = %e, "failed to wait for process");
            }
            info!(pid = self.pid, "browser process terminated");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// BrowserHandle
// ============================================================================

/// A launched browser: its BiDi endpoint plus teardown authority.
pub struct BrowserHandle {
    ws_url: String,
    process: Option<ProcessGuard>,
    /// Kept alive for the browser's lifetime, removed on drop.
    #[allow(dead_code)]
    profile: Option<TempDir>,
}

impl BrowserHandle {
    /// Wraps an externally managed endpoint with no process to kill.
    ///
    /// Used by tests and embedders that own the browser lifecycle.
    #[must_use]
    pub fn detached(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            process: None,
            profile: None,
        }
    }

    /// Returns the BiDi WebSocket URL.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Terminates the browser process, if any.
    ///
    /// Idempotent; detached handles are a no-op.
    pub async fn close(&mut self) {
        if let Some(mut guard) = self.process.take() {
            guard.kill().await;
        }
    }
}

// ============================================================================
// ProcessLauncher
// ============================================================================

/// Launches a local browser binary per session.
pub struct ProcessLauncher {
    /// Path to the browser binary.
    binary: PathBuf,
    /// Run without a visible window.
    headless: bool,
    /// Extra command-line arguments appended verbatim.
    extra_args: Vec<String>,
}

impl ProcessLauncher {
    /// Creates a launcher for the given binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            headless: true,
            extra_args: Vec::new(),
        }
    }

    /// Sets headless mode (default `true`).
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Appends an extra command-line argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

#[async_trait]
impl BrowserLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<BrowserHandle> {
        let profile = tempfile::Builder::new()
            .prefix("vibium-profile-")
            .tempdir()
            .map_err(|e| Error::launch_failed(format!("profile dir: {e}")))?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg("--no-first-run");
        if self.headless {
            command.arg("--headless");
        }
        command.args(&self.extra_args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(binary = %self.binary.display(), "spawning browser");
        let mut child = command
            .spawn()
            .map_err(|e| Error::launch_failed(format!("{}: {e}", self.binary.display())))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::launch_failed("browser stderr not captured"))?;

        let mut guard = ProcessGuard::new(child);

        let ws_url = match timeout(LAUNCH_TIMEOUT, scan_for_ws_url(stderr)).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                guard.kill().await;
                return Err(Error::launch_failed(
                    "browser exited without advertising a BiDi endpoint",
                ));
            }
            Err(_) => {
                guard.kill().await;
                return Err(Error::launch_failed(format!(
                    "no BiDi endpoint within {}s",
                    LAUNCH_TIMEOUT.as_secs()
                )));
            }
        };

        if let Err(e) = Url::parse(&ws_url) {
            guard.kill().await;
            warn!(ws_url, error = %e, "browser advertised a malformed endpoint");
            return Err(Error::launch_failed(format!("bad endpoint {ws_url}: {e}")));
        }

        info!(ws_url, "browser ready");
        Ok(BrowserHandle {
            ws_url,
            process: Some(guard),
            profile: Some(profile),
        })
    }
}

/// Reads stderr lines until the endpoint banner appears.
async fn scan_for_ws_url(stderr: ChildStderr) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(captures) = WS_URL_BANNER.captures(&line) {
            return Some(captures[1].to_string());
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
