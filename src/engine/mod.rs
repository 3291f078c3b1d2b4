//! Extension command engine.
//!
//! Implements `vibium:find`, `vibium:click`, and `vibium:type` by composing
//! BiDi primitives: `browsingContext.getTree` to resolve the default
//! context, a polled `script.callFunction` for element discovery,
//! `input.performActions` for pointer/keyboard input, and listener queues
//! for navigation progress.
//!
//! # Shared prologue
//!
//! Every command starts the same way:
//!
//! 1. Resolve one deadline from the `timeout` param (default 30 s). Every
//!    nested wait below consumes remaining time against this deadline.
//! 2. Resolve the browsing context: take the param, or the first top-level
//!    context from `getTree`.
//! 3. Poll for the element every 100 ms until the probe script returns a
//!    description or the deadline expires.
//!
//! # Command state machine
//!
//! ```text
//! resolving-context ─► polling-element ─► performing-action ─► waiting-nav* ─► done
//!                                                │                  │
//!                                                └── error ◄────────┴── timeout
//! ```
//!
//! Listeners registered for the wait stages are removed on every exit arc.

// ============================================================================
// Imports
// ============================================================================

use std::cmp;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::command::{
    self, BrowserCommand, CallFunctionParams, PerformActionsParams, ScriptArgument, ScriptTarget,
    SourceActions,
};
use crate::protocol::extension::{
    ClickParams, DEFAULT_TIMEOUT_MS, ElementInfo, FindParams, TypeParams, WaitBehavior,
};
use crate::protocol::frame;
use crate::session::Session;
use crate::session::events::EventListener;

// ============================================================================
// Constants
// ============================================================================

/// Interval between element probes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Probe script evaluated in the page.
///
/// Returns a JSON string describing the first match, or `null` when the
/// selector matches nothing.
const ELEMENT_PROBE: &str = r#"(selector) => {
  const el = document.querySelector(selector);
  if (!el) return null;
  const r = el.getBoundingClientRect();
  return JSON.stringify({
    tag: el.tagName.toLowerCase(),
    text: (el.textContent||'').trim().substring(0,100),
    box: { x: r.x, y: r.y, width: r.width, height: r.height }
  });
}"#;

// ============================================================================
// Prologue
// ============================================================================

/// Everything the shared prologue resolves.
struct Prologue {
    /// Browsing context the command acts in.
    context: String,
    /// The discovered element.
    info: ElementInfo,
    /// Single deadline for the whole command.
    deadline: Instant,
    /// Original timeout, for error messages.
    timeout_ms: u64,
}

/// Runs the shared prologue: deadline, context, element.
async fn prologue(
    session: &Session,
    selector: &str,
    context: Option<String>,
    timeout: Option<u64>,
) -> Result<Prologue> {
    let timeout_ms = timeout.unwrap_or(DEFAULT_TIMEOUT_MS);
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let context = match context {
        Some(context) => context,
        None => resolve_default_context(session).await?,
    };

    let info = poll_element(session, &context, selector, deadline, timeout_ms).await?;

    Ok(Prologue {
        context,
        info,
        deadline,
        timeout_ms,
    })
}

/// Resolves the first top-level browsing context via `getTree`.
async fn resolve_default_context(session: &Session) -> Result<String> {
    let reply = session.send_internal(BrowserCommand::GetTree {}).await?;
    let result = frame::into_result(reply)?;
    first_context(&result).ok_or(Error::NoContext)
}

/// Extracts the first top-level context id from a `getTree` result.
fn first_context(result: &Value) -> Option<String> {
    result
        .get("contexts")
        .and_then(Value::as_array)
        .and_then(|contexts| contexts.first())
        .and_then(|context| context.get("context"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Polls for the element until found or the deadline expires.
///
/// Only the deadline terminates the loop; an error reply or unparseable
/// probe result just means "not yet".
async fn poll_element(
    session: &Session,
    context: &str,
    selector: &str,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<ElementInfo> {
    loop {
        if Instant::now() >= deadline {
            debug!(selector, timeout_ms, "element polling deadline expired");
            return Err(Error::element_not_found(selector, timeout_ms));
        }

        if let Some(info) = probe_element(session, context, selector).await? {
            trace!(selector, tag = %info.tag, "element found");
            return Ok(info);
        }

        let now = Instant::now();
        tokio::time::sleep_until(cmp::min(now + POLL_INTERVAL, deadline)).await;
    }
}

/// Runs the probe script once.
///
/// Returns `Ok(None)` for "not yet": element absent, script error, or a
/// result that does not parse. Transport and session failures propagate.
async fn probe_element(
    session: &Session,
    context: &str,
    selector: &str,
) -> Result<Option<ElementInfo>> {
    let command = BrowserCommand::CallFunction(CallFunctionParams {
        function_declaration: ELEMENT_PROBE.to_string(),
        target: ScriptTarget {
            context: context.to_string(),
        },
        arguments: vec![ScriptArgument::string(selector)],
        await_promise: false,
        result_ownership: "root".to_string(),
    });

    let reply = session.send_internal(command).await?;
    Ok(parse_probe_reply(&reply))
}

/// Extracts an element description from a raw `script.callFunction` reply.
fn parse_probe_reply(reply: &Value) -> Option<ElementInfo> {
    let payload = reply
        .get("result")?
        .get("result")?
        .get("value")?
        .as_str()?;
    serde_json::from_str(payload).ok()
}

// ============================================================================
// find
// ============================================================================

/// Implements `vibium:find`: run the prologue, describe the element.
///
/// # Errors
///
/// - [`Error::NoContext`] if no browsing context exists
/// - [`Error::ElementNotFound`] when the deadline expires while polling
pub async fn find(session: &Session, params: FindParams) -> Result<ElementInfo> {
    let resolved = prologue(session, &params.selector, params.context, params.timeout).await?;
    Ok(resolved.info)
}

// ============================================================================
// click
// ============================================================================

/// Implements `vibium:click`: prologue, center-point click, navigation wait.
///
/// Listeners for the wait policy are registered *before* the pointer action
/// so a fast navigation cannot slip past, and removed on every exit arc.
///
/// # Errors
///
/// Prologue errors, browser errors from `input.performActions`, and
/// [`Error::NavigationTimeout`] naming the stage still pending when the
/// deadline expired.
pub async fn click(session: &Session, params: ClickParams) -> Result<()> {
    let wait = params.wait_behavior.unwrap_or(WaitBehavior::WaitForLoad);
    let resolved = prologue(session, &params.selector, params.context, params.timeout).await?;
    let (x, y) = resolved.info.bounds.center();

    debug!(selector = %params.selector, x, y, ?wait, "clicking element");

    let mut waiters = NavigationWaiters::register(session, wait);
    let outcome = click_and_wait(session, &resolved, x, y, &mut waiters).await;
    waiters.clear(session);
    outcome
}

/// The fallible middle of `click`, so the caller can always clear waiters.
async fn click_and_wait(
    session: &Session,
    resolved: &Prologue,
    x: i64,
    y: i64,
    waiters: &mut NavigationWaiters,
) -> Result<()> {
    perform(session, &resolved.context, command::pointer_click(x, y)).await?;
    waiters
        .wait_stages(session, resolved.deadline, resolved.timeout_ms)
        .await
}

// ============================================================================
// type
// ============================================================================

/// Implements `vibium:type`: prologue, focus click, per-scalar key actions.
///
/// The default wait policy is `none` (typing rarely navigates), but any
/// policy behaves exactly as in [`click`].
///
/// # Errors
///
/// As [`click`].
pub async fn type_text(session: &Session, params: TypeParams) -> Result<()> {
    let wait = params.wait_behavior.unwrap_or(WaitBehavior::None);
    let resolved = prologue(session, &params.selector, params.context, params.timeout).await?;
    let (x, y) = resolved.info.bounds.center();

    debug!(
        selector = %params.selector,
        chars = params.text.chars().count(),
        ?wait,
        "typing into element"
    );

    let mut waiters = NavigationWaiters::register(session, wait);
    let outcome = type_and_wait(session, &resolved, x, y, &params.text, &mut waiters).await;
    waiters.clear(session);
    outcome
}

/// The fallible middle of `type_text`.
async fn type_and_wait(
    session: &Session,
    resolved: &Prologue,
    x: i64,
    y: i64,
    text: &str,
    waiters: &mut NavigationWaiters,
) -> Result<()> {
    // Focus first: same pointer sequence as a click.
    perform(session, &resolved.context, command::pointer_click(x, y)).await?;
    perform(session, &resolved.context, command::key_type(text)).await?;
    waiters
        .wait_stages(session, resolved.deadline, resolved.timeout_ms)
        .await
}

// ============================================================================
// Actions
// ============================================================================

/// Issues one `input.performActions` with a single source.
async fn perform(session: &Session, context: &str, source: SourceActions) -> Result<()> {
    let command = BrowserCommand::PerformActions(PerformActionsParams {
        context: context.to_string(),
        actions: vec![source],
    });

    let reply = session.send_internal(command).await?;
    frame::into_result(reply)?;
    Ok(())
}

// ============================================================================
// Navigation Waits
// ============================================================================

/// Listener queues for a command's navigation wait stages.
///
/// Registered before the input action, drained stage by stage afterwards,
/// and cleared on every exit arc: success, timeout, or error.
struct NavigationWaiters {
    /// Stage 1: `browsingContext.navigationStarted`.
    started: Option<EventListener>,
    /// Stage 2: `domContentLoaded` or `load`, per policy.
    finished: Option<EventListener>,
}

impl NavigationWaiters {
    /// Registers listeners per the wait policy.
    fn register(session: &Session, behavior: WaitBehavior) -> Self {
        let registry = session.listeners();
        let (started, finished) = match behavior {
            WaitBehavior::None => (None, None),
            WaitBehavior::WaitForNavigationStarted => {
                (Some(registry.add("browsingContext.navigationStarted")), None)
            }
            WaitBehavior::WaitForDomContentLoaded => (
                Some(registry.add("browsingContext.navigationStarted")),
                Some(registry.add("browsingContext.domContentLoaded")),
            ),
            WaitBehavior::WaitForLoad => (
                Some(registry.add("browsingContext.navigationStarted")),
                Some(registry.add("browsingContext.load")),
            ),
        };

        Self { started, finished }
    }

    /// Waits each enabled stage out against the remaining deadline.
    async fn wait_stages(
        &mut self,
        session: &Session,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Result<()> {
        if let Some(listener) = self.started.as_mut() {
            wait_stage(session, listener, deadline, timeout_ms).await?;
        }
        if let Some(listener) = self.finished.as_mut() {
            wait_stage(session, listener, deadline, timeout_ms).await?;
        }
        Ok(())
    }

    /// Removes every registered listener from the session registry.
    fn clear(&mut self, session: &Session) {
        if let Some(listener) = self.started.take() {
            session.listeners().remove(listener);
        }
        if let Some(listener) = self.finished.take() {
            session.listeners().remove(listener);
        }
    }
}

/// Waits for one event with the remaining deadline.
///
/// A stage whose remainder is already non-positive fails immediately with
/// a timeout naming the stage.
async fn wait_stage(
    session: &Session,
    listener: &mut EventListener,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<()> {
    let stage = listener.method().to_string();

    if Instant::now() >= deadline {
        return Err(Error::navigation_timeout(stage, timeout_ms));
    }

    let stop = session.stop_token();
    tokio::select! {
        () = stop.cancelled() => Err(Error::SessionClosed),
        () = tokio::time::sleep_until(deadline) => {
            debug!(stage = %stage, "navigation wait deadline expired");
            Err(Error::navigation_timeout(stage, timeout_ms))
        }
        event = listener.next() => match event {
            Some(_) => {
                trace!(stage = %stage, "navigation stage reached");
                Ok(())
            }
            None => Err(Error::SessionClosed),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
