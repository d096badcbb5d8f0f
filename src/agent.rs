// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! The process-wide agent: one instance behind an explicit init/shutdown
//! lifecycle. The signal handler reaches it through a plain atomic pointer
//! so no lock is ever taken in signal context.

use crate::collector::signal_handler_manager::{
    install_signal_handlers, uninstall_signal_handlers,
};
use crate::report::{build_exception_record, ReportScope};
use crate::shared::configuration::MonitorConfig;
use crate::shared::constants::{AGENT_VERSION, ERROR_EXCEPTION_TYPE};
use crate::transport::{frames, BackendUrl, Transport, TransportOptions};
use chrono::Utc;
use serde_json::{Map, Value};
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Mutex;
use tracing::{info, warn};

/// Frames between the reporting call site and the trace entry point.
const ERROR_CAPTURE_SKIP: usize = 3;

pub struct MonitorAgent {
    config: MonitorConfig,
    agent_id: String,
    hostname: String,
    custom_context: Mutex<Option<Map<String, Value>>>,
    user: Mutex<Option<Map<String, Value>>>,
    transport: Transport,
}

impl MonitorAgent {
    /// The unique agent identifier minted at init.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The hostname captured at init.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn environment(&self) -> &str {
        &self.config.environment
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }
}

// The one agent per process. Always either null or a pointer produced by
// `Box::into_raw` in `init`; `shutdown` retires it.
static AGENT: AtomicPtr<MonitorAgent> = AtomicPtr::new(ptr::null_mut());

/// Raw accessor for signal context: an atomic load, nothing else.
pub(crate) fn agent_for_signal() -> *mut MonitorAgent {
    AGENT.load(SeqCst)
}

/// The live agent, or `None` before init and after shutdown.
///
/// The reference stays valid until [`shutdown`] runs; as with the capture
/// entry points, callers own the ordering between uses of the returned
/// reference and shutdown.
pub fn current() -> Option<&'static MonitorAgent> {
    let agent_ptr = AGENT.load(SeqCst);
    if agent_ptr.is_null() {
        None
    } else {
        // Safety: published by init; the host must order shutdown after any
        // use of the returned reference.
        Some(unsafe { &*agent_ptr })
    }
}

/// Initializes the agent: validates the configuration, establishes the
/// process identity, starts the transport worker and (when enabled)
/// installs the fatal-signal handlers.
///
/// Fails synchronously on configuration errors (missing API key, malformed
/// URL) without leaving resources behind, and on double initialization.
pub fn init(config: MonitorConfig) -> anyhow::Result<()> {
    config.validate()?;
    let url = BackendUrl::parse(&config.backend_url)?;

    let agent_id = generate_agent_id();
    let hostname = hostname();
    let register_frame =
        frames::register_frame(&config.api_key, &agent_id, &hostname, &config.environment)?;

    let mut options = TransportOptions::new(url, register_frame);
    options.debug = config.debug;
    let transport = Transport::spawn(options)?;

    let capture_signals = config.capture_signals;
    let environment = config.environment.clone();
    let agent = Box::new(MonitorAgent {
        config,
        agent_id,
        hostname,
        custom_context: Mutex::new(None),
        user: Mutex::new(None),
        transport,
    });

    let agent_ptr = Box::into_raw(agent);
    if AGENT
        .compare_exchange(ptr::null_mut(), agent_ptr, SeqCst, SeqCst)
        .is_err()
    {
        // Lost the race; tear down everything we built.
        // Safety: the pointer comes from Box::into_raw above and was never
        // published.
        let mut agent = unsafe { Box::from_raw(agent_ptr) };
        agent.transport.shutdown();
        anyhow::bail!("agent already initialized");
    }

    if capture_signals {
        if let Err(e) = install_signal_handlers() {
            shutdown();
            return Err(e);
        }
    }

    info!(version = AGENT_VERSION, environment = %environment, "agent initialized");
    Ok(())
}

/// Shuts the agent down: restores signal handlers, stops and joins the
/// transport worker, and frees the identity. Idempotent, and a no-op when
/// the agent was never initialized.
///
/// Must not race in-flight capture calls on other threads; callers own that
/// ordering, as with the rest of the init/shutdown lifecycle.
pub fn shutdown() {
    let agent_ptr = AGENT.swap(ptr::null_mut(), SeqCst);
    if agent_ptr.is_null() {
        return;
    }
    info!("shutting down agent");
    if let Err(e) = uninstall_signal_handlers() {
        warn!(error = %e, "failed to restore previous signal handlers");
    }
    // Safety: non-null means it came from Box::into_raw in init, and the
    // swap above made this the only owner.
    let mut agent = unsafe { Box::from_raw(agent_ptr) };
    agent.transport.shutdown();
}

pub fn is_initialized() -> bool {
    !AGENT.load(SeqCst).is_null()
}

/// Reports an explicit, non-fatal error from the given source site.
pub fn capture_error(message: &str, file: &str, line: u32) {
    capture_error_with_context(message, file, line, None)
}

/// Like [`capture_error`], with an additional JSON-object context merged
/// into the report.
pub fn capture_error_with_context(
    message: &str,
    file: &str,
    line: u32,
    context_json: Option<&str>,
) {
    report(ERROR_EXCEPTION_TYPE, message, Some((file, line)), context_json)
}

/// Reports an error under a caller-chosen exception type label, for hosts
/// that classify their own failures (e.g. simulated signals in test rigs).
pub fn report_error(error_type: &str, message: &str, context_json: Option<&str>) {
    report(error_type, message, None, context_json)
}

fn report(
    exception_type: &str,
    message: &str,
    site: Option<(&str, u32)>,
    context_json: Option<&str>,
) {
    let Some(agent) = current() else {
        return;
    };

    // Sampling happens exactly once, before any encoding work.
    if !should_sample(agent.config.sampling_rate) {
        return;
    }

    let frames = crate::collector::backtrace::capture(ERROR_CAPTURE_SKIP);
    let context = assemble_context(agent, site, context_json);
    let scope = ReportScope {
        agent_id: &agent.agent_id,
        environment: &agent.config.environment,
        max_string_length: agent.config.max_string_length,
    };
    match build_exception_record(
        &scope,
        &agent.agent_id,
        exception_type,
        message,
        frames,
        context,
    ) {
        Ok(record) => agent.transport.send_exception(record),
        Err(e) => warn!(error = %e, "failed to encode exception report"),
    }
}

fn assemble_context(
    agent: &MonitorAgent,
    site: Option<(&str, u32)>,
    context_json: Option<&str>,
) -> Map<String, Value> {
    let mut context = Map::new();
    if let Some(process_context) = lock_clone(&agent.custom_context) {
        context.extend(process_context);
    }
    if let Some(json) = context_json {
        match parse_context_object(json) {
            Some(fields) => context.extend(fields),
            None => warn!("capture context is not a JSON object; dropping it"),
        }
    }
    if let Some((file, line)) = site {
        context.insert("file".to_string(), Value::from(file));
        context.insert("line".to_string(), Value::from(line));
    }
    if let Some(user) = lock_clone(&agent.user) {
        context.insert("user".to_string(), Value::Object(user));
    }
    context
}

fn lock_clone(slot: &Mutex<Option<Map<String, Value>>>) -> Option<Map<String, Value>> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn parse_context_object(json: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}

/// Sets (or clears, with `None`) the process-wide context merged into every
/// subsequent report. The string must encode a JSON object.
pub fn set_context(context_json: Option<&str>) {
    let Some(agent) = current() else {
        return;
    };
    let parsed = match context_json {
        Some(json) => match parse_context_object(json) {
            Some(fields) => Some(fields),
            None => {
                warn!("set_context called with something other than a JSON object; clearing");
                None
            }
        },
        None => None,
    };
    *agent.custom_context.lock().unwrap_or_else(|e| e.into_inner()) = parsed;
}

/// Sets the user descriptor attached to subsequent reports. Passing three
/// `None`s clears it.
pub fn set_user(user_id: Option<&str>, email: Option<&str>, username: Option<&str>) {
    let Some(agent) = current() else {
        return;
    };
    *agent.user.lock().unwrap_or_else(|e| e.into_inner()) =
        build_user_object(user_id, email, username);
}

pub fn clear_user() {
    set_user(None, None, None)
}

fn build_user_object(
    user_id: Option<&str>,
    email: Option<&str>,
    username: Option<&str>,
) -> Option<Map<String, Value>> {
    if user_id.is_none() && email.is_none() && username.is_none() {
        return None;
    }
    let mut user = Map::new();
    if let Some(user_id) = user_id {
        user.insert("id".to_string(), Value::from(user_id));
    }
    if let Some(email) = email {
        user.insert("email".to_string(), Value::from(email));
    }
    if let Some(username) = username {
        user.insert("username".to_string(), Value::from(username));
    }
    Some(user)
}

/// Uniform sampling decision: rates at or above 1.0 always accept, at or
/// below 0.0 always reject.
pub(crate) fn should_sample(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    rand::random::<f64>() < rate
}

/// `agent-<seconds-hex>-<entropy-hex>`: time-mixed so ids sort roughly by
/// start time, random so concurrent starts stay distinct.
fn generate_agent_id() -> String {
    let now = Utc::now().timestamp();
    let entropy: u32 = rand::random();
    format!("agent-{now:x}-{entropy:08x}")
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_sample_boundaries() {
        assert!(should_sample(1.0));
        assert!(should_sample(1.5));
        assert!(!should_sample(0.0));
        assert!(!should_sample(-0.5));
    }

    #[test]
    fn test_should_sample_converges() {
        let trials = 20_000;
        let accepted = (0..trials).filter(|_| should_sample(0.5)).count();
        let ratio = accepted as f64 / trials as f64;
        assert!((0.45..=0.55).contains(&ratio), "observed ratio {ratio}");
    }

    #[test]
    fn test_agent_id_form() {
        let id = generate_agent_id();
        let mut parts = id.splitn(3, '-');
        assert_eq!(parts.next(), Some("agent"));
        let seconds = parts.next().unwrap();
        assert!(i64::from_str_radix(seconds, 16).is_ok());
        let entropy = parts.next().unwrap();
        assert_eq!(entropy.len(), 8);
        assert!(u32::from_str_radix(entropy, 16).is_ok());
    }

    #[test]
    fn test_hostname_never_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn test_build_user_object() {
        assert_eq!(build_user_object(None, None, None), None);
        let user = build_user_object(Some("u1"), None, Some("tester")).unwrap();
        assert_eq!(user["id"], "u1");
        assert_eq!(user["username"], "tester");
        assert!(!user.contains_key("email"));
    }

    #[test]
    fn test_parse_context_object() {
        assert!(parse_context_object(r#"{"k":"v"}"#).is_some());
        assert!(parse_context_object(r#"["not","an","object"]"#).is_none());
        assert!(parse_context_object("not json").is_none());
    }

    #[test]
    fn test_capture_without_init_is_a_no_op() {
        // Must not panic or touch anything when the agent is absent.
        assert!(current().is_none());
        capture_error("boom", "f.rs", 1);
        report_error("TestError", "boom", None);
        set_context(Some(r#"{"k":"v"}"#));
        clear_user();
    }
}
