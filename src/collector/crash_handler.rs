// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! The fatal-signal handler.
//!
//! Everything on this path observes async-signal-safety: the agent is
//! reached through an atomic pointer (never a lock), the report is formatted
//! into on-stack buffers, and the only allocation is the owned copy handed
//! to the transport queue, whose push is a short mutex-guarded splice that
//! is never held across faulting code. The clock read (`clock_gettime`) and
//! the final `write`-level socket work happen on the transport thread, not
//! here.

use super::backtrace::write_backtrace_json;
use super::signal_handler_manager::chain_previous_handler;
use super::{write_escaped, FixedBuf};
use crate::report::SignalNames;
use crate::shared::constants::{SIGNAL_SEND_GRACE, TIMESTAMP_FORMAT};
use chrono::Utc;
use libc::{c_void, siginfo_t};
use std::fmt::Write;
use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

/// Frames between the faulting code and the trace entry point: the trace
/// closure, this module's writer, the handler and the kernel trampoline.
const SIGNAL_HANDLER_SKIP: usize = 4;

const STACK_BUF_SIZE: usize = 32768;
const REPORT_BUF_SIZE: usize = 40960;

pub(crate) extern "C" fn handle_crash_signal(
    signum: i32,
    sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    // One crash report per process. A fault while we are already handling
    // one (our own handler crashing, or a second thread dying) terminates
    // with the conventional signal status instead of recursing.
    static HANDLING: AtomicBool = AtomicBool::new(false);
    if HANDLING.swap(true, SeqCst) {
        unsafe { libc::_exit(128 + signum) };
    }

    let agent = crate::agent::agent_for_signal();
    if !agent.is_null() {
        // Safety: the pointer was published by init and is only retired by
        // shutdown, which the host must not race against crash delivery.
        report_fatal_signal(unsafe { &*agent }, signum, sig_info);
    }

    // Safety: called exactly once, after our own handling is complete.
    unsafe { chain_previous_handler(signum, sig_info, ucontext) };
}

fn report_fatal_signal(agent: &crate::agent::MonitorAgent, signum: i32, sig_info: *mut siginfo_t) {
    let signal = SignalNames::from(signum);
    let fault_addr = if sig_info.is_null() {
        ptr::null_mut()
    } else {
        // Safety: the kernel hands us a valid siginfo for SA_SIGINFO handlers.
        unsafe { (*sig_info).si_addr() }
    };

    // The stack trace is rendered first because the fingerprint hashes its
    // leading bytes and the record carries the fingerprint field earlier.
    let mut stack = FixedBuf::<STACK_BUF_SIZE>::new();
    // Safety: the HANDLING guard above excludes concurrent unsynchronized
    // traces.
    unsafe { write_backtrace_json(&mut stack, SIGNAL_HANDLER_SKIP) };
    let stack_json = if stack.truncated() { "[]" } else { stack.as_str() };

    let mut report = FixedBuf::<REPORT_BUF_SIZE>::new();
    write_signal_report(
        &mut report,
        agent.agent_id(),
        agent.environment(),
        signal,
        signum,
        fault_addr,
        stack_json,
    );

    if !report.truncated() {
        agent
            .transport()
            .enqueue_from_signal(report.as_str().to_owned());
        // Give the transport worker a window to flush before the default
        // disposition kills the process. Delivery is best-effort.
        std::thread::sleep(SIGNAL_SEND_GRACE);
    }
}

/// Formats the complete `exception` envelope for a fatal signal into `w`.
/// Factored out of the handler so the record shape is testable without
/// delivering a signal.
fn write_signal_report<W: Write>(
    w: &mut W,
    agent_id: &str,
    environment: &str,
    signal: SignalNames,
    signum: i32,
    fault_addr: *mut c_void,
    stack_json: &str,
) {
    let fingerprint = crate::report::fingerprint_value(signal.mnemonic(), stack_json);
    let now = Utc::now();

    let _ = w.write_str("{\"type\":\"exception\",\"payload\":{\"id\":\"");
    write_escaped(w, agent_id);
    let _ = w.write_str("-signal\",\"exception_type\":\"");
    let _ = w.write_str(signal.mnemonic());
    let _ = w.write_str("\",\"message\":\"");
    let _ = w.write_str(signal.description());
    let _ = write!(w, " (address: {fault_addr:p})");
    let _ = write!(w, "\",\"fingerprint\":\"{fingerprint:016x}\",\"stack_trace\":");
    let _ = w.write_str(stack_json);
    let _ = write!(
        w,
        ",\"local_variables\":{{}},\"context\":{{\"signal\":{signum},\"fatal\":true}},\"captured_at\":\""
    );
    let _ = write!(w, "{}", now.format(TIMESTAMP_FORMAT));
    let _ = w.write_str("\",\"agent_id\":\"");
    write_escaped(w, agent_id);
    let _ = w.write_str("\",\"environment\":\"");
    write_escaped(w, environment);
    let _ = write!(w, "\"}},\"timestamp\":{}}}", now.timestamp_millis());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_report_shape() {
        let mut buf = FixedBuf::<8192>::new();
        let stack = r#"[{"method_name":"main","is_native":true,"source_available":false}]"#;
        write_signal_report(
            &mut buf,
            "agent-64f00-deadbeef",
            "production",
            SignalNames::SIGSEGV,
            libc::SIGSEGV,
            0x1000 as *mut c_void,
            stack,
        );
        assert!(!buf.truncated());

        let value: serde_json::Value = serde_json::from_str(buf.as_str()).unwrap();
        assert_eq!(value["type"], "exception");
        let payload = &value["payload"];
        assert_eq!(payload["id"], "agent-64f00-deadbeef-signal");
        assert_eq!(payload["exception_type"], "SIGSEGV");
        let message = payload["message"].as_str().unwrap();
        assert!(message.starts_with("Segmentation fault (address: 0x1000"));
        assert_eq!(payload["fingerprint"].as_str().unwrap().len(), 16);
        assert_eq!(payload["stack_trace"][0]["method_name"], "main");
        assert_eq!(payload["local_variables"], serde_json::json!({}));
        assert_eq!(payload["context"]["signal"], libc::SIGSEGV);
        assert_eq!(payload["context"]["fatal"], true);
        assert_eq!(payload["environment"], "production");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_signal_report_fingerprint_matches_builder() {
        let stack = r#"[{"method_name":"f","is_native":true,"source_available":false}]"#;
        let mut buf = FixedBuf::<8192>::new();
        write_signal_report(
            &mut buf,
            "agent-1-1",
            "production",
            SignalNames::SIGABRT,
            libc::SIGABRT,
            std::ptr::null_mut(),
            stack,
        );
        let value: serde_json::Value = serde_json::from_str(buf.as_str()).unwrap();
        assert_eq!(
            value["payload"]["fingerprint"],
            crate::report::fingerprint("SIGABRT", stack).as_str()
        );
    }
}
