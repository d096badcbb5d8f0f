// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! In-process crash and error reporting agent.
//!
//! The host initializes the agent once with credentials and environment
//! metadata; afterwards the agent captures fatal signals, accepts explicit
//! error reports, and streams `exception` records to the AIVory backend
//! over a reconnecting WebSocket connection.
//!
//! ```no_run
//! let mut config = aivory_monitor::MonitorConfig::from_env();
//! config.api_key = "your-api-key".to_string();
//! config.environment = "production".to_string();
//!
//! aivory_monitor::init(config)?;
//!
//! // Fatal signals (SIGSEGV, SIGABRT, ...) are captured automatically.
//! // Explicit errors are reported from the call site:
//! aivory_monitor::capture_error!("payment reconciliation failed");
//!
//! aivory_monitor::shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod collector;
pub mod report;
pub mod shared;
pub mod transport;

pub use agent::{
    capture_error, capture_error_with_context, clear_user, current, init, is_initialized,
    report_error, set_context, set_user, shutdown, MonitorAgent,
};
pub use report::{fingerprint, SignalNames, StackFrame};
pub use shared::configuration::MonitorConfig;
pub use transport::{BackendUrl, ConnectionState};

/// Captures an explicit error at the call site, filling in `file!()` and
/// `line!()`. An optional second argument carries a JSON-object context.
#[macro_export]
macro_rules! capture_error {
    ($msg:expr) => {
        $crate::capture_error($msg, file!(), line!())
    };
    ($msg:expr, $ctx:expr) => {
        $crate::capture_error_with_context($msg, file!(), line!(), Some($ctx))
    };
}
