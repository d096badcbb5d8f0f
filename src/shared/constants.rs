// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const RUNTIME: &str = "rust";
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_RUST_VERSION");

pub const DEFAULT_BACKEND_URL: &str = "wss://api.aivory.net/monitor/agent";
pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_SAMPLING_RATE: f64 = 1.0;
pub const DEFAULT_MAX_CAPTURE_DEPTH: u32 = 10;
pub const DEFAULT_MAX_STRING_LENGTH: usize = 1000;
pub const DEFAULT_MAX_COLLECTION_SIZE: usize = 100;

/// Environment variables consulted by [`MonitorConfig::from_env`].
///
/// [`MonitorConfig::from_env`]: crate::MonitorConfig::from_env
pub const ENV_API_KEY: &str = "AIVORY_API_KEY";
pub const ENV_BACKEND_URL: &str = "AIVORY_BACKEND_URL";
pub const ENV_ENVIRONMENT: &str = "AIVORY_ENVIRONMENT";
pub const ENV_SAMPLING_RATE: &str = "AIVORY_SAMPLING_RATE";
pub const ENV_DEBUG: &str = "AIVORY_DEBUG";

/// Exception type label for explicit (non-signal) error reports.
pub const ERROR_EXCEPTION_TYPE: &str = "Error";

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Cadence of the worker's service loop while connected. Queue drains and
/// heartbeat-due checks both happen on this tick.
pub const SERVICE_TICK: Duration = Duration::from_millis(100);
pub const MESSAGE_QUEUE_SIZE: usize = 100;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Reconnect delay is `2^min(attempts, BACKOFF_CAP_EXPONENT)` seconds.
pub const BACKOFF_CAP_EXPONENT: u32 = 6;

pub const MAX_STACK_FRAMES: usize = 50;
/// The fingerprint hashes the exception type plus at most this many bytes of
/// the encoded stack trace.
pub const FINGERPRINT_STACK_PREFIX: usize = 500;

/// How long the signal handler lingers after queueing its report so the
/// transport worker gets a chance to flush before the process dies.
pub const SIGNAL_SEND_GRACE: Duration = Duration::from_millis(100);

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub const TRUNCATION_MARKER: &str = "...[truncated]";
pub const UNKNOWN_FUNCTION: &str = "<unknown>";
