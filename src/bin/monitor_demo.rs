// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! Demo host program: initializes the agent from the environment, reports a
//! handful of errors, and optionally dies for real so the signal path can be
//! observed end to end.
//!
//! ```sh
//! AIVORY_API_KEY=test-key-123 \
//! AIVORY_BACKEND_URL=ws://localhost:19999/api/monitor/agent/v1 \
//! AIVORY_DEBUG=true cargo run --bin monitor-demo [crash|abort]
//! ```

use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = aivory_monitor::MonitorConfig::from_env();
    if config.api_key.is_empty() {
        config.api_key = "test-key-123".to_string();
    }
    if std::env::var(aivory_monitor::shared::constants::ENV_ENVIRONMENT).is_err() {
        config.environment = "development".to_string();
    }
    aivory_monitor::init(config)?;

    aivory_monitor::set_user(Some("test-user-001"), Some("tester@example.com"), Some("tester"));
    aivory_monitor::set_context(Some(r#"{"component":"demo"}"#));

    println!("Waiting for agent to connect...");
    std::thread::sleep(Duration::from_secs(3));

    println!("--- Test 1: manual error ---");
    aivory_monitor::capture_error!("Manual test error");
    std::thread::sleep(Duration::from_secs(3));

    println!("--- Test 2: simulated segmentation fault ---");
    aivory_monitor::report_error("SIGSEGV", "Simulated segmentation fault", None);
    std::thread::sleep(Duration::from_secs(3));

    println!("--- Test 3: simulated abort ---");
    aivory_monitor::report_error(
        "SIGABRT",
        "Simulated abort from assertion failure",
        Some(r#"{"assertion":"count > 0"}"#),
    );
    std::thread::sleep(Duration::from_secs(3));

    match std::env::args().nth(1).as_deref() {
        Some("crash") => {
            println!("--- Dereferencing null to raise SIGSEGV ---");
            unsafe { std::ptr::null_mut::<u32>().write(42) };
        }
        Some("abort") => {
            println!("--- Calling abort to raise SIGABRT ---");
            std::process::abort();
        }
        _ => {}
    }

    println!("Test complete; shutting down.");
    std::thread::sleep(Duration::from_secs(2));
    aivory_monitor::shutdown();
    Ok(())
}
