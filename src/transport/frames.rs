// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use crate::report::{arch_tag, platform_tag};
use crate::shared::constants::{AGENT_VERSION, RUNTIME, RUNTIME_VERSION};
use chrono::Utc;
use serde::Serialize;

// Field order in these structs is the wire contract.

#[derive(Serialize)]
struct RegisterPayload<'a> {
    api_key: &'a str,
    agent_id: &'a str,
    hostname: &'a str,
    environment: &'a str,
    agent_version: &'static str,
    runtime: &'static str,
    runtime_version: &'static str,
    platform: &'static str,
    arch: &'static str,
}

#[derive(Serialize)]
struct HeartbeatPayload {
    timestamp: i64,
}

#[derive(Serialize)]
struct Frame<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: P,
    timestamp: i64,
}

/// First frame on every connection; authenticates the agent.
pub fn register_frame(
    api_key: &str,
    agent_id: &str,
    hostname: &str,
    environment: &str,
) -> anyhow::Result<String> {
    let frame = Frame {
        kind: "register",
        payload: RegisterPayload {
            api_key,
            agent_id,
            hostname,
            environment,
            agent_version: AGENT_VERSION,
            runtime: RUNTIME,
            runtime_version: RUNTIME_VERSION,
            platform: platform_tag(),
            arch: arch_tag(),
        },
        timestamp: Utc::now().timestamp_millis(),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Keep-alive frame; carries only the emission time.
pub fn heartbeat_frame() -> anyhow::Result<String> {
    let now = Utc::now().timestamp_millis();
    let frame = Frame {
        kind: "heartbeat",
        payload: HeartbeatPayload { timestamp: now },
        timestamp: now,
    };
    Ok(serde_json::to_string(&frame)?)
}
