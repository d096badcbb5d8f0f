// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use crate::report::{fingerprint, StackFrame};
use crate::shared::constants::{RUNTIME, TIMESTAMP_FORMAT, TRUNCATION_MARKER};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Backend tag for the operating system this agent was built for.
pub fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        _ => "unknown",
    }
}

/// Backend tag for the CPU architecture this agent was built for.
pub fn arch_tag() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "x86",
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => "unknown",
    }
}

/// Process-wide fields stamped into every outbound exception record.
#[derive(Debug, Clone, Copy)]
pub struct ReportScope<'a> {
    pub agent_id: &'a str,
    pub environment: &'a str,
    pub max_string_length: usize,
}

#[derive(Serialize)]
struct RuntimeInfo {
    runtime: &'static str,
    platform: &'static str,
    arch: &'static str,
}

// Field order is the wire contract; serde emits struct fields in declaration
// order.
#[derive(Serialize)]
struct ExceptionPayload<'a> {
    id: &'a str,
    exception_type: &'a str,
    message: &'a str,
    fingerprint: &'a str,
    stack_trace: &'a [StackFrame],
    local_variables: Map<String, Value>,
    context: Map<String, Value>,
    captured_at: String,
    agent_id: &'a str,
    environment: &'a str,
    runtime_info: RuntimeInfo,
}

#[derive(Serialize)]
struct Envelope<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: P,
    timestamp: i64,
}

/// Clamps `s` to at most `max` bytes (on a character boundary) and marks the
/// cut with the truncation suffix.
fn clamp(s: &str, max: usize) -> Cow<'_, str> {
    if s.len() <= max {
        return Cow::Borrowed(s);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}{}", &s[..end], TRUNCATION_MARKER))
}

/// Builds one encoded `exception` wire record for an explicit error report.
///
/// The stack trace is serialized once up front so the fingerprint hashes the
/// exact bytes that ship. `local_variables` is always the empty object; this
/// runtime does not capture locals.
pub fn build_exception_record(
    scope: &ReportScope<'_>,
    id: &str,
    exception_type: &str,
    message: &str,
    mut frames: Vec<StackFrame>,
    context: Map<String, Value>,
) -> anyhow::Result<String> {
    for frame in &mut frames {
        if frame.method_name.len() > scope.max_string_length {
            frame.method_name = clamp(&frame.method_name, scope.max_string_length).into_owned();
        }
        if let Some(path) = &frame.file_path {
            if path.len() > scope.max_string_length {
                frame.file_path = Some(clamp(path, scope.max_string_length).into_owned());
            }
        }
    }

    let stack_trace_json = serde_json::to_string(&frames)?;
    let fingerprint = fingerprint(exception_type, &stack_trace_json);
    let exception_type = clamp(exception_type, scope.max_string_length);
    let message = clamp(message, scope.max_string_length);
    let now = Utc::now();

    let record = Envelope {
        kind: "exception",
        payload: ExceptionPayload {
            id,
            exception_type: exception_type.as_ref(),
            message: message.as_ref(),
            fingerprint: &fingerprint,
            stack_trace: &frames,
            local_variables: Map::new(),
            context,
            captured_at: now.format(TIMESTAMP_FORMAT).to_string(),
            agent_id: scope.agent_id,
            environment: scope.environment,
            runtime_info: RuntimeInfo {
                runtime: RUNTIME,
                platform: platform_tag(),
                arch: arch_tag(),
            },
        },
        timestamp: now.timestamp_millis(),
    };
    Ok(serde_json::to_string(&record)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ReportScope<'static> {
        ReportScope {
            agent_id: "agent-64f00-deadbeef",
            environment: "production",
            max_string_length: 1000,
        }
    }

    fn one_frame() -> Vec<StackFrame> {
        vec![StackFrame {
            method_name: "app::run".to_string(),
            file_path: Some("src/main.rs".to_string()),
            is_native: false,
            source_available: false,
        }]
    }

    #[test]
    fn test_record_shape() {
        let record = build_exception_record(
            &scope(),
            "agent-64f00-deadbeef",
            "Error",
            "boom",
            one_frame(),
            Map::new(),
        )
        .unwrap();

        let value: Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["type"], "exception");
        assert!(value["timestamp"].is_i64());

        let payload = &value["payload"];
        assert_eq!(payload["exception_type"], "Error");
        assert_eq!(payload["message"], "boom");
        assert_eq!(payload["fingerprint"].as_str().unwrap().len(), 16);
        assert_eq!(payload["stack_trace"][0]["method_name"], "app::run");
        assert_eq!(payload["local_variables"], serde_json::json!({}));
        assert_eq!(payload["agent_id"], "agent-64f00-deadbeef");
        assert_eq!(payload["runtime_info"]["runtime"], "rust");
        // Second-resolution UTC timestamp: 2026-01-02T03:04:05Z
        let captured_at = payload["captured_at"].as_str().unwrap();
        assert_eq!(captured_at.len(), 20);
        assert!(captured_at.ends_with('Z'));
    }

    #[test]
    fn test_envelope_field_order() {
        let record = build_exception_record(
            &scope(),
            "agent-64f00-deadbeef",
            "Error",
            "boom",
            vec![],
            Map::new(),
        )
        .unwrap();
        assert!(record.starts_with(r#"{"type":"exception","payload":{"id":"#));
        assert!(record.contains(r#""local_variables":{},"#));
    }

    #[test]
    fn test_message_truncation_marker() {
        let scope = ReportScope {
            max_string_length: 10,
            ..scope()
        };
        let record = build_exception_record(
            &scope,
            "agent-64f00-deadbeef",
            "Error",
            &"x".repeat(64),
            vec![],
            Map::new(),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&record).unwrap();
        let message = value["payload"]["message"].as_str().unwrap();
        assert_eq!(message, format!("{}{}", "x".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn test_clamp_respects_char_boundaries() {
        // 'é' is two bytes; a cut at byte 3 would split it.
        let clamped = clamp("ééé", 3);
        assert_eq!(clamped, format!("é{TRUNCATION_MARKER}"));
        assert_eq!(clamp("short", 1000), "short");
    }

    #[test]
    fn test_escape_round_trip() {
        let original = "line1\nline2\t\"quoted\" back\\slash\rend";
        let record = build_exception_record(
            &scope(),
            "agent-64f00-deadbeef",
            "Error",
            original,
            vec![],
            Map::new(),
        )
        .unwrap();
        assert!(record.contains(r#"line1\nline2\t\"quoted\" back\\slash\rend"#));
        let value: Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["payload"]["message"], original);
    }

    #[test]
    fn test_context_rides_through() {
        let mut context = Map::new();
        context.insert("file".to_string(), Value::from("f.c"));
        context.insert("line".to_string(), Value::from(42));
        let record = build_exception_record(
            &scope(),
            "agent-64f00-deadbeef",
            "Error",
            "boom",
            vec![],
            context,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["payload"]["context"]["file"], "f.c");
        assert_eq!(value["payload"]["context"]["line"], 42);
    }
}
