// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// One captured call-stack frame, in the exact field order the backend
/// stores. `source_available` is reserved for runtimes that can serve the
/// referenced source; this agent always reports `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StackFrame {
    pub method_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub is_native: bool,
    pub source_available: bool,
}

impl StackFrame {
    /// A frame for which symbol resolution produced nothing.
    pub fn unknown() -> Self {
        Self {
            method_name: crate::shared::constants::UNKNOWN_FUNCTION.to_string(),
            file_path: None,
            is_native: true,
            source_available: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let frame = StackFrame {
            method_name: "main".to_string(),
            file_path: None,
            is_native: true,
            source_available: false,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"method_name":"main","is_native":true,"source_available":false}"#
        );
    }

    #[test]
    fn test_field_order_matches_wire_contract() {
        let frame = StackFrame {
            method_name: "handle".to_string(),
            file_path: Some("src/server.rs".to_string()),
            is_native: false,
            source_available: false,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"method_name":"handle","file_path":"src/server.rs","is_native":false,"source_available":false}"#
        );
    }
}
