// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::FINGERPRINT_STACK_PREFIX;

/// Deduplication digest shared with the backend: djb2 over the exception
/// type label followed by the first 500 bytes of the encoded stack trace.
/// Byte-oriented on purpose so every platform produces the same value for
/// the same inputs.
pub fn fingerprint_value(exception_type: &str, stack_trace_json: &str) -> u64 {
    let mut hash: u64 = 5381;
    for &byte in exception_type.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    for &byte in stack_trace_json
        .as_bytes()
        .iter()
        .take(FINGERPRINT_STACK_PREFIX)
    {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    hash
}

/// [`fingerprint_value`] rendered as the 16-digit lowercase hex string the
/// wire record carries.
pub fn fingerprint(exception_type: &str, stack_trace_json: &str) -> String {
    format!("{:016x}", fingerprint_value(exception_type, stack_trace_json))
}
