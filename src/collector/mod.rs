// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! In-process crash capture: stack walking, fatal-signal handlers and the
//! signal-context report writer.

pub mod backtrace;
pub(crate) mod crash_handler;
pub mod signal_handler_manager;

use std::fmt;

/// A `fmt::Write` sink over a fixed, caller-provided buffer. Overflow is
/// silent truncation (recorded in a flag), never an error, so `write!`
/// chains in the signal handler cannot abort halfway through a record.
/// Truncation always lands on a UTF-8 boundary.
pub(crate) struct FixedBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> FixedBuf<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        // Writes only ever append whole characters.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> fmt::Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let space = N - self.len;
        if s.len() <= space {
            self.buf[self.len..self.len + s.len()].copy_from_slice(s.as_bytes());
            self.len += s.len();
            return Ok(());
        }
        let mut take = space;
        while take > 0 && !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        self.truncated = true;
        Ok(())
    }
}

/// Writes `s` with the wire escape table applied: backslash, double quote,
/// newline, carriage return and tab become two-character escapes; other
/// control bytes are emitted as `\u` sequences so the record stays valid.
pub(crate) fn write_escaped<W: fmt::Write>(w: &mut W, s: &str) {
    for c in s.chars() {
        let _ = match c {
            '"' => w.write_str("\\\""),
            '\\' => w.write_str("\\\\"),
            '\n' => w.write_str("\\n"),
            '\r' => w.write_str("\\r"),
            '\t' => w.write_str("\\t"),
            c if (c as u32) < 0x20 => write!(w, "\\u{:04x}", c as u32),
            c => w.write_char(c),
        };
    }
}
