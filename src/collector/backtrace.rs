// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! Call-stack capture for both execution contexts.
//!
//! The normal path resolves symbol names and file paths into structured
//! frames. The signal path walks the same stack with the
//! unsynchronized primitives and formats frames straight into a
//! caller-provided buffer, so the capturer itself performs no heap
//! allocation while the process is dying.

use crate::collector::{write_escaped, FixedBuf};
use crate::report::StackFrame;
use crate::shared::constants::{MAX_STACK_FRAMES, UNKNOWN_FUNCTION};
use std::fmt::{self, Write};

/// A raw symbol description of the form `module(function+offset) [address]`,
/// decomposed by scanning for the `(`, `+` and `)` markers. Descriptions
/// without the parenthesized section yield the whole input as the function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub function: String,
    pub module: Option<String>,
    pub offset: Option<u64>,
}

pub fn parse_raw_symbol(symbol: &str) -> ParsedSymbol {
    let Some(lparen) = symbol.find('(') else {
        return ParsedSymbol {
            function: symbol.to_string(),
            module: None,
            offset: None,
        };
    };
    let Some(rparen) = symbol[lparen..].find(')').map(|i| lparen + i) else {
        return ParsedSymbol {
            function: symbol.to_string(),
            module: None,
            offset: None,
        };
    };

    let module = &symbol[..lparen];
    let inner = &symbol[lparen + 1..rparen];
    let (function, offset) = match inner.find('+') {
        Some(plus) => (&inner[..plus], parse_offset(&inner[plus + 1..])),
        None => (inner, None),
    };

    ParsedSymbol {
        function: if function.is_empty() {
            UNKNOWN_FUNCTION.to_string()
        } else {
            function.to_string()
        },
        module: (!module.is_empty()).then(|| module.to_string()),
        offset,
    }
}

fn parse_offset(s: &str) -> Option<u64> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Captures the current call stack, omitting the `skip` frames nearest the
/// top. At most [`MAX_STACK_FRAMES`] frames are returned.
///
/// Inlined functions may expand to several frames; unresolvable frames
/// appear as `<unknown>`. Not for signal context; use
/// [`write_backtrace_json`] there.
pub fn capture(skip: usize) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut skipped = 0;
    backtrace::trace(|frame| {
        if skipped < skip {
            skipped += 1;
            return true;
        }
        if frames.len() >= MAX_STACK_FRAMES {
            return false;
        }
        let mut resolved = false;
        backtrace::resolve_frame(frame, |symbol| {
            resolved = true;
            if frames.len() >= MAX_STACK_FRAMES {
                return;
            }
            let name = symbol.name().map(|name| name.to_string());
            let file = symbol.filename().map(|path| path.display().to_string());
            frames.push(structured_frame(name, file));
        });
        if !resolved {
            frames.push(StackFrame::unknown());
        }
        true
    });
    frames
}

fn structured_frame(name: Option<String>, file: Option<String>) -> StackFrame {
    let Some(name) = name else {
        return StackFrame {
            is_native: file.is_none(),
            file_path: file,
            ..StackFrame::unknown()
        };
    };
    // Some unwinder back-ends report the module and offset folded into the
    // symbol string; unfold those into the structured shape.
    let parsed = parse_raw_symbol(&name);
    let file_path = file.or(parsed.module);
    StackFrame {
        method_name: parsed.function,
        is_native: file_path.is_none(),
        file_path,
        source_available: false,
    }
}

/// Number of bytes reserved per symbol name on the signal path.
const SIGNAL_NAME_SCRATCH: usize = 256;

/// Writes the current stack as the wire JSON frame array, skipping the
/// `skip` frames nearest the top. Returns the number of frames emitted.
///
/// SIGNAL SAFETY:
///     Uses `trace_unsynchronized`/`resolve_unsynchronized` and formats into
///     the caller's buffer; symbol names pass through an on-stack scratch.
///     Resolution on this path yields names only, no file or line, matching
///     the minimal frame shape the backend accepts from dying processes.
/// SAFETY:
///     Must not run concurrently with another unsynchronized trace. The
///     crash handler's one-shot guard provides that exclusion.
pub(crate) unsafe fn write_backtrace_json<W: fmt::Write>(w: &mut W, skip: usize) -> usize {
    let mut skipped = 0;
    let mut emitted = 0;
    let _ = w.write_char('[');
    backtrace::trace_unsynchronized(|frame| {
        if skipped < skip {
            skipped += 1;
            return true;
        }
        if emitted >= MAX_STACK_FRAMES {
            return false;
        }

        let mut name = FixedBuf::<SIGNAL_NAME_SCRATCH>::new();
        // Safety: the caller's contract covers the whole trace.
        unsafe {
            backtrace::resolve_unsynchronized(frame.ip(), |symbol| {
                if name.is_empty() {
                    if let Some(symbol_name) = symbol.name() {
                        let _ = write!(name, "{symbol_name}");
                    }
                }
            });
        }

        if emitted > 0 {
            let _ = w.write_char(',');
        }
        let _ = w.write_str("{\"method_name\":\"");
        if name.is_empty() {
            let _ = w.write_str(UNKNOWN_FUNCTION);
        } else {
            write_escaped(w, name.as_str());
        }
        let _ = w.write_str("\",\"is_native\":true,\"source_available\":false}");
        emitted += 1;
        true
    });
    let _ = w.write_char(']');
    emitted
}
