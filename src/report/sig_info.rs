// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The fatal signals the agent installs handlers for.
/// See <https://man7.org/linux/man-pages/man7/signal.7.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
pub enum SignalNames {
    SIGSEGV,
    SIGABRT,
    SIGFPE,
    SIGBUS,
    SIGILL,
    UNKNOWN,
}

impl From<libc::c_int> for SignalNames {
    fn from(value: libc::c_int) -> Self {
        match value {
            libc::SIGSEGV => SignalNames::SIGSEGV,
            libc::SIGABRT => SignalNames::SIGABRT,
            libc::SIGFPE => SignalNames::SIGFPE,
            libc::SIGBUS => SignalNames::SIGBUS,
            libc::SIGILL => SignalNames::SIGILL,
            _ => SignalNames::UNKNOWN,
        }
    }
}

impl SignalNames {
    /// Wire label for this signal. `&'static` so the signal handler can use
    /// it without formatting machinery.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            SignalNames::SIGSEGV => "SIGSEGV",
            SignalNames::SIGABRT => "SIGABRT",
            SignalNames::SIGFPE => "SIGFPE",
            SignalNames::SIGBUS => "SIGBUS",
            SignalNames::SIGILL => "SIGILL",
            SignalNames::UNKNOWN => "UNKNOWN",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalNames::SIGSEGV => "Segmentation fault",
            SignalNames::SIGABRT => "Abort signal",
            SignalNames::SIGFPE => "Floating point exception",
            SignalNames::SIGBUS => "Bus error",
            SignalNames::SIGILL => "Illegal instruction",
            SignalNames::UNKNOWN => "Unknown signal",
        }
    }
}

/// Signals captured when `capture_signals` is enabled.
pub fn monitored_signals() -> Vec<libc::c_int> {
    vec![
        libc::SIGSEGV,
        libc::SIGABRT,
        libc::SIGFPE,
        libc::SIGBUS,
        libc::SIGILL,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_round_trip() {
        for signum in monitored_signals() {
            let name = SignalNames::from(signum);
            assert_ne!(name, SignalNames::UNKNOWN);
            assert_eq!(name.mnemonic(), format!("{name:?}"));
        }
    }

    #[test]
    fn test_unmonitored_signal_is_unknown() {
        assert_eq!(SignalNames::from(libc::SIGHUP), SignalNames::UNKNOWN);
        assert_eq!(SignalNames::UNKNOWN.mnemonic(), "UNKNOWN");
    }
}
