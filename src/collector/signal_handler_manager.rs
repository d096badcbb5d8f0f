// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use super::crash_handler::handle_crash_signal;
use crate::report::monitored_signals;
use libc::{c_void, siginfo_t};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

// Linux supports signal numbers up to 64 inclusive.
// https://man7.org/linux/man-pages/man7/signal.7.html
const MAX_SIGNALS: usize = 65;
static mut HANDLERS: [Option<(signal::Signal, SigAction)>; MAX_SIGNALS] = [None; MAX_SIGNALS];
static INIT_STARTED: AtomicBool = AtomicBool::new(false);
static INIT_FINISHED: AtomicBool = AtomicBool::new(false);

/// Registers handlers for the fatal signals and saves each previous action
/// so it can be chained to and restored.
///
/// Handlers are installed with siginfo delivery and reset-on-delivery, so a
/// second fault of the same signal takes the default path even if our
/// handler is the one that faulted.
///
/// SAFETY:
///     Crash-capture functions are not reentrant. No other crash-capture
///     function may run concurrently with this one.
/// ATOMICITY:
///     `INIT_STARTED`/`INIT_FINISHED` bracket the only mutation of
///     `HANDLERS`; a crash that lands in the bracket cannot chain and is
///     terminated instead.
pub fn install_signal_handlers() -> anyhow::Result<()> {
    anyhow::ensure!(
        INIT_STARTED
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_ok(),
        "signal handlers already installed"
    );

    let mut errors = vec![];
    for signum in monitored_signals() {
        let index = signum as usize;
        // Safety: guarded by INIT_STARTED above; this is the only writer.
        match unsafe { register_signal_handler(signum) } {
            Ok(saved) => unsafe { HANDLERS[index] = Some(saved) },
            Err(e) => errors.push(format!("unable to register handler for {signum}: {e:?}")),
        }
    }
    INIT_FINISHED.store(true, SeqCst);
    anyhow::ensure!(
        errors.is_empty(),
        "errors registering signal handlers {errors:?}"
    );
    Ok(())
}

unsafe fn register_signal_handler(
    signum: i32,
) -> anyhow::Result<(signal::Signal, SigAction)> {
    let signal_type = signal::Signal::try_from(signum)?;
    // SA_SIGINFO is implied by the SigAction handler variant. SA_RESETHAND
    // restores the default disposition on first delivery.
    let sig_action = SigAction::new(
        SigHandler::SigAction(handle_crash_signal),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    let old_handler = signal::sigaction(signal_type, &sig_action)?;
    Ok((signal_type, old_handler))
}

/// Restores every saved previous action. No-op when handlers were never
/// installed; a later [`install_signal_handlers`] may install them again.
pub fn uninstall_signal_handlers() -> anyhow::Result<()> {
    if !INIT_FINISHED.load(SeqCst) {
        return Ok(());
    }
    INIT_FINISHED.store(false, SeqCst);
    let mut errors = vec![];
    for signum in monitored_signals() {
        let index = signum as usize;
        // Safety: INIT_FINISHED is false, so the chain path no longer reads
        // the table; this is the only writer.
        let saved_entry = unsafe { HANDLERS[index] };
        if let Some((signal_type, saved)) = saved_entry {
            unsafe { HANDLERS[index] = None };
            if let Err(e) = unsafe { signal::sigaction(signal_type, &saved) } {
                errors.push(format!("unable to restore handler for {signum}: {e:?}"));
            }
        }
    }
    INIT_STARTED.store(false, SeqCst);
    anyhow::ensure!(
        errors.is_empty(),
        "errors restoring signal handlers {errors:?}"
    );
    Ok(())
}

/// Once our handler has run, yield to whatever was installed before us so
/// the original termination semantics (including core dumps) are preserved.
///
/// SAFETY: Called from signal context. Reads `HANDLERS` only after
/// `INIT_FINISHED` confirms the table is frozen. If anything looks off we
/// `_exit` with the conventional status rather than guess.
pub(crate) unsafe fn chain_previous_handler(
    signum: i32,
    sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    if !INIT_FINISHED.load(SeqCst) || signum < 0 || signum >= MAX_SIGNALS as i32 {
        libc::_exit(128 + signum);
    }
    if let Some((signal_type, saved)) = unsafe { HANDLERS[signum as usize] } {
        // How we chain depends on the kind of handler saved; see
        // https://man7.org/linux/man-pages/man2/sigaction.2.html
        match saved.handler() {
            SigHandler::SigDfl => {
                // Restore the default and re-raise so the kernel applies the
                // original disposition (termination status, core dump).
                let _ = unsafe { signal::sigaction(signal_type, &saved) };
                unsafe { libc::raise(signum) };
            }
            SigHandler::SigIgn => (), // Return and ignore the signal.
            SigHandler::Handler(f) => f(signum),
            SigHandler::SigAction(f) => f(signum, sig_info, ucontext),
        }
    } else {
        unsafe {
            libc::signal(signum, libc::SIG_DFL);
            libc::raise(signum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitored_signals_fit_table() {
        for signum in monitored_signals() {
            assert!(signum > 0 && (signum as usize) < MAX_SIGNALS);
        }
    }

    #[test]
    fn test_install_uninstall_cycle() {
        install_signal_handlers().unwrap();
        // Double install is rejected while active.
        assert!(install_signal_handlers().is_err());
        uninstall_signal_handlers().unwrap();
        // After restore the cycle can repeat.
        install_signal_handlers().unwrap();
        uninstall_signal_handlers().unwrap();
    }
}
