// This file is part of tether, a lifecycle event dispatcher for CLI processes.
// Copyright (C) 2026 The tether authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Implementation of `System` that actually interacts with the system

use super::{Binding, Foreign, System};
use crate::event::Event;
use crate::signal::{Name, Number};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ffi::{c_int, c_void};
use std::io;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, Ordering, compiler_fence};

static CAUGHT_SIGNALS: [AtomicIsize; 8] = {
    // In the array creation, the repeat operand must be const.
    #[allow(clippy::declare_interior_mutable_const)]
    const SIGNAL_SLOT: AtomicIsize = AtomicIsize::new(0);
    [SIGNAL_SLOT; 8]
};

/// Signal catching function
///
/// The function records the signal number into `CAUGHT_SIGNALS` so that
/// [`RealSystem::caught_signals`] can report it later.
extern "C" fn catch_signal(signal: c_int) {
    // This function can only perform async-signal-safe operations.
    // Performing unsafe operations is undefined behavior!

    // Find an unused slot (having a value of 0) in CAUGHT_SIGNALS and write the
    // signal number into it.
    // If there is a slot having a value of the signal already, do nothing.
    // If there is no available slot, the signal will be lost!
    let signal = signal as isize;
    for slot in &CAUGHT_SIGNALS {
        match slot.compare_exchange(0, signal, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(slot_value) if slot_value == signal => break,
            _ => continue,
        }
    }
}

fn catcher_address() -> libc::sighandler_t {
    catch_signal as extern "C" fn(c_int) as libc::sighandler_t
}

/// Bindings the kernel cannot hold
///
/// `EXIT` and `ERR` have no kernel counterpart, so their bindings live here
/// entirely. A signal bound to a Rust closure or a command string has
/// `catch_signal` installed in the kernel and the actual binding kept here.
static SOFT_BINDINGS: Mutex<BTreeMap<Event, Binding>> = Mutex::new(BTreeMap::new());

fn raw_number(signal: Name) -> io::Result<c_int> {
    signal
        .number()
        .map(Number::as_raw)
        .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
}

fn query_action(number: c_int) -> io::Result<libc::sigaction> {
    let mut old_action = MaybeUninit::<libc::sigaction>::uninit();
    // SAFETY: A null new action only queries the current action.
    let result = unsafe { libc::sigaction(number, std::ptr::null(), old_action.as_mut_ptr()) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: sigaction has filled the old action.
    Ok(unsafe { old_action.assume_init() })
}

fn install_action(
    number: c_int,
    handler: libc::sighandler_t,
    flags: c_int,
) -> io::Result<libc::sigaction> {
    // SAFETY: All-zero is a valid bit pattern for `sigaction`.
    let mut new_action: libc::sigaction = unsafe { std::mem::zeroed() };
    new_action.sa_sigaction = handler;
    new_action.sa_flags = flags;
    // SAFETY: The mask is a valid `sigset_t` owned by `new_action`.
    unsafe { libc::sigemptyset(&mut new_action.sa_mask) };

    let mut old_action = MaybeUninit::<libc::sigaction>::uninit();
    // SAFETY: The `catch_signal` function only accesses atomic variables.
    // Other handler addresses come from previous `sigaction` results.
    let result = unsafe { libc::sigaction(number, &new_action, old_action.as_mut_ptr()) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: sigaction has filled the old action.
    Ok(unsafe { old_action.assume_init() })
}

fn binding_of(action: &libc::sigaction, soft: Option<Binding>) -> Binding {
    match action.sa_sigaction {
        libc::SIG_DFL => Binding::Default,
        libc::SIG_IGN => Binding::Ignore,
        address if address == catcher_address() => soft.unwrap_or(Binding::Catch),
        address => Binding::Foreign(Foreign::Native {
            address,
            flags: action.sa_flags,
        }),
    }
}

/// Calls a native signal handler function in the current thread.
///
/// If `flags` contains `SA_SIGINFO`, the handler is called with a
/// `siginfo_t` that has only `si_signo` set and a null context pointer.
///
/// # Safety
///
/// `address` must be the address of a signal handler function previously
/// installed with `flags`, and the handler must tolerate being called
/// outside a signal context.
pub unsafe fn call_native(address: usize, flags: c_int, signal: Name) {
    let Some(number) = signal.number() else {
        return;
    };
    if flags & libc::SA_SIGINFO != 0 {
        // SAFETY: The caller guarantees the address is a three-argument
        // signal handler.
        let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
            unsafe { std::mem::transmute(address) };
        // SAFETY: All-zero is a valid bit pattern for `siginfo_t`.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        info.si_signo = number.as_raw();
        handler(number.as_raw(), &mut info, std::ptr::null_mut());
    } else {
        // SAFETY: The caller guarantees the address is a one-argument
        // signal handler.
        let handler: extern "C" fn(c_int) = unsafe { std::mem::transmute(address) };
        handler(number.as_raw());
    }
}

/// Implementation of `System` that actually interacts with the system
///
/// `RealSystem` is an empty `struct` because the underlying operating system
/// manages signal dispositions. All instances share the same process-wide
/// state, so a program should use only one instance at a time.
#[derive(Debug, Default)]
pub struct RealSystem(());

impl RealSystem {
    /// Returns an instance of `RealSystem`.
    #[must_use]
    pub fn new() -> Self {
        RealSystem(())
    }
}

impl System for RealSystem {
    fn binding(&self, event: Event) -> io::Result<Binding> {
        let soft = SOFT_BINDINGS.lock();
        match event.signal() {
            None => Ok(soft.get(&event).cloned().unwrap_or_default()),
            Some(signal) => {
                let action = query_action(raw_number(signal)?)?;
                Ok(binding_of(&action, soft.get(&event).cloned()))
            }
        }
    }

    fn bind(&mut self, event: Event, binding: Binding) -> io::Result<Binding> {
        let mut soft = SOFT_BINDINGS.lock();
        let Some(signal) = event.signal() else {
            let old = match binding {
                Binding::Default => soft.remove(&event),
                binding => soft.insert(event, binding),
            };
            return Ok(old.unwrap_or_default());
        };

        let number = raw_number(signal)?;
        let (handler, flags) = match &binding {
            Binding::Default => (libc::SIG_DFL, 0),
            Binding::Ignore => (libc::SIG_IGN, 0),
            Binding::Catch => (catcher_address(), 0),
            Binding::Foreign(Foreign::Native { address, flags }) => (*address, *flags),
            Binding::Foreign(Foreign::Function(_) | Foreign::Command(_)) => (catcher_address(), 0),
        };
        let old_action = install_action(number, handler, flags)?;
        let old_soft = match binding {
            Binding::Foreign(Foreign::Function(_) | Foreign::Command(_)) => {
                soft.insert(event, binding)
            }
            _ => soft.remove(&event),
        };
        Ok(binding_of(&old_action, old_soft))
    }

    fn caught_signals(&mut self) -> Vec<Name> {
        let mut signals = Vec::new();
        for slot in &CAUGHT_SIGNALS {
            // Need a fence to ensure we examine the slots in order.
            compiler_fence(Ordering::Acquire);

            let signal = slot.swap(0, Ordering::Relaxed);
            if signal == 0 {
                // The `catch_signal` function always fills the first unused
                // slot, so there is no more slot filled with a signal.
                break;
            }

            if let Some(name) = c_int::try_from(signal).ok().and_then(Name::from_raw) {
                signals.push(name);
            }
        }
        signals
    }
}
