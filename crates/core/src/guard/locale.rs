//! Scoped override of the active locale.
//!
//! Native output (numbers, escapes) can follow the active locale, which would
//! corrupt anything that parses it. A [`LocaleGuard`] switches to the neutral
//! `"C"` locale for one call and switches back afterwards.

use crate::error::{GuardError, GuardStage, SideChannel};
use std::ffi::{CStr, CString};
use std::io;

const NEUTRAL: &CStr = c"C";

/// How the locale is overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleStrategy {
    /// Per-thread locale objects (`newlocale`/`uselocale`).
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    ThreadLocal,
    /// Process-wide `setlocale`; requires the side-channel lock.
    Global,
}

impl Default for LocaleStrategy {
    fn default() -> Self {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            Self::ThreadLocal
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Self::Global
        }
    }
}

#[derive(Debug)]
enum Saved {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    ThreadLocal {
        previous: libc::locale_t,
        neutral: libc::locale_t,
    },
    Global {
        previous: CString,
    },
    Restored,
}

/// Saved locale state for one guarded call.
#[derive(Debug)]
pub struct LocaleGuard {
    saved: Saved,
}

impl LocaleGuard {
    /// Switch to the neutral locale using the platform's preferred strategy.
    pub fn enter() -> Result<Self, GuardError> {
        Self::enter_with(LocaleStrategy::default())
    }

    /// Switch to the neutral locale using an explicit strategy.
    pub fn enter_with(strategy: LocaleStrategy) -> Result<Self, GuardError> {
        let fail = |source: io::Error| GuardError {
            channel: SideChannel::Locale,
            stage: GuardStage::Enter,
            source,
        };

        let saved = match strategy {
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            LocaleStrategy::ThreadLocal => {
                // SAFETY: NEUTRAL is a valid C string; a null base asks for a fresh object.
                let neutral = unsafe {
                    libc::newlocale(libc::LC_ALL_MASK, NEUTRAL.as_ptr(), std::ptr::null_mut())
                };
                if neutral.is_null() {
                    return Err(fail(io::Error::last_os_error()));
                }
                // SAFETY: neutral is a valid locale object.
                let previous = unsafe { libc::uselocale(neutral) };
                if previous.is_null() {
                    let err = io::Error::last_os_error();
                    // SAFETY: neutral was never installed.
                    unsafe { libc::freelocale(neutral) };
                    return Err(fail(err));
                }
                Saved::ThreadLocal { previous, neutral }
            }
            LocaleStrategy::Global => {
                // SAFETY: a null locale argument only queries the current name.
                let current = unsafe { libc::setlocale(libc::LC_ALL, std::ptr::null()) };
                if current.is_null() {
                    return Err(fail(io::Error::from_raw_os_error(libc::EINVAL)));
                }
                // SAFETY: setlocale returned a valid C string; copy it before it changes.
                let previous = unsafe { CStr::from_ptr(current) }.to_owned();
                // SAFETY: NEUTRAL is a valid C string.
                if unsafe { libc::setlocale(libc::LC_ALL, NEUTRAL.as_ptr()) }.is_null() {
                    return Err(fail(io::Error::from_raw_os_error(libc::EINVAL)));
                }
                Saved::Global { previous }
            }
        };

        Ok(Self { saved })
    }

    /// Switch back to the saved locale.
    pub fn exit(mut self) -> Result<(), GuardError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), GuardError> {
        let fail = |source: io::Error| GuardError {
            channel: SideChannel::Locale,
            stage: GuardStage::Exit,
            source,
        };

        match std::mem::replace(&mut self.saved, Saved::Restored) {
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            Saved::ThreadLocal { previous, neutral } => {
                // SAFETY: previous was returned by uselocale on this thread.
                if unsafe { libc::uselocale(previous) }.is_null() {
                    // neutral is still installed and must not be freed.
                    return Err(fail(io::Error::last_os_error()));
                }
                // SAFETY: neutral is no longer installed on any thread.
                unsafe { libc::freelocale(neutral) };
            }
            Saved::Global { previous } => {
                // SAFETY: previous is a valid C string naming a locale that was active.
                if unsafe { libc::setlocale(libc::LC_ALL, previous.as_ptr()) }.is_null() {
                    return Err(fail(io::Error::from_raw_os_error(libc::EINVAL)));
                }
            }
            Saved::Restored => {}
        }

        Ok(())
    }
}

impl Drop for LocaleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(error = %e, "Locale was not restored");
        }
    }
}
