//! Guarded invocation of native entry points.
//!
//! Which side channels get guarded depends on the flags the call runs with:
//!
//! | flags set | guards                          |
//! |-----------|---------------------------------|
//! | `DEBUG`   | none, native diagnostics show   |
//! | `ERROR`   | locale only                     |
//! | otherwise | locale, then error output       |
//!
//! The wrapper never interprets the native outcome. It hands back the
//! normalized [`Response`] together with whatever went wrong in the guards.

use crate::engine::{Cookie, Request, Response, dispatch};
use crate::error::GuardError;
use crate::flags::Flags;
use crate::guard::{ErrorOutputGuard, LocaleGuard, SIDE_CHANNELS};

/// Which side channels a call is guarded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Call straight through.
    Unguarded,
    /// Neutral locale only.
    LocaleOnly,
    /// Neutral locale and muted error output.
    Full,
}

impl GuardMode {
    #[must_use]
    pub fn for_flags(flags: Flags) -> Self {
        if flags.contains(Flags::DEBUG) {
            Self::Unguarded
        } else if flags.contains(Flags::ERROR) {
            Self::LocaleOnly
        } else {
            Self::Full
        }
    }
}

/// A call's value plus the guard failures seen around it.
#[derive(Debug)]
pub(crate) struct Guarded<T> {
    pub(crate) value: T,
    pub(crate) failures: Vec<GuardError>,
}

impl<T> Guarded<T> {
    /// Most recent restore failure, if any.
    pub(crate) fn exit_failure(&mut self) -> Option<GuardError> {
        let index = self
            .failures
            .iter()
            .rposition(|f| f.stage == crate::error::GuardStage::Exit)?;
        Some(self.failures.swap_remove(index))
    }
}

/// Run `call` with the guards `flags` select.
///
/// Enter failures are logged and the call proceeds without that guard.
/// Restore failures are logged and returned alongside the value. If `call`
/// unwinds, the guards restore on drop, innermost first.
pub(crate) fn guarded<T>(flags: Flags, call: impl FnOnce() -> T) -> Guarded<T> {
    let mode = GuardMode::for_flags(flags);
    if mode == GuardMode::Unguarded {
        return Guarded {
            value: call(),
            failures: Vec::new(),
        };
    }

    let _serial = SIDE_CHANNELS.lock();
    let mut failures = Vec::new();

    let locale = match LocaleGuard::enter() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::debug!(error = %e, "Proceeding without locale guard");
            failures.push(e);
            None
        }
    };

    let output = match mode {
        GuardMode::Full => match ErrorOutputGuard::enter() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::debug!(error = %e, "Proceeding with error output unmuted");
                failures.push(e);
                None
            }
        },
        _ => None,
    };

    let value = call();

    let restored = [
        output.map(ErrorOutputGuard::exit),
        locale.map(LocaleGuard::exit),
        injected_restore_failure(),
    ];
    for e in restored.into_iter().flatten().filter_map(Result::err) {
        tracing::warn!(error = %e, "Guard restore failed");
        failures.push(e);
    }

    Guarded { value, failures }
}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_RESTORE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Make the next guarded call on this thread report a locale restore failure.
#[cfg(test)]
pub(crate) fn fail_next_restore() {
    FAIL_NEXT_RESTORE.with(|flag| flag.set(true));
}

#[cfg(test)]
fn injected_restore_failure() -> Option<Result<(), GuardError>> {
    FAIL_NEXT_RESTORE.with(|flag| flag.replace(false)).then(|| {
        Err(GuardError {
            channel: crate::error::SideChannel::Locale,
            stage: crate::error::GuardStage::Exit,
            source: std::io::Error::from_raw_os_error(libc::EINVAL),
        })
    })
}

#[cfg(not(test))]
fn injected_restore_failure() -> Option<Result<(), GuardError>> {
    None
}

/// Dispatch one request to the cookie under the guards `flags` select.
pub(crate) fn invoke(
    cookie: &mut dyn Cookie,
    flags: Flags,
    request: &Request<'_>,
) -> Guarded<Response> {
    tracing::trace!(call = request.name(), flags = flags.bits(), "Native call");
    guarded(flags, || dispatch(cookie, request))
}
