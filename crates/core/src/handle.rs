//! Ownership and locking of one native handle.
//!
//! A [`HandleManager`] exclusively owns its cookie. Every native call and
//! every configuration change goes through [`HandleManager::with_lock`],
//! which hands out a [`Session`] borrowing the cookie and the cached
//! configuration for the duration of the closure.

use crate::call::{self, Guarded};
use crate::engine::{Capabilities, Cookie, Library, Request, Response};
use crate::error::{GuardError, MagicError, Result, UNKNOWN_MESSAGE};
use crate::flags::Flags;
use crate::param::Parameter;
use crate::state::Configuration;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// Fields drop in order: the cookie goes before the databases it reads.
struct Slot {
    cookie: Box<dyn Cookie>,
    config: Configuration,
    /// Databases handed to the engine by `load_buffers`.
    databases: Vec<Box<[u8]>>,
}

/// Owner of one native handle and its lock.
pub(crate) struct HandleManager {
    library: Arc<dyn Library>,
    slot: Mutex<Option<Slot>>,
    open: AtomicBool,
    loaded: AtomicBool,
    capabilities: Capabilities,
    guard_failure: Mutex<Option<GuardError>>,
}

impl HandleManager {
    /// Open a native handle with neutral flags.
    pub(crate) fn open(library: Arc<dyn Library>, config: Configuration) -> Result<Self> {
        let cookie = library.open(Flags::NONE).map_err(|errno| {
            if errno == libc::ENOMEM {
                MagicError::Resource { errno }
            } else {
                MagicError::library_initialize(errno)
            }
        })?;
        let capabilities = Capabilities::query(library.as_ref(), cookie.as_ref());
        tracing::debug!(?capabilities, "Opened native handle");

        Ok(Self {
            library,
            slot: Mutex::new(Some(Slot {
                cookie,
                config,
                databases: Vec::new(),
            })),
            open: AtomicBool::new(true),
            loaded: AtomicBool::new(false),
            capabilities,
            guard_failure: Mutex::new(None),
        })
    }

    pub(crate) fn library(&self) -> &dyn Library {
        self.library.as_ref()
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Release the native handle under the lock. Later calls do nothing.
    pub(crate) fn close(&self) {
        let mut slot = self.slot.lock();
        if let Some(released) = slot.take() {
            self.open.store(false, Ordering::Release);
            self.loaded.store(false, Ordering::Release);
            drop(released);
            tracing::debug!("Closed native handle");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Most recent guard restore failure, cleared on read.
    pub(crate) fn take_guard_failure(&self) -> Option<GuardError> {
        self.guard_failure.lock().take()
    }

    /// Run `f` with exclusive access to the handle.
    ///
    /// Fails with [`MagicError::NotOpen`] without calling `f` once closed.
    /// The lock is released on every exit path, unwinding included.
    pub(crate) fn with_lock<R>(&self, f: impl FnOnce(&mut Session<'_>) -> Result<R>) -> Result<R> {
        let mut slot = self.slot.lock();
        let Slot {
            cookie,
            config,
            databases,
        } = slot.as_mut().ok_or(MagicError::NotOpen)?;
        let mut session = Session {
            cookie: cookie.as_mut(),
            config,
            databases,
            capabilities: &self.capabilities,
            loaded: &self.loaded,
            guard_failure: &self.guard_failure,
            library: self.library.as_ref(),
        };
        f(&mut session)
    }
}

/// Exclusive access to an open handle, valid inside [`HandleManager::with_lock`].
pub(crate) struct Session<'a> {
    pub(crate) cookie: &'a mut dyn Cookie,
    pub(crate) config: &'a mut Configuration,
    /// Memory the engine may still read; replaced only after a new load.
    pub(crate) databases: &'a mut Vec<Box<[u8]>>,
    pub(crate) capabilities: &'a Capabilities,
    pub(crate) library: &'a dyn Library,
    loaded: &'a AtomicBool,
    guard_failure: &'a Mutex<Option<GuardError>>,
}

impl Session<'_> {
    pub(crate) fn mark_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// Run a request under the guards selected by `flags`.
    pub(crate) fn call(&mut self, flags: Flags, request: &Request<'_>) -> Response {
        let mut outcome: Guarded<Response> = call::invoke(self.cookie, flags, request);
        if let Some(failure) = outcome.exit_failure() {
            *self.guard_failure.lock() = Some(failure);
        }
        outcome.value
    }

    /// The engine's last error as a [`MagicError::Library`].
    pub(crate) fn last_error(&self) -> MagicError {
        let message = self
            .cookie
            .error()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());
        let errno = match self.cookie.errno() {
            0 => -1,
            errno => errno,
        };
        MagicError::Library { message, errno }
    }

    pub(crate) fn get_parameter(&self, parameter: Parameter) -> Result<usize> {
        if !self.capabilities.parameters {
            return Err(MagicError::not_implemented());
        }
        self.cookie
            .get_param(parameter.tag())
            .map_err(|errno| self.param_error(errno))
    }

    pub(crate) fn set_parameter(&mut self, parameter: Parameter, value: usize) -> Result<()> {
        if !self.capabilities.parameters {
            return Err(MagicError::not_implemented());
        }
        let value = parameter.validate(value)?;
        self.cookie
            .set_param(parameter.tag(), value)
            .map_err(|errno| self.param_error(errno))
    }

    fn param_error(&self, errno: i32) -> MagicError {
        match errno {
            libc::ENOSYS => MagicError::not_implemented(),
            libc::EINVAL => MagicError::invalid_parameter(),
            libc::EOVERFLOW => MagicError::parameter_overflow(),
            _ => self.last_error(),
        }
    }

    /// Flags as the engine reports them; the cached value when it cannot.
    pub(crate) fn native_flags(&self) -> Result<Flags> {
        if !self.capabilities.get_flags {
            return Ok(self.config.flags);
        }
        match self.cookie.get_flags() {
            Ok(flags) => Ok(flags),
            Err(libc::ENOSYS) => Ok(self.config.flags),
            Err(_) => Err(self.last_error()),
        }
    }

    /// Hand flags to the engine without touching the cache.
    pub(crate) fn set_native_flags(&mut self, flags: Flags) -> Result<()> {
        self.cookie.set_flags(flags).map_err(|errno| match errno {
            libc::EINVAL => MagicError::invalid_flags(),
            libc::ENOSYS => MagicError::flag_not_implemented(),
            _ => self.last_error(),
        })
    }
}
