//! The caller-facing instance type.

use crate::engine::{Capabilities, Library, Target};
use crate::error::{GuardError, MagicError, Result};
use crate::flags::Flags;
use crate::format::Detection;
use crate::handle::HandleManager;
use crate::param::Parameter;
use crate::paths;
use crate::state::Configuration;
use std::ffi::{CString, c_int};
use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static DO_NOT_AUTO_LOAD: AtomicBool = AtomicBool::new(false);
static DO_NOT_STOP_ON_ERROR: AtomicBool = AtomicBool::new(false);

/// Skip loading the default databases when new instances are built.
pub fn set_do_not_auto_load(value: bool) {
    DO_NOT_AUTO_LOAD.store(value, Ordering::Relaxed);
}

#[must_use]
pub fn do_not_auto_load() -> bool {
    DO_NOT_AUTO_LOAD.load(Ordering::Relaxed)
}

/// Build new instances that fall back to the engine's error text instead of
/// raising when a file cannot be inspected.
pub fn set_do_not_stop_on_error(value: bool) {
    DO_NOT_STOP_ON_ERROR.store(value, Ordering::Relaxed);
}

#[must_use]
pub fn do_not_stop_on_error() -> bool {
    DO_NOT_STOP_ON_ERROR.load(Ordering::Relaxed)
}

/// Engine version as a single integer, e.g. `545`.
pub fn version(library: &dyn Library) -> Result<c_int> {
    library.version().map_err(|errno| match errno {
        libc::ENOSYS => MagicError::not_implemented(),
        errno => MagicError::Library {
            message: crate::error::UNKNOWN_MESSAGE.to_string(),
            errno,
        },
    })
}

/// Engine version as `(major, minor)`.
pub fn version_parts(library: &dyn Library) -> Result<(c_int, c_int)> {
    let v = version(library)?;
    Ok((v / 100, v % 100))
}

/// Engine version as `"major.minor"`, e.g. `"5.45"`.
pub fn version_string(library: &dyn Library) -> Result<String> {
    let (major, minor) = version_parts(library)?;
    Ok(format!("{major}.{minor:02}"))
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| MagicError::Argument("path contains a NUL byte".to_string()))
}

/// Builder for [`Magic`].
#[must_use]
pub struct MagicBuilder {
    library: Arc<dyn Library>,
    flags: Flags,
    paths: Option<Vec<String>>,
    auto_load: bool,
    stop_on_errors: bool,
}

impl MagicBuilder {
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Databases to load instead of the engine's defaults.
    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Load databases while building. Explicit paths are always loaded.
    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }

    pub fn stop_on_errors(mut self, stop_on_errors: bool) -> Self {
        self.stop_on_errors = stop_on_errors;
        self
    }

    /// Open the native handle, apply flags and load databases.
    pub fn open(self) -> Result<Magic> {
        let list = self.paths.as_deref().map(paths::join).transpose()?;
        let flags = if self.flags.is_empty() {
            Flags::NONE
        } else {
            Flags::validate(self.flags.bits())?
        };

        let handle = HandleManager::open(self.library, Configuration::new(self.stop_on_errors))?;
        let magic = Magic {
            inner: Arc::new(handle),
        };
        if !flags.is_empty() {
            magic.inner.with_lock(|s| s.apply_flags(flags))?;
        }
        if list.is_some() || self.auto_load {
            magic.inner.with_lock(|s| s.load(list))?;
        }
        Ok(magic)
    }
}

/// An open detection context.
///
/// Clones share the same native handle and lock. Calls on one handle run one
/// at a time; guarded calls across all handles in the process also run one at
/// a time, since the side channels they touch are process-wide.
#[derive(Clone)]
pub struct Magic {
    inner: Arc<HandleManager>,
}

impl Magic {
    pub fn builder(library: Arc<dyn Library>) -> MagicBuilder {
        MagicBuilder {
            library,
            flags: Flags::NONE,
            paths: None,
            auto_load: !do_not_auto_load(),
            stop_on_errors: !do_not_stop_on_error(),
        }
    }

    /// Open with default settings and the default databases.
    pub fn new(library: Arc<dyn Library>) -> Result<Self> {
        Self::builder(library).open()
    }

    pub fn open(library: Arc<dyn Library>, flags: Flags) -> Result<Self> {
        Self::builder(library).flags(flags).open()
    }

    /// Open reporting MIME type and encoding.
    pub fn mime(library: Arc<dyn Library>) -> Result<Self> {
        Self::open(library, Flags::MIME)
    }

    /// Open reporting MIME type only.
    pub fn mime_type(library: Arc<dyn Library>) -> Result<Self> {
        Self::open(library, Flags::MIME_TYPE)
    }

    /// Open reporting MIME encoding only.
    pub fn encoding(library: Arc<dyn Library>) -> Result<Self> {
        Self::open(library, Flags::MIME_ENCODING)
    }

    /// Compile databases with a throwaway instance.
    pub fn compile_with<S: AsRef<str>>(library: Arc<dyn Library>, paths: &[S]) -> Result<()> {
        let magic = Self::builder(library).auto_load(false).open()?;
        let outcome = magic.compile(paths);
        magic.close();
        outcome
    }

    /// Check databases with a throwaway instance.
    pub fn check_with<S: AsRef<str>>(library: Arc<dyn Library>, paths: &[S]) -> Result<bool> {
        let magic = Self::builder(library).auto_load(false).open()?;
        let outcome = magic.check(paths);
        magic.close();
        outcome
    }

    /// Release the native handle. Safe to call any number of times.
    pub fn close(&self) {
        self.inner.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    /// Database paths: the loaded ones, else the engine's defaults.
    pub fn paths(&self) -> Result<Vec<String>> {
        self.inner.with_lock(|s| Ok(s.paths()))
    }

    /// Flags every call on this instance runs with.
    pub fn flags(&self) -> Result<Flags> {
        self.inner.with_lock(|s| s.native_flags())
    }

    /// Replace the flags. Out-of-range values are rejected before any native call.
    pub fn set_flags(&self, flags: Flags) -> Result<()> {
        let flags = Flags::validate(flags.bits())?;
        self.inner.with_lock(|s| s.apply_flags(flags))
    }

    /// Current flags decomposed into single bits, highest first.
    pub fn flags_list(&self) -> Result<Vec<Flags>> {
        Ok(self.flags()?.split())
    }

    pub fn stop_on_errors(&self) -> Result<bool> {
        self.inner.with_lock(|s| Ok(s.config.stop_on_errors))
    }

    pub fn set_stop_on_errors(&self, value: bool) -> Result<()> {
        self.inner.with_lock(|s| {
            s.config.stop_on_errors = value;
            Ok(())
        })
    }

    pub fn get_parameter(&self, parameter: Parameter) -> Result<usize> {
        self.inner.with_lock(|s| s.get_parameter(parameter))
    }

    pub fn set_parameter(&self, parameter: Parameter, value: usize) -> Result<()> {
        let value = parameter.validate(value)?;
        self.inner.with_lock(|s| s.set_parameter(parameter, value))
    }

    /// Every parameter the engine reports, in tag order.
    pub fn parameters(&self) -> Result<Vec<(Parameter, usize)>> {
        self.inner.with_lock(|s| {
            Parameter::ALL
                .into_iter()
                .map(|p| s.get_parameter(p).map(|value| (p, value)))
                .collect()
        })
    }

    /// Load databases from the given paths.
    pub fn load<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<String>> {
        let list = paths::join(paths)?;
        self.inner.with_lock(|s| s.load(Some(list)))
    }

    /// Load the engine's default databases.
    pub fn load_default(&self) -> Result<Vec<String>> {
        self.inner.with_lock(|s| s.load(None))
    }

    /// Load databases held in memory.
    ///
    /// The engine reads the bytes in place until the next load or close, so
    /// the instance keeps them. Owned vectors are moved in; slices are copied.
    pub fn load_buffers<I>(&self, buffers: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Vec<u8>>,
    {
        let databases: Vec<Box<[u8]>> = buffers
            .into_iter()
            .map(|b| b.into().into_boxed_slice())
            .collect();
        if databases.is_empty() {
            return Err(MagicError::empty_arguments());
        }
        self.inner.with_lock(|s| s.load_buffers(databases))
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.is_open() && self.inner.is_loaded()
    }

    /// Compile the given databases, or the current paths when empty.
    pub fn compile<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        let explicit = (!paths.is_empty()).then(|| paths::join(paths)).transpose()?;
        self.inner.with_lock(|s| {
            let list = match explicit {
                Some(list) => list,
                None => paths::join(&s.paths())?,
            };
            s.compile(&list)
        })
    }

    /// Check the given databases, or the current paths when empty.
    ///
    /// Returns `false` when the engine rejects them.
    pub fn check<S: AsRef<str>>(&self, paths: &[S]) -> Result<bool> {
        let explicit = (!paths.is_empty()).then(|| paths::join(paths)).transpose()?;
        self.inner.with_lock(|s| {
            let list = match explicit {
                Some(list) => list,
                None => paths::join(&s.paths())?,
            };
            Ok(s.check(&list))
        })
    }

    /// Identify a file by path.
    pub fn file(&self, path: impl AsRef<Path>) -> Result<Detection> {
        let path = c_path(path.as_ref())?;
        self.detect(Target::Path(&path))
    }

    /// Identify bytes in memory.
    pub fn buffer(&self, data: &[u8]) -> Result<Detection> {
        self.detect(Target::Buffer(data))
    }

    /// Identify an open file descriptor's contents.
    pub fn descriptor(&self, fd: &impl AsRawFd) -> Result<Detection> {
        self.descriptor_raw(fd.as_raw_fd())
    }

    /// Identify by raw descriptor number.
    pub fn descriptor_raw(&self, fd: RawFd) -> Result<Detection> {
        if fd < 0 {
            return Err(MagicError::Argument(format!("invalid file descriptor {fd}")));
        }
        self.detect(Target::Descriptor(fd))
    }

    /// Identify any target.
    pub fn detect(&self, target: Target<'_>) -> Result<Detection> {
        if self.is_closed() {
            return Err(MagicError::NotOpen);
        }
        if !self.inner.is_loaded() {
            return Err(MagicError::NotLoaded);
        }
        self.inner.with_lock(|s| s.detect(target))
    }

    /// What the linked engine supports.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    /// Engine version through this instance's library.
    pub fn version(&self) -> Result<c_int> {
        version(self.inner.library())
    }

    /// Most recent failure to restore a side channel, cleared on read.
    ///
    /// Such failures never change a call's result; they are only recorded.
    #[must_use]
    pub fn take_guard_failure(&self) -> Option<GuardError> {
        self.inner.take_guard_failure()
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            return write!(f, "Magic {{ {:p} }} (closed)", Arc::as_ptr(&self.inner));
        }
        f.debug_struct("Magic")
            .field("handle", &Arc::as_ptr(&self.inner))
            .field("loaded", &self.inner.is_loaded())
            .field("capabilities", &self.inner.capabilities())
            .finish()
    }
}
