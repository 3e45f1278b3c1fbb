//! Engine trait implementations over the bound symbols.

use crate::error::LoadError;
use crate::symbols::{Loaded, MagicT};
use magicbind::{Cookie, Flags, Library, NativeResult};
use std::ffi::{CStr, c_char, c_int, c_void};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

fn text(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: libmagic returns NUL-terminated strings owned by the cookie,
    // valid until the next call on it; we copy before returning.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Errno left by the last libc-level failure, `fallback` if none.
fn last_errno(fallback: c_int) -> c_int {
    match io::Error::last_os_error().raw_os_error() {
        Some(0) | None => fallback,
        Some(errno) => errno,
    }
}

/// The system libmagic, opened at runtime.
#[derive(Debug, Clone)]
pub struct NativeLibrary {
    loaded: Arc<Loaded>,
}

impl NativeLibrary {
    /// Open a specific library file or soname.
    pub fn open(name: &str) -> Result<Self, LoadError> {
        Ok(Self {
            loaded: Arc::new(Loaded::open(name)?),
        })
    }

    /// Open the first of `candidates` that loads.
    pub fn open_any(candidates: &[String]) -> Result<Self, LoadError> {
        Ok(Self {
            loaded: Arc::new(Loaded::open_any(candidates)?),
        })
    }

    /// File or soname the library was opened from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.loaded.name
    }
}

impl Library for NativeLibrary {
    fn open(&self, flags: Flags) -> NativeResult<Box<dyn Cookie>> {
        // SAFETY: magic_open takes any int and returns null on failure.
        let cookie = unsafe { (self.loaded.symbols.open)(flags.bits()) };
        if cookie.is_null() {
            return Err(last_errno(libc::ENOMEM));
        }
        Ok(Box::new(NativeCookie {
            cookie,
            loaded: Arc::clone(&self.loaded),
        }))
    }

    fn default_path(&self) -> Option<String> {
        let getpath = self.loaded.symbols.getpath?;
        // SAFETY: a null magicfile with action 0 asks for the default list,
        // which honours the MAGIC environment variable.
        text(unsafe { getpath(std::ptr::null(), 0) })
    }

    fn version(&self) -> NativeResult<c_int> {
        let version = self.loaded.symbols.version.ok_or(libc::ENOSYS)?;
        // SAFETY: magic_version takes no arguments.
        Ok(unsafe { version() })
    }
}

/// One open `magic_t`. Closed on drop.
struct NativeCookie {
    cookie: MagicT,
    loaded: Arc<Loaded>,
}

// SAFETY: a magic_t may move between threads; it is never used from two
// threads at once because the core only touches it under the instance lock.
unsafe impl Send for NativeCookie {}

impl NativeCookie {
    fn status(
        &self,
        f: unsafe extern "C" fn(MagicT, *const c_char) -> c_int,
        paths: Option<&CStr>,
    ) -> c_int {
        let paths = paths.map_or(std::ptr::null(), CStr::as_ptr);
        // SAFETY: cookie is open; paths is null or a valid C string.
        unsafe { f(self.cookie, paths) }
    }
}

impl Cookie for NativeCookie {
    fn error(&self) -> Option<String> {
        // SAFETY: cookie is open.
        text(unsafe { (self.loaded.symbols.error)(self.cookie) })
    }

    fn errno(&self) -> c_int {
        // SAFETY: cookie is open.
        unsafe { (self.loaded.symbols.errno)(self.cookie) }
    }

    fn get_param(&self, tag: c_int) -> NativeResult<usize> {
        let getparam = self.loaded.symbols.getparam.ok_or(libc::ENOSYS)?;
        let mut value: usize = 0;
        // SAFETY: every parameter is read into a size_t.
        let rv = unsafe { getparam(self.cookie, tag, (&raw mut value).cast::<c_void>()) };
        if rv < 0 {
            return Err(last_errno(libc::EINVAL));
        }
        Ok(value)
    }

    fn set_param(&mut self, tag: c_int, value: usize) -> NativeResult<()> {
        let setparam = self.loaded.symbols.setparam.ok_or(libc::ENOSYS)?;
        // SAFETY: every parameter is written from a size_t.
        let rv = unsafe { setparam(self.cookie, tag, (&raw const value).cast::<c_void>()) };
        if rv < 0 {
            return Err(last_errno(libc::EINVAL));
        }
        Ok(())
    }

    fn get_flags(&self) -> NativeResult<Flags> {
        let getflags = self.loaded.symbols.getflags.ok_or(libc::ENOSYS)?;
        // SAFETY: cookie is open.
        Ok(Flags::from_bits_retain(unsafe { getflags(self.cookie) }))
    }

    fn set_flags(&mut self, flags: Flags) -> NativeResult<()> {
        // SAFETY: cookie is open.
        if unsafe { (self.loaded.symbols.setflags)(self.cookie, flags.bits()) } < 0 {
            return Err(last_errno(libc::EINVAL));
        }
        Ok(())
    }

    fn load(&mut self, paths: Option<&CStr>) -> c_int {
        self.status(self.loaded.symbols.load, paths)
    }

    fn load_buffers(&mut self, buffers: &[&[u8]]) -> NativeResult<c_int> {
        let load_buffers = self.loaded.symbols.load_buffers.ok_or(libc::ENOSYS)?;
        let mut pointers: Vec<*mut c_void> = buffers
            .iter()
            .map(|b| b.as_ptr().cast_mut().cast::<c_void>())
            .collect();
        let mut sizes: Vec<usize> = buffers.iter().map(|b| b.len()).collect();
        // SAFETY: both arrays hold buffers.len() entries and libmagic only
        // reads the buffers. It keeps pointing into them after returning, so
        // the caller owns them until this cookie is dropped or loads again.
        Ok(unsafe {
            load_buffers(
                self.cookie,
                pointers.as_mut_ptr(),
                sizes.as_mut_ptr(),
                buffers.len(),
            )
        })
    }

    fn compile(&mut self, paths: Option<&CStr>) -> c_int {
        self.status(self.loaded.symbols.compile, paths)
    }

    fn check(&mut self, paths: Option<&CStr>) -> c_int {
        self.status(self.loaded.symbols.check, paths)
    }

    fn file(&mut self, path: &CStr) -> Option<String> {
        // SAFETY: cookie is open and path is a valid C string.
        text(unsafe { (self.loaded.symbols.file)(self.cookie, path.as_ptr()) })
    }

    fn buffer(&mut self, data: &[u8]) -> Option<String> {
        // SAFETY: data is valid for data.len() bytes.
        text(unsafe {
            (self.loaded.symbols.buffer)(self.cookie, data.as_ptr().cast(), data.len())
        })
    }

    fn descriptor(&mut self, fd: RawFd) -> Option<String> {
        // SAFETY: cookie is open; libmagic reports a bad descriptor as an error.
        text(unsafe { (self.loaded.symbols.descriptor)(self.cookie, fd) })
    }
}

impl Drop for NativeCookie {
    fn drop(&mut self) {
        // SAFETY: cookie is open and never used again.
        unsafe { (self.loaded.symbols.close)(self.cookie) };
        tracing::trace!("Closed magic cookie");
    }
}
