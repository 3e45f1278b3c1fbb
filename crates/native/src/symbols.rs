//! Runtime binding of libmagic entry points.
//!
//! Nothing links against libmagic at build time. The library is opened with
//! `dlopen` and each entry point resolved with `dlsym`; entry points that
//! only newer releases provide are optional and become capability gaps.

use crate::error::LoadError;
use std::ffi::{CStr, CString, c_char, c_int, c_void};

/// Opaque `magic_t`.
pub(crate) type MagicT = *mut c_void;

// ============================================================================
// Entry point signatures
// ============================================================================

type OpenFn = unsafe extern "C" fn(c_int) -> MagicT;
type CloseFn = unsafe extern "C" fn(MagicT);
type ErrorFn = unsafe extern "C" fn(MagicT) -> *const c_char;
type ErrnoFn = unsafe extern "C" fn(MagicT) -> c_int;
type SetFlagsFn = unsafe extern "C" fn(MagicT, c_int) -> c_int;
type GetFlagsFn = unsafe extern "C" fn(MagicT) -> c_int;
type PathFn = unsafe extern "C" fn(MagicT, *const c_char) -> c_int;
type FileFn = unsafe extern "C" fn(MagicT, *const c_char) -> *const c_char;
type BufferFn = unsafe extern "C" fn(MagicT, *const c_void, usize) -> *const c_char;
type DescriptorFn = unsafe extern "C" fn(MagicT, c_int) -> *const c_char;
type GetPathFn = unsafe extern "C" fn(*const c_char, c_int) -> *const c_char;
type GetParamFn = unsafe extern "C" fn(MagicT, c_int, *mut c_void) -> c_int;
type SetParamFn = unsafe extern "C" fn(MagicT, c_int, *const c_void) -> c_int;
type VersionFn = unsafe extern "C" fn() -> c_int;
type LoadBuffersFn = unsafe extern "C" fn(MagicT, *mut *mut c_void, *mut usize, usize) -> c_int;

/// Every entry point the binding uses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Symbols {
    pub(crate) open: OpenFn,
    pub(crate) close: CloseFn,
    pub(crate) error: ErrorFn,
    pub(crate) errno: ErrnoFn,
    pub(crate) setflags: SetFlagsFn,
    pub(crate) load: PathFn,
    pub(crate) compile: PathFn,
    pub(crate) check: PathFn,
    pub(crate) file: FileFn,
    pub(crate) buffer: BufferFn,
    pub(crate) descriptor: DescriptorFn,
    pub(crate) getpath: Option<GetPathFn>,
    pub(crate) getflags: Option<GetFlagsFn>,
    pub(crate) getparam: Option<GetParamFn>,
    pub(crate) setparam: Option<SetParamFn>,
    pub(crate) version: Option<VersionFn>,
    pub(crate) load_buffers: Option<LoadBuffersFn>,
}

/// Resolve a symbol from an open library.
///
/// # Safety
///
/// `handle` must come from `dlopen`, and `T` must be a function pointer type
/// matching the symbol's real signature.
unsafe fn resolve_symbol<T>(handle: *mut c_void, name: &[u8]) -> Option<T> {
    // SAFETY: handle is a live dlopen handle and name is NUL-terminated.
    let ptr = unsafe { libc::dlsym(handle, name.as_ptr() as *const c_char) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: caller guarantees T is the matching function pointer type.
        Some(unsafe { std::mem::transmute_copy(&ptr) })
    }
}

/// Text of the last `dlopen`/`dlsym` failure.
fn dl_error() -> String {
    // SAFETY: dlerror returns null or a thread-local C string.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        // SAFETY: non-null dlerror results are valid C strings.
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

/// An open libmagic and its bound entry points. Closed on drop.
#[derive(Debug)]
pub(crate) struct Loaded {
    handle: *mut c_void,
    pub(crate) name: String,
    pub(crate) symbols: Symbols,
}

// SAFETY: the dlopen handle is only used for dlclose in Drop; the function
// pointers are plain code addresses.
unsafe impl Send for Loaded {}
// SAFETY: as above; nothing in Loaded is mutated after construction.
unsafe impl Sync for Loaded {}

impl Loaded {
    /// Open the first candidate that loads and binds.
    pub(crate) fn open_any(candidates: &[String]) -> Result<Self, LoadError> {
        let mut reason = String::from("no candidates");
        for name in candidates {
            match Self::open(name) {
                Ok(loaded) => return Ok(loaded),
                Err(LoadError::NotFound { reason: r, .. }) => {
                    tracing::debug!(library = %name, reason = %r, "Candidate did not load");
                    reason = r;
                }
                Err(e) => return Err(e),
            }
        }
        Err(LoadError::NotFound {
            tried: candidates.join(", "),
            reason,
        })
    }

    pub(crate) fn open(name: &str) -> Result<Self, LoadError> {
        let c_name = CString::new(name).map_err(|_| LoadError::InvalidPath(name.to_string()))?;

        // SAFETY: c_name is a valid C string.
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(LoadError::NotFound {
                tried: name.to_string(),
                reason: dl_error(),
            });
        }

        let missing = |symbol: &'static str| {
            // SAFETY: handle came from dlopen above and is not used afterwards.
            unsafe { libc::dlclose(handle) };
            LoadError::MissingSymbol {
                library: name.to_string(),
                symbol,
            }
        };

        macro_rules! required {
            ($symbol:literal) => {
                // SAFETY: the field type this lands in matches libmagic's declaration.
                match unsafe { resolve_symbol(handle, concat!($symbol, "\0").as_bytes()) } {
                    Some(f) => f,
                    None => return Err(missing($symbol)),
                }
            };
        }

        macro_rules! optional {
            ($symbol:literal) => {
                // SAFETY: the field type this lands in matches libmagic's declaration.
                unsafe { resolve_symbol(handle, concat!($symbol, "\0").as_bytes()) }
            };
        }

        let symbols = Symbols {
            open: required!("magic_open"),
            close: required!("magic_close"),
            error: required!("magic_error"),
            errno: required!("magic_errno"),
            setflags: required!("magic_setflags"),
            load: required!("magic_load"),
            compile: required!("magic_compile"),
            check: required!("magic_check"),
            file: required!("magic_file"),
            buffer: required!("magic_buffer"),
            descriptor: required!("magic_descriptor"),
            getpath: optional!("magic_getpath"),
            getflags: optional!("magic_getflags"),
            getparam: optional!("magic_getparam"),
            setparam: optional!("magic_setparam"),
            version: optional!("magic_version"),
            load_buffers: optional!("magic_load_buffers"),
        };

        tracing::debug!(
            library = %name,
            getpath = symbols.getpath.is_some(),
            getflags = symbols.getflags.is_some(),
            parameters = symbols.getparam.is_some() && symbols.setparam.is_some(),
            version = symbols.version.is_some(),
            load_buffers = symbols.load_buffers.is_some(),
            "Bound libmagic"
        );

        Ok(Self {
            handle,
            name: name.to_string(),
            symbols,
        })
    }
}

impl Drop for Loaded {
    fn drop(&mut self) {
        // SAFETY: handle came from dlopen and every cookie holding these
        // symbols keeps this value alive.
        unsafe { libc::dlclose(self.handle) };
    }
}
