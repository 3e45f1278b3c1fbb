//! The boundary to the native detection engine.
//!
//! The core never links against the engine directly. A [`Library`] hands out
//! [`Cookie`]s, one per open detection context, and the core drives them
//! through the call wrapper. Failures come back the way the engine reports
//! them: a status code, a null result, or an errno.

use crate::flags::Flags;
use crate::param::Parameter;
use std::ffi::{CStr, c_int};
use std::os::fd::RawFd;

/// Errno-carrying result of a capability-gated native call.
///
/// `Err(ENOSYS)` means the linked engine does not provide the entry point.
pub type NativeResult<T> = std::result::Result<T, c_int>;

/// Process-level entry points of the engine.
pub trait Library: Send + Sync + 'static {
    /// Open a new detection context. `Err` carries the errno.
    fn open(&self, flags: Flags) -> NativeResult<Box<dyn Cookie>>;

    /// Colon-separated default database paths.
    ///
    /// The engine is expected to honour the `MAGIC` environment variable here.
    fn default_path(&self) -> Option<String>;

    /// Engine version as a single integer (e.g. `545` for 5.45).
    fn version(&self) -> NativeResult<c_int>;
}

/// One open native detection context.
///
/// Not safe for concurrent use; the core only touches a cookie while holding
/// the owning instance's lock. Dropping the cookie closes it.
pub trait Cookie: Send {
    /// Text of the last error, if any.
    fn error(&self) -> Option<String>;

    /// Errno of the last error, `0` if none.
    fn errno(&self) -> c_int;

    fn get_param(&self, tag: c_int) -> NativeResult<usize>;

    fn set_param(&mut self, tag: c_int, value: usize) -> NativeResult<()>;

    fn get_flags(&self) -> NativeResult<Flags>;

    fn set_flags(&mut self, flags: Flags) -> NativeResult<()>;

    /// Load databases; `None` means the engine's defaults. Returns the native status.
    fn load(&mut self, paths: Option<&CStr>) -> c_int;

    /// Load databases from memory. `Err(ENOSYS)` if unsupported.
    ///
    /// The engine keeps pointers into `buffers` and reads them on every later
    /// detection. The caller must keep them alive and unchanged until the
    /// cookie is dropped or loads again.
    fn load_buffers(&mut self, buffers: &[&[u8]]) -> NativeResult<c_int>;

    fn compile(&mut self, paths: Option<&CStr>) -> c_int;

    fn check(&mut self, paths: Option<&CStr>) -> c_int;

    fn file(&mut self, path: &CStr) -> Option<String>;

    fn buffer(&mut self, data: &[u8]) -> Option<String>;

    fn descriptor(&mut self, fd: RawFd) -> Option<String>;
}

/// What the engine behind an open handle supports, queried once at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Engine version, if the engine reports one.
    pub version: Option<c_int>,
    /// `get_param`/`set_param` are available.
    pub parameters: bool,
    /// `get_flags` is available.
    pub get_flags: bool,
    /// `load_buffers` is available.
    pub load_buffers: bool,
}

impl Capabilities {
    /// Ask a freshly opened cookie what it supports.
    pub(crate) fn query(library: &dyn Library, cookie: &dyn Cookie) -> Self {
        let version = library.version().ok();
        let parameters = cookie.get_param(Parameter::IndirMax.tag()) != Err(libc::ENOSYS);
        let get_flags = cookie.get_flags() != Err(libc::ENOSYS);
        // Versions before 5.13 predate in-memory loading.
        let load_buffers = version.is_none_or(|v| v >= 513);

        Self {
            version,
            parameters,
            get_flags,
            load_buffers,
        }
    }
}

/// What a detection call inspects.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A filesystem path.
    Path(&'a CStr),
    /// An open file descriptor.
    Descriptor(RawFd),
    /// Bytes in memory.
    Buffer(&'a [u8]),
}

impl Target<'_> {
    /// Whether the engine performs I/O of its own for this target.
    #[must_use]
    pub fn does_io(&self) -> bool {
        !matches!(self, Self::Buffer(_))
    }
}

/// A single native call, tagged by kind.
#[derive(Debug)]
pub(crate) enum Request<'a> {
    Load(Option<&'a CStr>),
    LoadBuffers(&'a [&'a [u8]]),
    Compile(Option<&'a CStr>),
    Check(Option<&'a CStr>),
    Detect(Target<'a>),
}

impl Request<'_> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Load(_) => "load",
            Self::LoadBuffers(_) => "load_buffers",
            Self::Compile(_) => "compile",
            Self::Check(_) => "check",
            Self::Detect(Target::Path(_)) => "file",
            Self::Detect(Target::Descriptor(_)) => "descriptor",
            Self::Detect(Target::Buffer(_)) => "buffer",
        }
    }
}

/// Normalized shape of a native call's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
    /// Status-returning call; negative means failure.
    Status(c_int),
    /// Text-returning call; `None` means the engine returned null.
    Text(Option<String>),
    /// Capability-gated call the engine refused without running, with its errno.
    Refused(c_int),
}

impl Response {
    pub(crate) fn status(&self) -> c_int {
        match self {
            Self::Status(status) => *status,
            Self::Text(Some(_)) => 0,
            Self::Text(None) | Self::Refused(_) => -1,
        }
    }

    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => text,
            Self::Status(_) | Self::Refused(_) => None,
        }
    }
}

/// Dispatch a request to the cookie.
pub(crate) fn dispatch(cookie: &mut dyn Cookie, request: &Request<'_>) -> Response {
    match *request {
        Request::Load(paths) => Response::Status(cookie.load(paths)),
        Request::LoadBuffers(buffers) => match cookie.load_buffers(buffers) {
            Ok(status) => Response::Status(status),
            Err(errno) => Response::Refused(errno),
        },
        Request::Compile(paths) => Response::Status(cookie.compile(paths)),
        Request::Check(paths) => Response::Status(cookie.check(paths)),
        Request::Detect(Target::Path(path)) => Response::Text(cookie.file(path)),
        Request::Detect(Target::Descriptor(fd)) => Response::Text(cookie.descriptor(fd)),
        Request::Detect(Target::Buffer(data)) => Response::Text(cookie.buffer(data)),
    }
}
