//! In-memory engine for tests.
//!
//! Counts every native call by name, notices when two calls overlap, and can
//! be told to fail, panic, or pretend to be an older engine.

use crate::engine::{Cookie, Library, NativeResult};
use crate::flags::Flags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{CStr, c_int};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const DEFAULT_PATH: &str = "/etc/magic:/usr/share/misc/magic";

#[derive(Debug, Clone)]
pub(crate) struct MockOptions {
    /// `get_param`/`set_param` exist.
    pub parameters: bool,
    /// `get_flags` exists.
    pub get_flags: bool,
    /// `load_buffers` exists.
    pub load_buffers: bool,
    pub version: Option<c_int>,
    pub default_path: Option<String>,
    /// Make `open` fail with this errno.
    pub open_errno: Option<c_int>,
    /// Text the engine reports after a failing call.
    pub error: Option<String>,
    pub errno: c_int,
    pub fail_load: bool,
    pub fail_compile: bool,
    pub fail_check: bool,
    /// Flags the engine refuses with `EINVAL`.
    pub rejected_flags: Flags,
    /// What detection returns; `None` means null.
    pub result: Option<String>,
    /// Panic inside the named call.
    pub panic_on: Option<&'static str>,
    /// Time spent inside every call, to widen overlap windows.
    pub delay: Duration,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            parameters: true,
            get_flags: true,
            load_buffers: true,
            version: Some(545),
            default_path: Some(DEFAULT_PATH.to_string()),
            open_errno: None,
            error: None,
            errno: 0,
            fail_load: false,
            fail_compile: false,
            fail_check: false,
            rejected_flags: Flags::empty(),
            result: Some("ASCII text".to_string()),
            panic_on: None,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Mutex<HashMap<&'static str, usize>>,
    active: AtomicUsize,
    overlaps: AtomicUsize,
    /// Cookie flags at the moment of each detection call.
    detect_flags: Mutex<Vec<Flags>>,
    /// Path argument of each load/compile/check call.
    path_args: Mutex<Vec<Option<String>>>,
    /// Address of every buffer handed to a successful `load_buffers`.
    buffer_addresses: Mutex<Vec<usize>>,
}

struct CallScope<'a>(&'a Recorder);

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Recorder {
    fn enter(&self, name: &'static str, options: &MockOptions) -> CallScope<'_> {
        *self.calls.lock().entry(name).or_default() += 1;
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let scope = CallScope(self);
        if !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
        if options.panic_on == Some(name) {
            panic!("injected fault in {name}");
        }
        scope
    }
}

#[derive(Debug)]
pub(crate) struct MockLibrary {
    options: MockOptions,
    recorder: Arc<Recorder>,
}

impl MockLibrary {
    pub(crate) fn new(options: MockOptions) -> Self {
        Self {
            options,
            recorder: Arc::default(),
        }
    }

    /// Number of calls made to the named entry point.
    pub(crate) fn calls(&self, name: &str) -> usize {
        self.recorder.calls.lock().get(name).copied().unwrap_or(0)
    }

    /// Number of calls across every entry point.
    pub(crate) fn total_calls(&self) -> usize {
        self.recorder.calls.lock().values().sum()
    }

    /// Calls that started while another was still running.
    pub(crate) fn overlaps(&self) -> usize {
        self.recorder.overlaps.load(Ordering::SeqCst)
    }

    pub(crate) fn detect_flags(&self) -> Vec<Flags> {
        self.recorder.detect_flags.lock().clone()
    }

    pub(crate) fn path_args(&self) -> Vec<Option<String>> {
        self.recorder.path_args.lock().clone()
    }

    pub(crate) fn buffer_addresses(&self) -> Vec<usize> {
        self.recorder.buffer_addresses.lock().clone()
    }

    /// Calls currently running, including a cookie being closed.
    pub(crate) fn in_flight(&self) -> usize {
        self.recorder.active.load(Ordering::SeqCst)
    }
}

impl Library for MockLibrary {
    fn open(&self, flags: Flags) -> NativeResult<Box<dyn Cookie>> {
        let _call = self.recorder.enter("open", &self.options);
        if let Some(errno) = self.options.open_errno {
            return Err(errno);
        }
        Ok(Box::new(MockCookie {
            options: self.options.clone(),
            recorder: Arc::clone(&self.recorder),
            flags,
            params: HashMap::new(),
            last_error: None,
            last_errno: 0,
        }))
    }

    fn default_path(&self) -> Option<String> {
        self.options.default_path.clone()
    }

    fn version(&self) -> NativeResult<c_int> {
        self.options.version.ok_or(libc::ENOSYS)
    }
}

struct MockCookie {
    options: MockOptions,
    recorder: Arc<Recorder>,
    flags: Flags,
    params: HashMap<c_int, usize>,
    last_error: Option<String>,
    last_errno: c_int,
}

impl MockCookie {
    fn fail(&mut self) {
        self.last_error = self.options.error.clone();
        self.last_errno = self.options.errno;
    }

    fn status(&mut self, name: &'static str, paths: Option<&CStr>, failing: bool) -> c_int {
        let recorder = Arc::clone(&self.recorder);
        let _call = recorder.enter(name, &self.options);
        recorder
            .path_args
            .lock()
            .push(paths.map(|p| p.to_string_lossy().into_owned()));
        if failing {
            self.fail();
            return -1;
        }
        0
    }

    fn detect(&mut self, name: &'static str) -> Option<String> {
        let recorder = Arc::clone(&self.recorder);
        let _call = recorder.enter(name, &self.options);
        recorder.detect_flags.lock().push(self.flags);
        if self.options.result.is_none() {
            self.fail();
        }
        self.options.result.clone()
    }
}

impl Drop for MockCookie {
    fn drop(&mut self) {
        let _call = self.recorder.enter("close", &self.options);
    }
}

impl Cookie for MockCookie {
    fn error(&self) -> Option<String> {
        let _call = self.recorder.enter("error", &self.options);
        self.last_error.clone()
    }

    fn errno(&self) -> c_int {
        let _call = self.recorder.enter("errno", &self.options);
        self.last_errno
    }

    fn get_param(&self, tag: c_int) -> NativeResult<usize> {
        let _call = self.recorder.enter("get_param", &self.options);
        if !self.options.parameters {
            return Err(libc::ENOSYS);
        }
        if !(0..=9).contains(&tag) {
            return Err(libc::EINVAL);
        }
        Ok(self.params.get(&tag).copied().unwrap_or(64))
    }

    fn set_param(&mut self, tag: c_int, value: usize) -> NativeResult<()> {
        let _call = self.recorder.enter("set_param", &self.options);
        if !self.options.parameters {
            return Err(libc::ENOSYS);
        }
        if !(0..=9).contains(&tag) {
            return Err(libc::EINVAL);
        }
        self.params.insert(tag, value);
        Ok(())
    }

    fn get_flags(&self) -> NativeResult<Flags> {
        let _call = self.recorder.enter("get_flags", &self.options);
        if !self.options.get_flags {
            return Err(libc::ENOSYS);
        }
        Ok(self.flags)
    }

    fn set_flags(&mut self, flags: Flags) -> NativeResult<()> {
        let _call = self.recorder.enter("set_flags", &self.options);
        if flags.intersects(self.options.rejected_flags) {
            return Err(libc::EINVAL);
        }
        self.flags = flags;
        Ok(())
    }

    fn load(&mut self, paths: Option<&CStr>) -> c_int {
        let failing = self.options.fail_load;
        self.status("load", paths, failing)
    }

    fn load_buffers(&mut self, buffers: &[&[u8]]) -> NativeResult<c_int> {
        let recorder = Arc::clone(&self.recorder);
        let _call = recorder.enter("load_buffers", &self.options);
        if !self.options.load_buffers {
            return Err(libc::ENOSYS);
        }
        if self.options.fail_load || buffers.iter().any(|b| b.is_empty()) {
            self.fail();
            return Ok(-1);
        }
        recorder
            .buffer_addresses
            .lock()
            .extend(buffers.iter().map(|b| b.as_ptr() as usize));
        Ok(0)
    }

    fn compile(&mut self, paths: Option<&CStr>) -> c_int {
        let failing = self.options.fail_compile;
        self.status("compile", paths, failing)
    }

    fn check(&mut self, paths: Option<&CStr>) -> c_int {
        let failing = self.options.fail_check;
        self.status("check", paths, failing)
    }

    fn file(&mut self, _path: &CStr) -> Option<String> {
        self.detect("file")
    }

    fn buffer(&mut self, _data: &[u8]) -> Option<String> {
        self.detect("buffer")
    }

    fn descriptor(&mut self, _fd: RawFd) -> Option<String> {
        self.detect("descriptor")
    }
}
