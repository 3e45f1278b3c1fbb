//! Scoped suppression of the process's standard error stream.
//!
//! The native library may print warnings straight to `stderr`. While an
//! [`ErrorOutputGuard`] is alive, file descriptor 2 points at the null device;
//! the original descriptor is kept in a close-on-exec duplicate and put back
//! on [`ErrorOutputGuard::exit`] (or on drop, if the call unwound).
//!
//! # Safety
//!
//! Descriptor 2 is process-wide. Callers must hold
//! [`SIDE_CHANNELS`](super::SIDE_CHANNELS) for the guard's whole lifetime.

use crate::error::{GuardError, GuardStage, SideChannel};
use std::ffi::c_long;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

const NULL_DEVICE: &str = "/dev/null";

unsafe extern "C" {
    /// The C library's `stderr` stream.
    #[cfg_attr(
        any(target_os = "macos", target_os = "ios", target_os = "freebsd"),
        link_name = "__stderrp"
    )]
    #[cfg_attr(
        not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")),
        link_name = "stderr"
    )]
    static C_STDERR: *mut libc::FILE;

    fn clearerr(stream: *mut libc::FILE);
}

fn c_stderr() -> *mut libc::FILE {
    // SAFETY: the C runtime initializes `stderr` before `main`; we only copy
    // the pointer value.
    unsafe { C_STDERR }
}

/// Set `FD_CLOEXEC` on a descriptor.
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl with F_GETFD/F_SETFD has no memory-safety preconditions.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Duplicate a descriptor above the standard streams, close-on-exec.
///
/// Uses `F_DUPFD_CLOEXEC` when the system has it; otherwise falls back to
/// `dup` followed by a best-effort `FD_CLOEXEC`.
pub(crate) fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: fcntl does not touch memory; a failure is reported through errno.
    let new_fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, libc::STDERR_FILENO + 1) };
    if new_fd >= 0 {
        // SAFETY: new_fd was just returned by fcntl and nothing else owns it.
        return Ok(unsafe { OwnedFd::from_raw_fd(new_fd) });
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EINVAL) {
        return Err(err);
    }

    // SAFETY: dup has no memory-safety preconditions.
    let new_fd = unsafe { libc::dup(fd) };
    if new_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    if let Err(e) = set_cloexec(new_fd) {
        tracing::debug!(fd = new_fd, error = %e, "Could not mark duplicate close-on-exec");
    }
    // SAFETY: new_fd was just returned by dup and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

/// Saved standard error state for one guarded call.
#[derive(Debug)]
pub struct ErrorOutputGuard {
    /// Duplicate of the original descriptor 2; `None` once restored.
    saved: Option<OwnedFd>,
    /// Stream position at entry, `-1` if the stream is not seekable.
    position: c_long,
}

impl ErrorOutputGuard {
    /// Point descriptor 2 at the null device, remembering the original.
    ///
    /// On error nothing has been changed and the call should proceed unmuted.
    pub fn enter() -> Result<Self, GuardError> {
        let fail = || GuardError::last_os_error(SideChannel::ErrorOutput, GuardStage::Enter);
        let stream = c_stderr();

        // SAFETY: stream is the process's stderr FILE, valid for the program's lifetime.
        let position = unsafe {
            libc::fflush(stream);
            libc::ftell(stream)
        };

        let saved = dup_cloexec(libc::STDERR_FILENO).map_err(|source| GuardError {
            channel: SideChannel::ErrorOutput,
            stage: GuardStage::Enter,
            source,
        })?;

        // std opens with O_CLOEXEC.
        let null = OpenOptions::new()
            .write(true)
            .append(true)
            .open(NULL_DEVICE)
            .map_err(|source| GuardError {
                channel: SideChannel::ErrorOutput,
                stage: GuardStage::Enter,
                source,
            })?;

        // SAFETY: both descriptors are open; dup2 replaces descriptor 2 atomically.
        if unsafe { libc::dup2(null.as_raw_fd(), libc::STDERR_FILENO) } < 0 {
            return Err(fail());
        }

        Ok(Self {
            saved: Some(saved),
            position,
        })
    }

    /// Put the original descriptor 2 back.
    pub fn exit(mut self) -> Result<(), GuardError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), GuardError> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        let fail = || GuardError::last_os_error(SideChannel::ErrorOutput, GuardStage::Exit);
        let stream = c_stderr();

        // SAFETY: stream is the process's stderr FILE.
        unsafe { libc::fflush(stream) };

        // SAFETY: saved is an open descriptor we own.
        if unsafe { libc::dup2(saved.as_raw_fd(), libc::STDERR_FILENO) } < 0 {
            let err = fail();
            // Losing the only copy of the original stream is worse than a leak.
            std::mem::forget(saved);
            return Err(err);
        }
        drop(saved);

        // SAFETY: stream is the process's stderr FILE.
        unsafe {
            clearerr(stream);
            if self.position >= 0 {
                libc::fseek(stream, self.position, libc::SEEK_SET);
            }
            if libc::setvbuf(stream, std::ptr::null_mut(), libc::_IONBF, 0) != 0 {
                return Err(fail());
            }
        }

        Ok(())
    }
}

impl Drop for ErrorOutputGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(error = %e, "Standard error was not restored");
        }
    }
}
