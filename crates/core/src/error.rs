//! Error types for the binding core.
//!
//! Every error carries the errno that caused it (or `-1` when the native
//! library did not report one), so callers can branch on it without parsing
//! messages.

use std::io;
use thiserror::Error;

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, MagicError>;

/// Message used when nothing better is known.
pub(crate) const UNKNOWN_MESSAGE: &str = "an unknown error has occurred";

/// Error type for all operations on a [`Magic`](crate::Magic) instance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MagicError {
    /// The native handle could not be allocated.
    #[error("cannot allocate memory")]
    Resource {
        /// Errno reported by the allocation.
        errno: i32,
    },

    /// The native library reported a failure.
    #[error("{message}")]
    Library {
        /// Text from the native error buffer.
        message: String,
        /// Errno from the native handle, `-1` if unknown.
        errno: i32,
    },

    /// Operation attempted on a closed handle.
    #[error("Magic library is not open")]
    NotOpen,

    /// Detection attempted before any database was loaded.
    #[error("Magic library not loaded")]
    NotLoaded,

    /// Invalid flag value, or the native layer rejected the flags.
    #[error("{message}")]
    Flags {
        /// Human-readable reason.
        message: &'static str,
        /// Errno (`EINVAL` for range failures).
        errno: i32,
    },

    /// Invalid parameter tag or value.
    #[error("{message}")]
    Parameter {
        /// Human-readable reason.
        message: &'static str,
        /// Errno (`EINVAL` for unknown tags, `EOVERFLOW` for values out of range).
        errno: i32,
    },

    /// The linked native library lacks this capability.
    #[error("{message}")]
    NotImplemented {
        /// What is missing.
        message: &'static str,
    },

    /// Wrong argument shape from the caller.
    #[error("{0}")]
    Argument(String),

    /// A detection call produced no answer at all.
    #[error("{message}")]
    Magic {
        /// Human-readable reason.
        message: String,
        /// Errno, `-1` if unknown.
        errno: i32,
    },

    /// Saving or restoring a process-wide side channel failed.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// IO error while preparing a detection target.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl MagicError {
    /// The errno associated with this error, or `-1` when unknown.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Resource { errno }
            | Self::Library { errno, .. }
            | Self::Flags { errno, .. }
            | Self::Parameter { errno, .. }
            | Self::Magic { errno, .. } => *errno,
            Self::NotOpen | Self::NotLoaded => libc::EFAULT,
            Self::NotImplemented { .. } => libc::ENOSYS,
            Self::Argument(_) => libc::EINVAL,
            Self::Guard(e) => e.errno(),
            Self::Io(e) => e.raw_os_error().unwrap_or(-1),
        }
    }

    pub(crate) fn library_initialize(errno: i32) -> Self {
        Self::Library {
            message: "failed to initialize Magic library".to_string(),
            errno,
        }
    }

    pub(crate) fn invalid_flags() -> Self {
        Self::Flags {
            message: "unknown or invalid flag specified",
            errno: libc::EINVAL,
        }
    }

    pub(crate) fn flag_not_implemented() -> Self {
        Self::NotImplemented {
            message: "flag is not implemented",
        }
    }

    pub(crate) fn invalid_parameter() -> Self {
        Self::Parameter {
            message: "unknown or invalid parameter specified",
            errno: libc::EINVAL,
        }
    }

    pub(crate) fn parameter_overflow() -> Self {
        Self::Parameter {
            message: "invalid parameter value specified",
            errno: libc::EOVERFLOW,
        }
    }

    pub(crate) fn not_implemented() -> Self {
        Self::NotImplemented {
            message: "function is not implemented",
        }
    }

    pub(crate) fn empty_arguments() -> Self {
        Self::Argument("arguments list cannot be empty (expected array of String)".to_string())
    }

    pub(crate) fn unknown() -> Self {
        Self::Magic {
            message: UNKNOWN_MESSAGE.to_string(),
            errno: libc::EINVAL,
        }
    }
}

/// Which side channel a [`GuardError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideChannel {
    /// The process's standard error stream.
    ErrorOutput,
    /// The active locale.
    Locale,
}

/// Which half of a save/restore pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    /// Saving state and installing the override.
    Enter,
    /// Putting the saved state back.
    Exit,
}

/// Failure to override or restore a process-wide side channel.
#[derive(Debug, Error)]
#[error("failed to {verb} {channel}: {source}", verb = stage_verb(.stage), channel = channel_name(.channel))]
pub struct GuardError {
    /// Side channel involved.
    pub channel: SideChannel,
    /// Whether entering or exiting failed.
    pub stage: GuardStage,
    /// Underlying OS error.
    #[source]
    pub source: io::Error,
}

impl GuardError {
    pub(crate) fn last_os_error(channel: SideChannel, stage: GuardStage) -> Self {
        Self {
            channel,
            stage,
            source: io::Error::last_os_error(),
        }
    }

    /// Errno of the underlying OS error, `-1` if none.
    #[must_use]
    pub fn errno(&self) -> i32 {
        self.source.raw_os_error().unwrap_or(-1)
    }
}

fn stage_verb(stage: &GuardStage) -> &'static str {
    match stage {
        GuardStage::Enter => "override",
        GuardStage::Exit => "restore",
    }
}

fn channel_name(channel: &SideChannel) -> &'static str {
    match channel {
        SideChannel::ErrorOutput => "error output",
        SideChannel::Locale => "locale",
    }
}
