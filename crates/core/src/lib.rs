//! magicbind - a safe, concurrent front end to the libmagic detection engine.
//!
//! This crate provides:
//! - [`Magic`], an instance owning one native handle behind its own lock
//! - [`Flags`] and [`Parameter`], the engine's configuration surface
//! - [`Detection`], the shaped result of a detection call
//! - [`MagicError`], one error type carrying the originating errno
//!
//! The engine itself is reached through the [`Library`] and [`Cookie`] traits;
//! the `magicbind-native` crate implements them over the system libmagic.
//!
//! # Side channels
//!
//! The engine may write to standard error and format output according to
//! the active locale. Unless `DEBUG` is set, every native call runs with the
//! neutral `"C"` locale, and unless `ERROR` is set, with standard error
//! pointed at the null device. Both are process-wide, so guarded calls from
//! all instances run one at a time.
//!
//! # Example
//!
//! ```rust,ignore
//! use magicbind::{Flags, Magic};
//!
//! let magic = Magic::open(magicbind_native::library()?, Flags::MIME_TYPE | Flags::SYMLINK)?;
//! assert!(magic.file("/bin/sh")?.to_string().starts_with("application/"));
//! ```

mod call;
mod engine;
mod error;
mod flags;
mod format;
mod guard;
mod handle;
mod magic;
#[cfg(test)]
mod mock;
#[cfg(feature = "tokio")]
mod nonblocking;
mod param;
mod paths;
mod state;

// Re-export main types at crate root
pub use call::GuardMode;
pub use engine::{Capabilities, Cookie, Library, NativeResult, Target};
pub use error::{GuardError, GuardStage, MagicError, Result, SideChannel};
pub use flags::Flags;
pub use format::{
    CONTINUE_SEPARATOR, Detection, ESCAPED_CONTINUE_SEPARATOR, EXTENSION_SEPARATOR,
    UNKNOWN_EXTENSION, format,
};
pub use guard::{ErrorOutputGuard, LocaleGuard, LocaleStrategy};
pub use magic::{
    Magic, MagicBuilder, do_not_auto_load, do_not_stop_on_error, set_do_not_auto_load,
    set_do_not_stop_on_error, version, version_parts, version_string,
};
pub use param::Parameter;
pub use paths::{MAGIC_ENV_VAR, PATH_SEPARATOR};
