//! Save/restore pairs around process-wide side channels.
//!
//! Both channels are global to the process, not to an instance: two
//! instances running guarded calls at the same time would fight over them.
//! Every guarded call therefore holds [`SIDE_CHANNELS`] for its whole
//! duration, which serializes guarded calls across all instances. Instance
//! locks are always taken before this one.

mod locale;
mod stderr;

pub use locale::{LocaleGuard, LocaleStrategy};
pub use stderr::ErrorOutputGuard;

use parking_lot::Mutex;

/// Serializes every guarded native call in the process.
pub(crate) static SIDE_CHANNELS: Mutex<()> = Mutex::new(());
