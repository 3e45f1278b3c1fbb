//! Errors raised while loading the native library.

use thiserror::Error;

/// Failure to find or bind libmagic.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// None of the candidate files could be opened.
    #[error("could not load libmagic (tried {tried}): {reason}")]
    NotFound {
        /// Comma-separated candidates.
        tried: String,
        /// `dlerror` text for the last attempt.
        reason: String,
    },

    /// The library opened but lacks an entry point every version has.
    #[error("libmagic at {library} has no symbol {symbol}")]
    MissingSymbol {
        library: String,
        symbol: &'static str,
    },

    /// The path given in the environment is not a valid C string.
    #[error("invalid library path: {0}")]
    InvalidPath(String),
}
