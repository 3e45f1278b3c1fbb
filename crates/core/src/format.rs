//! Shaping raw detection output.
//!
//! The engine answers with a single string. Depending on the flags that
//! string may hold several matches or several extensions, or a sentinel
//! that means "no idea".

use crate::flags::Flags;
use std::fmt;

/// Separator between matches when `CONTINUE` and `RAW` are set.
pub const CONTINUE_SEPARATOR: &str = "\n- ";

/// The same separator after the engine escaped the newline (no `RAW`).
pub const ESCAPED_CONTINUE_SEPARATOR: &str = "\\012- ";

/// Separator between extensions when `EXTENSION` is set.
pub const EXTENSION_SEPARATOR: char = '/';

/// What the engine returns for `EXTENSION` when it knows none.
pub const UNKNOWN_EXTENSION: &str = "???";

/// A shaped detection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The engine had no answer.
    Empty,
    /// Exactly one answer.
    Single(String),
    /// More than one match or extension, in engine order.
    Multiple(Vec<String>),
}

impl Detection {
    /// The answer if there is exactly one.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            _ => None,
        }
    }

    /// The first answer, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Single(s) => Some(s),
            Self::Multiple(all) => all.first().map(String::as_str),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Every answer as a list; empty for [`Detection::Empty`].
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(s) => vec![s],
            Self::Multiple(all) => all,
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Single(s) => f.write_str(s),
            Self::Multiple(all) => f.write_str(&all.join(CONTINUE_SEPARATOR)),
        }
    }
}

fn collapse(mut parts: Vec<String>) -> Detection {
    match parts.len() {
        0 => Detection::Empty,
        1 => Detection::Single(parts.remove(0)),
        _ => Detection::Multiple(parts),
    }
}

/// Shape `raw` according to the flags the call ran with.
///
/// `EXTENSION` wins over `CONTINUE` when both are set. `io_failed` marks a
/// result that is really an error string; it is returned untouched when
/// extensions were requested.
#[must_use]
pub fn format(raw: String, flags: Flags, io_failed: bool) -> Detection {
    if flags.contains(Flags::EXTENSION) {
        if io_failed {
            return Detection::Single(raw);
        }
        if raw.trim() == UNKNOWN_EXTENSION {
            return Detection::Empty;
        }
        let parts = raw
            .split(EXTENSION_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect();
        return collapse(parts);
    }

    if flags.contains(Flags::CONTINUE) {
        let parts = raw
            .split(CONTINUE_SEPARATOR)
            .flat_map(|part| part.split(ESCAPED_CONTINUE_SEPARATOR))
            .map(|part| part.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect();
        return collapse(parts);
    }

    Detection::Single(raw)
}
