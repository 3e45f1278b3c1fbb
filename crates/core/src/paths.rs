//! Database path lists.
//!
//! The engine takes several database paths as one colon-separated string.
//! The `MAGIC` environment variable replaces the compiled-in default list.

use crate::error::{MagicError, Result};
use std::ffi::CString;

/// Environment variable that overrides the default database paths.
pub const MAGIC_ENV_VAR: &str = "MAGIC";

/// Separator in native path lists.
pub const PATH_SEPARATOR: char = ':';

/// Whether `MAGIC` is set, which forces the default paths to be re-resolved.
#[must_use]
pub fn env_override() -> bool {
    std::env::var_os(MAGIC_ENV_VAR).is_some_and(|v| !v.is_empty())
}

/// Split a native path list, dropping empty entries.
#[must_use]
pub fn split(list: &str) -> Vec<String> {
    list.split(PATH_SEPARATOR)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Join paths into the native list format.
///
/// The list must not be empty and no entry may contain a NUL byte.
pub fn join<S: AsRef<str>>(paths: &[S]) -> Result<CString> {
    if paths.is_empty() {
        return Err(MagicError::empty_arguments());
    }
    let joined = paths
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string());
    CString::new(joined)
        .map_err(|_| MagicError::Argument("path contains a NUL byte".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        assert_eq!(
            split("/etc/magic:/usr/share/misc/magic"),
            ["/etc/magic", "/usr/share/misc/magic"]
        );
        assert_eq!(split("/etc/magic::"), ["/etc/magic"]);
        assert!(split("").is_empty());
    }

    #[test]
    fn test_join() {
        let joined = join(&["/etc/magic", "/usr/share/misc/magic"]).unwrap();
        assert_eq!(joined.as_bytes(), b"/etc/magic:/usr/share/misc/magic");
    }

    #[test]
    fn test_join_rejects_bad_input() {
        let empty: [&str; 0] = [];
        assert!(matches!(join(&empty), Err(MagicError::Argument(_))));
        assert!(matches!(join(&["a\0b"]), Err(MagicError::Argument(_))));
    }

    #[test]
    fn test_env_var_constant() {
        assert_eq!(MAGIC_ENV_VAR, "MAGIC");
    }
}
