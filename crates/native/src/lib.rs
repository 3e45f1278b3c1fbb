//! magicbind-native - the system libmagic behind the magicbind engine traits.
//!
//! The library is opened at runtime, so binaries build without libmagic
//! headers and degrade gracefully on old releases: entry points a release
//! lacks show up as missing capabilities instead of link errors.
//!
//! # Library selection
//!
//! 1. `MAGICBIND_LIBRARY`, if set, names the only file tried
//! 2. Otherwise the well-known sonames in [`CANDIDATES`], in order

mod cookie;
mod error;
mod symbols;

pub use cookie::NativeLibrary;
pub use error::LoadError;

use magicbind::{Detection, Flags, Library, Magic};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Environment variable naming the libmagic file to load.
pub const LIBRARY_ENV_VAR: &str = "MAGICBIND_LIBRARY";

/// Sonames tried when [`LIBRARY_ENV_VAR`] is unset.
pub const CANDIDATES: &[&str] = &[
    "libmagic.so.1",
    "libmagic.so",
    "libmagic.1.dylib",
    "libmagic.dylib",
];

static LIBRARY: OnceLock<Result<NativeLibrary, LoadError>> = OnceLock::new();

/// Library files to try, honouring [`LIBRARY_ENV_VAR`].
#[must_use]
pub fn candidates() -> Vec<String> {
    match std::env::var(LIBRARY_ENV_VAR) {
        Ok(path) if !path.is_empty() => vec![path],
        _ => CANDIDATES.iter().map(|c| c.to_string()).collect(),
    }
}

/// The process-wide libmagic, loaded on first use.
pub fn library() -> Result<Arc<dyn Library>, LoadError> {
    let loaded = LIBRARY.get_or_init(|| NativeLibrary::open_any(&candidates()));
    match loaded {
        Ok(library) => Ok(Arc::new(library.clone())),
        Err(e) => Err(e.clone()),
    }
}

/// Identify a file with a throwaway instance, `None` on any failure.
pub fn file_type(path: impl AsRef<Path>, flags: Flags) -> Option<Detection> {
    let magic = Magic::open(library().ok()?, flags).ok()?;
    let detection = magic.file(path).ok();
    magic.close();
    detection
}

/// Identify bytes with a throwaway instance, `None` on any failure.
pub fn buffer_type(data: &[u8], flags: Flags) -> Option<Detection> {
    let magic = Magic::open(library().ok()?, flags).ok()?;
    let detection = magic.buffer(data).ok();
    magic.close();
    detection
}

#[cfg(test)]
mod tests {
    use super::*;
    use magicbind::{MagicError, Parameter};

    #[test]
    fn test_missing_library_reports_candidate() {
        let err = NativeLibrary::open("/nonexistent/libmagic.so.1").unwrap_err();
        assert!(matches!(&err, LoadError::NotFound { tried, .. } if tried.contains("nonexistent")));
        assert!(err.to_string().starts_with("could not load libmagic"));
    }

    #[test]
    fn test_open_any_tries_all() {
        let err = NativeLibrary::open_any(&["/nope/a.so".to_string(), "/nope/b.so".to_string()])
            .unwrap_err();
        assert!(matches!(&err, LoadError::NotFound { tried, .. } if tried == "/nope/a.so, /nope/b.so"));
    }

    #[test]
    fn test_invalid_path() {
        assert!(matches!(
            NativeLibrary::open("lib\0magic"),
            Err(LoadError::InvalidPath(_))
        ));
    }

    #[test]
    #[ignore = "requires libmagic on the host"]
    fn test_buffer_detection() {
        let magic = Magic::open(library().unwrap(), Flags::MIME_TYPE).unwrap();
        let detection = magic.buffer(b"%PDF-1.4\n").unwrap();
        assert_eq!(detection.as_single(), Some("application/pdf"));
    }

    #[test]
    #[ignore = "requires libmagic on the host"]
    fn test_extension_unknown_is_empty() {
        let magic = Magic::open(library().unwrap(), Flags::EXTENSION).unwrap();
        assert!(magic.buffer(&[0u8; 1]).unwrap().is_empty());
    }

    #[test]
    #[ignore = "requires libmagic on the host"]
    fn test_parameters_and_version() {
        let library = library().unwrap();
        let magic = Magic::new(library.clone()).unwrap();
        assert!(magicbind::version(library.as_ref()).unwrap() >= 500);

        magic.set_parameter(Parameter::RegexMax, 4096).unwrap();
        assert_eq!(magic.get_parameter(Parameter::RegexMax).unwrap(), 4096);
        assert!(matches!(
            magic.set_parameter(Parameter::RegexMax, 1 << 20),
            Err(MagicError::Parameter { .. })
        ));
    }

    #[test]
    #[ignore = "requires libmagic on the host"]
    fn test_missing_file_fallback() {
        let library = library().unwrap();
        let magic = Magic::builder(library).stop_on_errors(false).open().unwrap();
        let detection = magic.file("/nonexistent/file").unwrap();
        assert!(detection.to_string().contains("No such file"));
    }

    #[test]
    #[ignore = "requires libmagic on the host"]
    fn test_file_type_helper() {
        let detection = file_type("/bin/sh", Flags::MIME_TYPE | Flags::SYMLINK).unwrap();
        assert!(detection.to_string().starts_with("application/"));
    }
}
