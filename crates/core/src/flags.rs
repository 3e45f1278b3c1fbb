//! Native flag bitmask.
//!
//! Values match the native library header exactly, so a [`Flags`] value can
//! be handed to the native layer without translation.

use crate::error::{MagicError, Result};
use bitflags::bitflags;
use std::ffi::c_int;

bitflags! {
    /// Flags controlling how the native library detects and reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: c_int {
        /// Print debugging messages to standard error.
        const DEBUG = 0x000_0001;
        /// Follow symbolic links.
        const SYMLINK = 0x000_0002;
        /// Look inside compressed files.
        const COMPRESS = 0x000_0004;
        /// Open block and character devices and look at their contents.
        const DEVICES = 0x000_0008;
        /// Return a MIME type instead of a textual description.
        const MIME_TYPE = 0x000_0010;
        /// Return all matches, not just the first.
        const CONTINUE = 0x000_0020;
        /// Check the database for consistency, printing warnings to standard error.
        const CHECK = 0x000_0040;
        /// Try to preserve the access time of inspected files.
        const PRESERVE_ATIME = 0x000_0080;
        /// Do not convert unprintable characters to octal.
        const RAW = 0x000_0100;
        /// Treat OS errors while opening files as real errors.
        const ERROR = 0x000_0200;
        /// Return a MIME encoding instead of a textual description.
        const MIME_ENCODING = 0x000_0400;
        /// Return the Apple creator and type.
        const APPLE = 0x000_0800;
        /// Do not look inside compressed files.
        const NO_CHECK_COMPRESS = 0x000_1000;
        /// Do not look inside tar archives.
        const NO_CHECK_TAR = 0x000_2000;
        /// Do not consult the loaded databases.
        const NO_CHECK_SOFT = 0x000_4000;
        /// Do not check for EMX application types.
        const NO_CHECK_APPTYPE = 0x000_8000;
        /// Do not examine ELF details.
        const NO_CHECK_ELF = 0x001_0000;
        /// Do not check for text files.
        const NO_CHECK_TEXT = 0x002_0000;
        /// Do not check for CDF files.
        const NO_CHECK_CDF = 0x004_0000;
        /// Do not check for CSV files.
        const NO_CHECK_CSV = 0x008_0000;
        /// Do not look for known tokens inside text files.
        const NO_CHECK_TOKENS = 0x010_0000;
        /// Do not check text encodings.
        const NO_CHECK_ENCODING = 0x020_0000;
        /// Do not check for JSON files.
        const NO_CHECK_JSON = 0x040_0000;
        /// Do not check for SIMH tape files.
        const NO_CHECK_SIMH = 0x080_0000;
        /// Return a slash-separated list of extensions.
        const EXTENSION = 0x100_0000;
        /// Report only on the uncompressed data.
        const COMPRESS_TRANSP = 0x200_0000;
        /// Do not fork to decompress.
        const NO_COMPRESS_FORK = 0x400_0000;

        /// Both MIME type and MIME encoding.
        const MIME = Self::MIME_TYPE.bits() | Self::MIME_ENCODING.bits();
        /// Any output mode other than a textual description.
        const NODESC = Self::EXTENSION.bits() | Self::MIME.bits() | Self::APPLE.bits();
        /// Same as `NO_CHECK_TEXT`.
        const NO_CHECK_ASCII = Self::NO_CHECK_TEXT.bits();
        /// Skip every built-in test and only consult the databases.
        const NO_CHECK_BUILTIN = Self::NO_CHECK_COMPRESS.bits()
            | Self::NO_CHECK_TAR.bits()
            | Self::NO_CHECK_APPTYPE.bits()
            | Self::NO_CHECK_ELF.bits()
            | Self::NO_CHECK_TEXT.bits()
            | Self::NO_CHECK_CSV.bits()
            | Self::NO_CHECK_CDF.bits()
            | Self::NO_CHECK_TOKENS.bits()
            | Self::NO_CHECK_ENCODING.bits()
            | Self::NO_CHECK_JSON.bits()
            | Self::NO_CHECK_SIMH.bits();
    }
}

impl Flags {
    /// No special handling.
    pub const NONE: Self = Self::empty();

    /// Largest value the native layer accepts.
    pub const MAX: c_int = 0x0fff_ffff;

    /// Range-check a raw mask before it reaches the native layer.
    ///
    /// Unknown bits inside the valid range are kept, since newer native
    /// releases add flags this crate may not name yet.
    pub fn validate(raw: c_int) -> Result<Self> {
        if !(0..=Self::MAX).contains(&raw) {
            return Err(MagicError::invalid_flags());
        }
        Ok(Self::from_bits_retain(raw))
    }

    /// Whether the flags ask for native diagnostics on standard error.
    #[must_use]
    pub fn is_diagnostic(self) -> bool {
        self.intersects(Self::DEBUG | Self::CHECK)
    }

    /// Decompose into single-bit components, highest bit first.
    #[must_use]
    pub fn split(self) -> Vec<Self> {
        let mut bits = self.bits();
        let mut parts = Vec::new();
        while bits > 0 {
            let top = 1 << (c_int::BITS - 1 - bits.leading_zeros());
            parts.push(Self::from_bits_retain(top));
            bits &= !top;
        }
        parts
    }

    /// Parse a flag by name, case-insensitively, accepting `NONE`.
    #[must_use]
    pub fn parse_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase().replace('-', "_");
        if upper == "NONE" {
            return Some(Self::NONE);
        }
        Self::from_name(&upper)
    }
}

impl TryFrom<c_int> for Flags {
    type Error = MagicError;

    fn try_from(raw: c_int) -> Result<Self> {
        Self::validate(raw)
    }
}

impl TryFrom<i64> for Flags {
    type Error = MagicError;

    fn try_from(raw: i64) -> Result<Self> {
        let raw = c_int::try_from(raw).map_err(|_| MagicError::invalid_flags())?;
        Self::validate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_values() {
        assert_eq!(Flags::MIME.bits(), 0x410);
        assert_eq!(Flags::EXTENSION.bits(), 0x100_0000);
        assert_eq!(Flags::NONE.bits(), 0);
        assert!(Flags::NODESC.contains(Flags::APPLE));
        assert!(Flags::NO_CHECK_BUILTIN.contains(Flags::NO_CHECK_JSON));
        assert!(!Flags::NO_CHECK_BUILTIN.contains(Flags::NO_CHECK_SOFT));
    }

    #[test]
    fn test_validate_range() {
        assert_eq!(Flags::validate(0).unwrap(), Flags::NONE);
        assert_eq!(Flags::validate(Flags::MAX).unwrap().bits(), Flags::MAX);
        assert!(matches!(
            Flags::validate(-1),
            Err(MagicError::Flags { errno, .. }) if errno == libc::EINVAL
        ));
        assert!(Flags::validate(Flags::MAX + 1).is_err());
        assert!(Flags::try_from(i64::from(c_int::MAX) + 1).is_err());
    }

    #[test]
    fn test_split() {
        let parts = Flags::MIME.split();
        assert_eq!(parts, vec![Flags::MIME_ENCODING, Flags::MIME_TYPE]);
        assert!(Flags::NONE.split().is_empty());
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(Flags::parse_name("mime-type"), Some(Flags::MIME_TYPE));
        assert_eq!(Flags::parse_name("NONE"), Some(Flags::NONE));
        assert_eq!(Flags::parse_name("CONTINUE"), Some(Flags::CONTINUE));
        assert_eq!(Flags::parse_name("bogus"), None);
    }

    #[test]
    fn test_diagnostic() {
        assert!(Flags::DEBUG.is_diagnostic());
        assert!((Flags::CHECK | Flags::MIME).is_diagnostic());
        assert!(!Flags::MIME.is_diagnostic());
    }
}
