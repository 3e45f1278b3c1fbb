//! Tunable native limits.

use crate::error::{MagicError, Result};
use std::ffi::c_int;
use std::fmt;

/// A native parameter tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum Parameter {
    /// Recursion limit for indirect magic.
    IndirMax = 0,
    /// Use count limit for name/use magic.
    NameMax = 1,
    /// Max ELF program headers processed.
    ElfPhnumMax = 2,
    /// Max ELF sections processed.
    ElfShnumMax = 3,
    /// Max ELF notes processed.
    ElfNotesMax = 4,
    /// Length limit for regex searches.
    RegexMax = 5,
    /// Max number of bytes read from a file.
    BytesMax = 6,
    /// Max number of bytes scanned for encoding detection.
    EncodingMax = 7,
    /// Max ELF section size.
    ElfShsizeMax = 8,
    /// Max number of warnings reported while parsing a database.
    MagwarnMax = 9,
}

impl Parameter {
    /// Every known parameter, in tag order.
    pub const ALL: [Self; 10] = [
        Self::IndirMax,
        Self::NameMax,
        Self::ElfPhnumMax,
        Self::ElfShnumMax,
        Self::ElfNotesMax,
        Self::RegexMax,
        Self::BytesMax,
        Self::EncodingMax,
        Self::ElfShsizeMax,
        Self::MagwarnMax,
    ];

    /// Native tag value.
    #[must_use]
    pub const fn tag(self) -> c_int {
        self as c_int
    }

    /// Upper-case name as it appears in the native header, without prefix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IndirMax => "INDIR_MAX",
            Self::NameMax => "NAME_MAX",
            Self::ElfPhnumMax => "ELF_PHNUM_MAX",
            Self::ElfShnumMax => "ELF_SHNUM_MAX",
            Self::ElfNotesMax => "ELF_NOTES_MAX",
            Self::RegexMax => "REGEX_MAX",
            Self::BytesMax => "BYTES_MAX",
            Self::EncodingMax => "ENCODING_MAX",
            Self::ElfShsizeMax => "ELF_SHSIZE_MAX",
            Self::MagwarnMax => "MAGWARN_MAX",
        }
    }

    /// Parse a name such as `bytes_max` or `PARAM_BYTES_MAX`.
    #[must_use]
    pub fn parse_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase().replace('-', "_");
        let upper = upper.strip_prefix("PARAM_").unwrap_or(&upper);
        Self::ALL.into_iter().find(|p| p.name() == upper)
    }

    /// Largest value the native layer stores without truncation.
    ///
    /// Most limits are kept in 16-bit fields; the byte-size limits are `size_t`.
    #[must_use]
    pub const fn max_value(self) -> usize {
        match self {
            Self::BytesMax | Self::ElfShsizeMax => usize::MAX,
            _ => u16::MAX as usize,
        }
    }

    /// Range-check a value before it reaches the native layer.
    pub fn validate(self, value: usize) -> Result<usize> {
        if value > self.max_value() {
            return Err(MagicError::parameter_overflow());
        }
        Ok(value)
    }
}

impl TryFrom<c_int> for Parameter {
    type Error = MagicError;

    fn try_from(tag: c_int) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.tag() == tag)
            .ok_or_else(MagicError::invalid_parameter)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PARAM_{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Parameter::IndirMax.tag(), 0);
        assert_eq!(Parameter::BytesMax.tag(), 6);
        assert_eq!(Parameter::try_from(5).unwrap(), Parameter::RegexMax);
        assert!(matches!(
            Parameter::try_from(42),
            Err(MagicError::Parameter { errno, .. }) if errno == libc::EINVAL
        ));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(Parameter::RegexMax.validate(8192).unwrap(), 8192);
        assert!(matches!(
            Parameter::ElfShnumMax.validate(usize::from(u16::MAX) + 1),
            Err(MagicError::Parameter { errno, .. }) if errno == libc::EOVERFLOW
        ));
        assert!(Parameter::BytesMax.validate(1 << 30).is_ok());
    }

    #[test]
    fn test_names() {
        assert_eq!(Parameter::parse_name("bytes_max"), Some(Parameter::BytesMax));
        assert_eq!(
            Parameter::parse_name("PARAM_ELF_NOTES_MAX"),
            Some(Parameter::ElfNotesMax)
        );
        assert_eq!(Parameter::parse_name("nope"), None);
        assert_eq!(Parameter::MagwarnMax.to_string(), "PARAM_MAGWARN_MAX");
    }
}
