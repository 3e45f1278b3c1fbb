//! Cached configuration and the policy around it.
//!
//! Flags, database paths and the error policy live next to the cookie inside
//! the instance lock. The operations here decide what a native outcome means:
//! `load` and `compile` raise, `check` answers `false`, detection falls back
//! to the engine's error text when asked to keep going.

use crate::engine::{Request, Response, Target};
use crate::error::{MagicError, Result};
use crate::flags::Flags;
use crate::format::{self, Detection};
use crate::handle::Session;
use crate::paths;
use std::ffi::{CStr, CString};

/// Per-instance settings, guarded by the instance lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Configuration {
    /// Flags every call runs with; kept even when the engine cannot report them.
    pub(crate) flags: Flags,
    /// Databases from the last successful load.
    pub(crate) paths: Vec<String>,
    /// Raise instead of falling back to the engine's error text.
    pub(crate) stop_on_errors: bool,
    /// The diagnostic-output warning was already emitted.
    pub(crate) warned_diagnostic: bool,
}

impl Configuration {
    pub(crate) fn new(stop_on_errors: bool) -> Self {
        Self {
            stop_on_errors,
            ..Self::default()
        }
    }
}

impl Session<'_> {
    /// Cached paths, re-resolved from the engine's defaults when none are
    /// cached or `MAGIC` is set.
    pub(crate) fn paths(&mut self) -> Vec<String> {
        if self.config.paths.is_empty() || paths::env_override() {
            self.config.paths = self
                .library
                .default_path()
                .map(|list| paths::split(&list))
                .unwrap_or_default();
        }
        self.config.paths.clone()
    }

    /// Load databases. `None` loads the engine's default list.
    pub(crate) fn load(&mut self, list: Option<CString>) -> Result<Vec<String>> {
        let list = match list {
            Some(list) => Some(list),
            None => self
                .library
                .default_path()
                .and_then(|path| CString::new(path).ok()),
        };
        let flags = self.config.flags;
        let status = self.call(flags, &Request::Load(list.as_deref())).status();
        if status < 0 {
            self.mark_loaded(false);
            return Err(self.last_error());
        }

        self.config.paths = list
            .as_deref()
            .map(|l| paths::split(&l.to_string_lossy()))
            .unwrap_or_default();
        // The engine dropped any in-memory databases when it loaded these.
        self.databases.clear();
        self.mark_loaded(true);
        tracing::debug!(paths = ?self.config.paths, "Loaded databases");
        Ok(self.config.paths.clone())
    }

    /// Load databases already in memory.
    ///
    /// The engine reads `databases` in place for as long as they stay loaded,
    /// so they are kept in the instance until the next load or close.
    pub(crate) fn load_buffers(&mut self, databases: Vec<Box<[u8]>>) -> Result<()> {
        if !self.capabilities.load_buffers {
            return Err(MagicError::not_implemented());
        }
        let views: Vec<&[u8]> = databases.iter().map(|d| &d[..]).collect();
        let flags = self.config.flags;
        let response = self.call(flags, &Request::LoadBuffers(&views));
        drop(views);
        if let Response::Refused(errno) = response {
            // Nothing was loaded; the engine still reads the previous databases.
            return Err(match errno {
                libc::ENOSYS => MagicError::not_implemented(),
                _ => self.last_error(),
            });
        }

        let count = databases.len();
        // The engine released the previous set before reading this one.
        *self.databases = databases;
        if response.status() < 0 {
            self.mark_loaded(false);
            return Err(self.last_error());
        }
        self.config.paths.clear();
        self.mark_loaded(true);
        tracing::debug!(count, "Loaded databases from memory");
        Ok(())
    }

    /// Compile databases; failure is an error.
    pub(crate) fn compile(&mut self, list: &CStr) -> Result<()> {
        let flags = self.config.flags;
        if self.call(flags, &Request::Compile(Some(list))).status() < 0 {
            return Err(self.last_error());
        }
        Ok(())
    }

    /// Validate databases; failure is `false`.
    pub(crate) fn check(&mut self, list: &CStr) -> bool {
        let flags = self.config.flags;
        self.call(flags, &Request::Check(Some(list))).status() >= 0
    }

    /// Hand new flags to the engine and cache them on success.
    pub(crate) fn apply_flags(&mut self, flags: Flags) -> Result<()> {
        if flags.is_diagnostic() && !self.config.warned_diagnostic {
            tracing::warn!(
                flags = flags.bits(),
                "DEBUG or CHECK set; the engine will write diagnostics to standard error"
            );
            self.config.warned_diagnostic = true;
        }
        self.set_native_flags(flags)?;
        self.config.flags = flags;
        Ok(())
    }

    /// Detect and shape the result.
    pub(crate) fn detect(&mut self, target: Target<'_>) -> Result<Detection> {
        let flags = self.config.flags;
        // Splitting matches needs the unescaped separator.
        let raw_needed = flags.contains(Flags::CONTINUE)
            && !flags.intersects(Flags::RAW | Flags::EXTENSION);
        let effective = if raw_needed { flags | Flags::RAW } else { flags };

        if raw_needed {
            self.set_native_flags(effective)?;
        }
        let text = self.call(effective, &Request::Detect(target)).into_text();
        if raw_needed {
            self.set_native_flags(flags)?;
        }

        match text {
            Some(raw) => Ok(format::format(raw, flags, false)),
            None => self.detect_failed(target, flags),
        }
    }

    fn detect_failed(&self, target: Target<'_>, flags: Flags) -> Result<Detection> {
        let keep_going = matches!(target, Target::Path(_))
            && !flags.contains(Flags::ERROR)
            && !self.config.stop_on_errors;
        if !keep_going {
            return Err(self.last_error());
        }

        match self.cookie.error().filter(|m| !m.is_empty()) {
            Some(message) => {
                tracing::debug!(%message, "Detection failed, using error text as result");
                Ok(format::format(message, flags, true))
            }
            None => Err(MagicError::unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleManager;
    use crate::mock::{DEFAULT_PATH, MockLibrary, MockOptions};
    use std::sync::Arc;

    fn manager(options: MockOptions, config: Configuration) -> (Arc<MockLibrary>, HandleManager) {
        let library = Arc::new(MockLibrary::new(options));
        let manager = HandleManager::open(library.clone(), config).unwrap();
        (library, manager)
    }

    #[test]
    fn test_load_default_paths() {
        let (library, manager) = manager(MockOptions::default(), Configuration::default());
        let loaded = manager.with_lock(|s| s.load(None)).unwrap();
        assert_eq!(loaded, ["/etc/magic", "/usr/share/misc/magic"]);
        assert!(manager.is_loaded());
        assert_eq!(library.path_args(), [Some(DEFAULT_PATH.to_string())]);
    }

    #[test]
    fn test_load_failure_clears_loaded() {
        let (_library, manager) = manager(
            MockOptions {
                fail_load: true,
                error: Some("could not find any valid magic files!".into()),
                errno: libc::ENOENT,
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        let err = manager.with_lock(|s| s.load(None)).unwrap_err();
        assert_eq!(err.to_string(), "could not find any valid magic files!");
        assert_eq!(err.errno(), libc::ENOENT);
        assert!(!manager.is_loaded());
    }

    #[test]
    fn test_apply_flags_caches() {
        let (_library, manager) = manager(
            MockOptions {
                get_flags: false,
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        manager
            .with_lock(|s| s.apply_flags(Flags::MIME_TYPE))
            .unwrap();
        let flags = manager.with_lock(|s| s.native_flags()).unwrap();
        assert_eq!(flags, Flags::MIME_TYPE);
    }

    #[test]
    fn test_diagnostic_warning_once() {
        let (_library, manager) = manager(MockOptions::default(), Configuration::default());
        manager.with_lock(|s| s.apply_flags(Flags::CHECK)).unwrap();
        assert!(manager.with_lock(|s| Ok(s.config.warned_diagnostic)).unwrap());
    }

    #[test]
    fn test_continue_forces_raw_transiently() {
        let (library, manager) = manager(
            MockOptions {
                result: Some("text1\n- text2".into()),
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        manager.with_lock(|s| s.apply_flags(Flags::CONTINUE)).unwrap();
        let detection = manager
            .with_lock(|s| s.detect(Target::Buffer(b"data")))
            .unwrap();

        assert_eq!(detection.into_vec(), ["text1", "text2"]);
        assert_eq!(library.detect_flags(), [Flags::CONTINUE | Flags::RAW]);
        let restored = manager.with_lock(|s| s.native_flags()).unwrap();
        assert_eq!(restored, Flags::CONTINUE);
    }

    #[test]
    fn test_file_falls_back_to_error_text() {
        let (_library, manager) = manager(
            MockOptions {
                result: None,
                error: Some("cannot open `/nope' (No such file or directory)".into()),
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        let detection = manager
            .with_lock(|s| s.detect(Target::Path(c"/nope")))
            .unwrap();
        assert_eq!(
            detection.as_single(),
            Some("cannot open `/nope' (No such file or directory)")
        );
    }

    #[test]
    fn test_file_fallback_without_text_is_unknown() {
        let (_library, manager) = manager(
            MockOptions {
                result: None,
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        let err = manager
            .with_lock(|s| s.detect(Target::Path(c"/nope")))
            .unwrap_err();
        assert!(matches!(err, MagicError::Magic { .. }));
        assert_eq!(err.errno(), libc::EINVAL);
    }

    #[test]
    fn test_stop_on_errors_raises() {
        let (_library, manager) = manager(
            MockOptions {
                result: None,
                error: Some("cannot open".into()),
                errno: libc::ENOENT,
                ..MockOptions::default()
            },
            Configuration::new(true),
        );
        let err = manager
            .with_lock(|s| s.detect(Target::Path(c"/nope")))
            .unwrap_err();
        assert!(matches!(err, MagicError::Library { errno, .. } if errno == libc::ENOENT));
    }

    #[test]
    fn test_buffer_failure_raises() {
        let (_library, manager) = manager(
            MockOptions {
                result: None,
                error: Some("bad buffer".into()),
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        let err = manager
            .with_lock(|s| s.detect(Target::Buffer(b"")))
            .unwrap_err();
        assert_eq!(err.to_string(), "bad buffer");
    }

    #[test]
    fn test_load_buffers_keeps_databases_alive() {
        let (library, manager) = manager(MockOptions::default(), Configuration::default());
        let database: Box<[u8]> = b"0 string x X".as_slice().into();
        let address = database.as_ptr() as usize;

        manager
            .with_lock(|s| s.load_buffers(vec![database]))
            .unwrap();
        assert_eq!(library.buffer_addresses(), [address]);
        let held = manager
            .with_lock(|s| Ok(s.databases.iter().map(|d| d.as_ptr() as usize).collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(held, [address]);

        manager.with_lock(|s| s.load(None)).unwrap();
        assert!(manager.with_lock(|s| Ok(s.databases.is_empty())).unwrap());
    }

    #[test]
    fn test_refused_load_buffers_leaves_state_alone() {
        let (_library, manager) = manager(
            MockOptions {
                version: None,
                load_buffers: false,
                ..MockOptions::default()
            },
            Configuration::default(),
        );
        manager.with_lock(|s| s.load(None)).unwrap();

        let err = manager
            .with_lock(|s| s.load_buffers(vec![b"x".as_slice().into()]))
            .unwrap_err();
        assert!(matches!(err, MagicError::NotImplemented { .. }));
        assert!(manager.is_loaded());
        assert!(manager.with_lock(|s| Ok(s.databases.is_empty())).unwrap());
    }

    #[test]
    fn test_paths_resolve_from_defaults() {
        let (_library, manager) = manager(MockOptions::default(), Configuration::default());
        let resolved = manager.with_lock(|s| Ok(s.paths())).unwrap();
        assert_eq!(resolved, ["/etc/magic", "/usr/share/misc/magic"]);
    }
}
