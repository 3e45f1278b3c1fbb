//! Async variants of the long-running calls.
//!
//! Each one moves the native call onto tokio's blocking pool so other tasks
//! keep running meanwhile. The engine cannot be cancelled: dropping the
//! future does not stop a call that already started.

use crate::error::{MagicError, Result};
use crate::format::Detection;
use crate::magic::Magic;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

impl Magic {
    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Magic) -> Result<R> + Send + 'static,
    {
        let magic = self.clone();
        match tokio::task::spawn_blocking(move || f(&magic)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(MagicError::Io(io::Error::other(e))),
        }
    }

    pub async fn file_async(&self, path: impl Into<PathBuf>) -> Result<Detection> {
        let path = path.into();
        self.blocking(move |magic| magic.file(&path)).await
    }

    pub async fn buffer_async(&self, data: impl Into<Vec<u8>>) -> Result<Detection> {
        let data = data.into();
        self.blocking(move |magic| magic.buffer(&data)).await
    }

    /// The descriptor is kept open until the call finishes, then dropped.
    pub async fn descriptor_async<F>(&self, fd: F) -> Result<Detection>
    where
        F: AsRawFd + Send + 'static,
    {
        self.blocking(move |magic| magic.descriptor(&fd)).await
    }

    /// Load the given databases. An empty list is an argument error, as with
    /// [`Magic::load`].
    pub async fn load_async(&self, paths: Vec<String>) -> Result<Vec<String>> {
        self.blocking(move |magic| magic.load(&paths)).await
    }

    pub async fn load_default_async(&self) -> Result<Vec<String>> {
        self.blocking(Magic::load_default).await
    }

    pub async fn compile_async(&self, paths: Vec<String>) -> Result<()> {
        self.blocking(move |magic| magic.compile(&paths)).await
    }

    pub async fn check_async(&self, paths: Vec<String>) -> Result<bool> {
        self.blocking(move |magic| magic.check(&paths)).await
    }
}

#[cfg(test)]
mod tests {
    use crate::error::MagicError;
    use crate::magic::Magic;
    use crate::mock::{MockLibrary, MockOptions};
    use std::sync::Arc;
    use std::time::Duration;

    fn open(options: MockOptions) -> (Arc<MockLibrary>, Magic) {
        let library = Arc::new(MockLibrary::new(options));
        let magic = Magic::builder(library.clone())
            .auto_load(true)
            .stop_on_errors(true)
            .open()
            .unwrap();
        (library, magic)
    }

    #[tokio::test]
    async fn test_buffer_async() {
        let (_library, magic) = open(MockOptions::default());
        let detection = magic.buffer_async(b"hello".to_vec()).await.unwrap();
        assert_eq!(detection.as_single(), Some("ASCII text"));
    }

    #[tokio::test]
    async fn test_check_and_compile_async() {
        let (library, magic) = open(MockOptions {
            fail_compile: true,
            error: Some("compile failed".into()),
            ..MockOptions::default()
        });
        assert!(magic.check_async(vec!["/etc/magic".into()]).await.unwrap());
        let err = magic
            .compile_async(vec!["/etc/magic".into()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "compile failed");
        assert_eq!(library.calls("compile"), 1);
    }

    #[tokio::test]
    async fn test_load_async_defaults() {
        let (_library, magic) = open(MockOptions::default());
        let paths = magic.load_default_async().await.unwrap();
        assert_eq!(paths, ["/etc/magic", "/usr/share/misc/magic"]);
    }

    #[tokio::test]
    async fn test_load_async_matches_load() {
        let (library, magic) = open(MockOptions::default());
        let loads = library.calls("load");

        assert!(matches!(
            magic.load_async(Vec::new()).await,
            Err(MagicError::Argument(_))
        ));
        assert!(matches!(magic.load(&[] as &[&str]), Err(MagicError::Argument(_))));
        assert_eq!(library.calls("load"), loads);

        let paths = magic.load_async(vec!["/opt/magic.mgc".into()]).await.unwrap();
        assert_eq!(paths, ["/opt/magic.mgc"]);
    }

    #[tokio::test]
    async fn test_closed_async() {
        let (_library, magic) = open(MockOptions::default());
        magic.close();
        assert!(matches!(
            magic.file_async("/etc/hosts").await,
            Err(MagicError::NotOpen)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_other_tasks_progress_during_call() {
        let (_library, magic) = open(MockOptions {
            delay: Duration::from_millis(200),
            ..MockOptions::default()
        });

        let ticker = tokio::spawn(async {
            let mut ticks = 0;
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
                ticks += 1;
            }
            ticks
        });
        let detection = magic.buffer_async(b"slow".to_vec()).await.unwrap();

        assert!(ticker.is_finished());
        assert_eq!(ticker.await.unwrap(), 5);
        assert!(!detection.is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_resumed() {
        let (_library, magic) = open(MockOptions {
            panic_on: Some("buffer"),
            ..MockOptions::default()
        });
        let task = tokio::spawn(async move { magic.buffer_async(b"x".to_vec()).await });
        assert!(task.await.unwrap_err().is_panic());
    }
}
