//! Local filesystem [`FileStore`] for host builds.
//!
//! `LocalFileStore` implements `platform::FileStore` using `std::fs`.
//! Used when the `std` feature is enabled (host tools and tests only).
//! FatFs-style drive prefixes (`"0:/"`) are stripped and the remainder is
//! resolved relative to the root provided at construction.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::storage::{FileStore, WriteMode};

/// Error type for local filesystem operations.
#[derive(Debug)]
pub struct LocalStorageError(pub std::io::Error);

impl core::fmt::Display for LocalStorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "local storage error: {}", self.0)
    }
}

impl std::error::Error for LocalStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// A `platform::FileStore` implementation backed by `std::fs`.
///
/// # Example
/// ```no_run
/// # async fn example() {
/// use platform::storage_local::LocalFileStore;
/// use platform::{FileStore, WriteMode};
/// let mut store = LocalFileStore::new("/tmp/volume0");
/// store.write_file("0:/hello.txt", b"hi", WriteMode::CreateAlways).await.unwrap();
/// # }
/// ```
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a new store rooted at `root`.
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self { root: PathBuf::from(root) }
    }

    /// Create from the `VOLUME_ROOT` environment variable.
    ///
    /// Returns `None` if `VOLUME_ROOT` is not set or is not valid UTF-8.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var("VOLUME_ROOT").ok().map(|p| Self::new(&p))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(strip_drive(path))
    }
}

/// Drop a leading `"<digit>:"` drive and any leading slashes.
fn strip_drive(path: &str) -> &str {
    let rest = match path.split_once(':') {
        Some((drive, rest)) if !drive.is_empty() && drive.bytes().all(|b| b.is_ascii_digit()) => {
            rest
        }
        _ => path,
    };
    rest.trim_start_matches('/')
}

impl FileStore for LocalFileStore {
    type Error = LocalStorageError;

    async fn write_file(
        &mut self,
        path: &str,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize, Self::Error> {
        let full = self.resolve(path);
        let mut options = fs::OpenOptions::new();
        options.write(true);
        match mode {
            WriteMode::CreateAlways => options.create(true).truncate(true),
            WriteMode::CreateNew => options.create_new(true),
        };
        let mut file = options.open(&full).map_err(LocalStorageError)?;
        file.write_all(data).map_err(LocalStorageError)?;
        file.flush().map_err(LocalStorageError)?;
        Ok(data.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn drive_prefix_is_stripped() {
        assert_eq!(strip_drive("0:/testusb.TXT"), "testusb.TXT");
        assert_eq!(strip_drive("1:log.txt"), "log.txt");
        assert_eq!(strip_drive("/plain.txt"), "plain.txt");
        assert_eq!(strip_drive("dir/a:b"), "dir/a:b");
    }

    #[tokio::test]
    async fn create_always_writes_whole_buffer() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalFileStore::new(tmp.path().to_str().unwrap());
        let n = store
            .write_file("0:/marker.txt", b"hello world", WriteMode::CreateAlways)
            .await
            .unwrap();
        assert_eq!(n, 11);
        assert_eq!(fs::read(tmp.path().join("marker.txt")).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn create_always_truncates_existing_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("t.txt"), b"a much longer previous body").unwrap();
        let mut store = LocalFileStore::new(tmp.path().to_str().unwrap());
        store.write_file("t.txt", b"short", WriteMode::CreateAlways).await.unwrap();
        assert_eq!(fs::read(tmp.path().join("t.txt")).unwrap(), b"short");
    }

    #[tokio::test]
    async fn create_new_refuses_existing_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("n.txt"), b"x").unwrap();
        let mut store = LocalFileStore::new(tmp.path().to_str().unwrap());
        let err = store.write_file("n.txt", b"y", WriteMode::CreateNew).await.unwrap_err();
        assert_eq!(err.0.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalFileStore::new(tmp.path().join("absent").to_str().unwrap());
        assert!(store.write_file("x.txt", b"y", WriteMode::CreateAlways).await.is_err());
    }
}
