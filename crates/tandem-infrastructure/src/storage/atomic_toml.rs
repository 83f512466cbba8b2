//! Atomic TOML file operations.
//!
//! A thin layer for safe concurrent access to one TOML document per
//! file: tmp-file + fsync + atomic rename for writes, an fs2 advisory
//! lock for read-modify-write transactions. This is what lets the
//! file-backed repositories honor the same compare-and-save contract as
//! the in-memory store.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tandem_core::error::{Result, TandemError};

use serde::{Serialize, de::DeserializeOwned};

/// A handle to one atomically updated TOML document.
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the document. A missing or empty file is
    /// `None`.
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let data: T = toml::from_str(&content)?;
        Ok(Some(data))
    }

    /// Serializes and writes the document atomically (tmp + fsync +
    /// rename).
    pub fn save(&self, data: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Removes the document. Missing files are fine.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs a read-modify-write transaction under an exclusive file
    /// lock.
    ///
    /// The closure receives the current document (`None` if absent) and
    /// returns the state to persist plus a result for the caller:
    /// `Some(next)` writes `next` back, `None` leaves the file as-is.
    /// Errors from the closure abort the transaction without writing.
    pub fn transact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(Option<T>) -> Result<(Option<T>, R)>,
    {
        let _lock = FileLock::acquire(&self.path)?;
        let current = self.load()?;
        let (next, result) = f(current)?;
        if let Some(next) = next {
            self.save(&next)?;
        }
        Ok(result)
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| TandemError::internal("path has no parent directory"))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| TandemError::internal("path has no file name"))?;
        let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
        Ok(parent.join(tmp_name))
    }
}

/// A file lock guard that releases on drop.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive().map_err(|e| {
                TandemError::transient(format!("failed to acquire file lock: {}", e))
            })?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock is automatic when the handle drops; the lock file
        // removal is best effort.
        let _ = fs::remove_file(&self.lock_path);
    }
}
