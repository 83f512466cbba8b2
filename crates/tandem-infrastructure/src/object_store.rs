//! Filesystem-backed object store for dispute evidence.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tandem_core::dispute::{ALLOWED_EVIDENCE_TYPES, MAX_EVIDENCE_BYTES};
use tandem_core::error::{Result, TandemError};
use tandem_core::object_store::ObjectStore;
use uuid::Uuid;

/// Stores uploaded files under a base directory and hands back
/// `file://` URLs. Enforces the evidence MIME whitelist and size cap
/// before touching the disk.
pub struct FsObjectStore {
    base_dir: PathBuf,
}

impl FsObjectStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Creates a store at the platform default evidence location.
    pub fn default_location() -> Result<Self> {
        Self::new(crate::paths::TandemPaths::evidence_dir()?)
    }

    fn check(&self, name: &str, content_type: &str, len: usize) -> Result<()> {
        // Trust the declared type when present; fall back to the file
        // extension for clients that do not set one.
        let effective = if content_type.is_empty() {
            mime_guess::from_path(name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        } else {
            content_type.to_string()
        };
        if !ALLOWED_EVIDENCE_TYPES.contains(&effective.as_str()) {
            return Err(TandemError::validation(format!(
                "content type '{effective}' is not allowed"
            )));
        }
        if len > MAX_EVIDENCE_BYTES {
            return Err(TandemError::validation(format!(
                "file '{name}' exceeds the 10MB limit"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        self.check(name, content_type, bytes.len())?;

        // Flatten the client-supplied name; only its extension survives.
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.base_dir.join(&stored_name);

        fs::write(&path, &bytes)
            .map_err(|e| TandemError::UploadFailed(format!("writing '{name}': {e}")))?;

        Ok(format!("file://{}", path.display()))
    }
}
