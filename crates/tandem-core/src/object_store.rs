//! Object store trait for evidence files.

use crate::error::Result;
use async_trait::async_trait;

/// Accepts file content plus a content type, enforces size, and returns
/// a retrievable URL. Failures are classified as `UploadFailed`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String>;
}
