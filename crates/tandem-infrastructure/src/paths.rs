//! Unified path management for Tandem data files.

use std::path::PathBuf;
use tandem_core::error::{Result, TandemError};

/// Platform path resolution for the file-backed stores.
///
/// # Directory Structure
///
/// ```text
/// <data dir>/tandem/
/// ├── sessions/     # one TOML document per session
/// └── evidence/     # uploaded dispute evidence files
/// ```
pub struct TandemPaths;

impl TandemPaths {
    /// Returns the tandem data directory (e.g. `~/.local/share/tandem`).
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("tandem"))
            .ok_or_else(|| TandemError::internal("cannot determine data directory"))
    }

    /// Returns the evidence storage directory.
    pub fn evidence_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("evidence"))
    }
}
