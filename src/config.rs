use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Reconciliation direction. `UploadOnly` and `DownloadOnly` never touch the
/// opposite side's tombstones; `SyncTwoWay` breaks ties on modification time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    UploadOnly,
    DownloadOnly,
    SyncTwoWay,
}

impl SyncMode {
    pub fn uploads(self) -> bool {
        matches!(self, SyncMode::UploadOnly | SyncMode::SyncTwoWay)
    }

    pub fn downloads(self) -> bool {
        matches!(self, SyncMode::DownloadOnly | SyncMode::SyncTwoWay)
    }
}

/// Recognized configuration options for a single sync pair.
///
/// Loading this from a file, CLI flags, or environment variables is the
/// host's responsibility; this struct only models and validates the shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    pub local_folder_path: PathBuf,
    pub pan_folder_path: String,
    pub drive_id: String,
    pub mode: SyncMode,
    pub file_download_parallel: usize,
    pub file_upload_parallel: usize,
    pub file_download_block_size: u64,
    pub file_upload_block_size: u64,
    pub max_download_rate: u64,
    pub max_upload_rate: u64,
    pub use_internal_url: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_folder_path: PathBuf::new(),
            pan_folder_path: String::new(),
            drive_id: String::new(),
            mode: SyncMode::SyncTwoWay,
            file_download_parallel: 2,
            file_upload_parallel: 2,
            file_download_block_size: 4 * 1024 * 1024,
            file_upload_block_size: 4 * 1024 * 1024,
            max_download_rate: 0,
            max_upload_rate: 0,
            use_internal_url: false,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.local_folder_path.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig(
                "local_folder_path must not be empty".into(),
            ));
        }
        if !self.local_folder_path.is_absolute() {
            return Err(SyncError::InvalidConfig(
                "local_folder_path must be absolute".into(),
            ));
        }
        let remote = clean_remote(&self.pan_folder_path);
        if remote.is_empty() || remote == "/" {
            return Err(SyncError::InvalidConfig(
                "pan_folder_path must not be the remote root".into(),
            ));
        }
        if self.file_download_parallel == 0 || self.file_upload_parallel == 0 {
            return Err(SyncError::InvalidConfig(
                "parallelism fields must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn clean_remote(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SyncConfig {
        SyncConfig {
            local_folder_path: PathBuf::from("/home/user/docs"),
            pan_folder_path: "/docs".into(),
            drive_id: "drive-1".into(),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_relative_local_root() {
        let mut config = base_config();
        config.local_folder_path = PathBuf::from("relative/path");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_the_remote_root_itself() {
        let mut config = base_config();
        config.pan_folder_path = "/".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_parallelism() {
        let mut config = base_config();
        config.file_upload_parallel = 0;
        assert!(config.validate().is_err());
    }
}
