use serde::Deserialize;
use std::path::PathBuf;

/// Attachments are written below `<uploads_dir>/records`
pub const RECORDS_NAMESPACE: &str = "records";

/// Public path prefix the uploads directory is served under
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_uploads_dir")]
    pub uploads_dir: String,

    #[serde(default = "StorageConfig::default_max_upload_size")]
    pub max_upload_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            uploads_dir: StorageConfig::default_uploads_dir(),
            max_upload_size: StorageConfig::default_max_upload_size(),
        }
    }
}

impl StorageConfig {
    pub fn default_uploads_dir() -> String {
        "uploads".to_string()
    }

    // 10 MiB
    pub const fn default_max_upload_size() -> usize {
        10 * 1024 * 1024
    }

    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.uploads_dir)
    }

    pub fn records_dir(&self) -> PathBuf {
        self.uploads_dir().join(RECORDS_NAMESPACE)
    }
}
