use serde::Deserialize;

/// Where uploaded files live and how large they may be.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the blob store. Default: "./data/uploads".
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Disk name recorded on attachment rows. Default: "local".
    #[serde(default = "default_disk")]
    pub disk: String,
    /// Upper bound for a single upload in bytes. Default: 20 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_storage_path() -> String {
    "./data/uploads".into()
}
fn default_disk() -> String {
    "local".into()
}
fn default_max_blob_size() -> u64 {
    20 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            disk: default_disk(),
            max_blob_size: default_max_blob_size(),
        }
    }
}
