use log::warn;
use sdfs_lib::{SdfsError, SdfsResult, DATA_NODE_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataNodeConfig {
    pub listen_addr: String,
    /// Directory holding one file per block.
    pub block_dir: PathBuf,
}

impl Default for DataNodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DATA_NODE_PORT),
            block_dir: PathBuf::from("datanode-blocks"),
        }
    }
}

impl DataNodeConfig {
    pub async fn load_or_init(path: &Path) -> SdfsResult<Self> {
        if !path.exists() {
            let config = Self::default();
            let body = serde_json::to_string_pretty(&config)
                .map_err(|e| SdfsError::Internal(e.to_string()))?;
            fs::write(path, body)
                .await
                .map_err(|e| SdfsError::IoError(format!("write config failed: {}", e)))?;
            return Ok(config);
        }
        let body = fs::read_to_string(path).await.map_err(|e| {
            warn!("read datanode config failed: {}", e);
            SdfsError::IoError(format!("read config failed: {}", e))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("parse datanode config failed: {}", e);
            SdfsError::DecodeError(format!("config invalid: {}", e))
        })
    }
}
