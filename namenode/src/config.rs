use log::warn;
use sdfs_lib::{SdfsError, SdfsResult, DATA_NODE_PORT, NAME_NODE_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NameNodeConfig {
    /// Address the request server listens on.
    pub listen_addr: String,
    /// Directory holding the fsimage and free-pool snapshots.
    pub meta_dir: PathBuf,
    /// The single datanode every new block descriptor points at.
    pub data_node_addr: String,
}

impl Default for NameNodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", NAME_NODE_PORT),
            meta_dir: PathBuf::from("namenode-meta"),
            data_node_addr: format!("127.0.0.1:{}", DATA_NODE_PORT),
        }
    }
}

impl NameNodeConfig {
    /// Load the config file, writing the defaults on first run.
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
            warn!("read namenode config failed: {}", e);
            SdfsError::IoError(format!("read config failed: {}", e))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("parse namenode config failed: {}", e);
            SdfsError::DecodeError(format!("config invalid: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_first_run_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("namenode.json");
        let config = NameNodeConfig::load_or_init(&path).await.unwrap();
        assert_eq!(config.listen_addr, format!("0.0.0.0:{}", NAME_NODE_PORT));
        assert!(path.exists());

        let reloaded = NameNodeConfig::load_or_init(&path).await.unwrap();
        assert_eq!(reloaded.meta_dir, config.meta_dir);
    }
}
