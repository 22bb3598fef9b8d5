//! Server configuration and shared request parameters

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use utoipa::IntoParams;

use crate::EncryptionService;

const ENCRYPTION_KEY_FILE: &str = "encryption_key";

/// Resolved configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub encryption_key: String,
}

impl ServerConfig {
    /// Build the configuration, loading or generating the encryption key.
    ///
    /// An explicit key wins; otherwise the key stored in `data_dir` is used,
    /// and a new one is written there on first start.
    pub fn new(
        address: String,
        database_url: String,
        data_dir: PathBuf,
        encryption_key: Option<String>,
    ) -> anyhow::Result<Self> {
        fs::create_dir_all(&data_dir)?;

        let encryption_key = match encryption_key {
            Some(key) => key,
            None => Self::load_or_generate_key(&data_dir)?,
        };

        // Fail at startup rather than on the first provider write
        EncryptionService::new(&encryption_key)?;

        Ok(Self {
            address,
            database_url,
            data_dir,
            encryption_key,
        })
    }

    fn load_or_generate_key(data_dir: &Path) -> anyhow::Result<String> {
        let path = data_dir.join(ENCRYPTION_KEY_FILE);
        if path.exists() {
            debug!("Loading encryption key from {}", path.display());
            return Ok(fs::read_to_string(&path)?.trim().to_string());
        }

        let key = EncryptionService::generate_hex_key();
        fs::write(&path, &key)?;
        info!("Generated new encryption key at {}", path.display());
        Ok(key)
    }
}

/// Common pagination parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Items per page (max 100)
    pub page_size: Option<u64>,
}

impl PaginationParams {
    pub fn normalize(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).clamp(1, 100);
        (page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamps() {
        assert_eq!(PaginationParams::default().normalize(), (1, 20));

        let params = PaginationParams {
            page: Some(0),
            page_size: Some(500),
        };
        assert_eq!(params.normalize(), (1, 100));

        let params = PaginationParams {
            page: Some(3),
            page_size: Some(0),
        };
        assert_eq!(params.normalize(), (3, 1));
    }

    #[test]
    fn test_server_config_generates_and_reuses_key() {
        let dir = tempfile::tempdir().unwrap();

        let first = ServerConfig::new(
            "127.0.0.1:3000".to_string(),
            "sqlite::memory:".to_string(),
            dir.path().to_path_buf(),
            None,
        )
        .unwrap();
        assert_eq!(first.encryption_key.len(), 64);

        let second = ServerConfig::new(
            "127.0.0.1:3000".to_string(),
            "sqlite::memory:".to_string(),
            dir.path().to_path_buf(),
            None,
        )
        .unwrap();
        assert_eq!(first.encryption_key, second.encryption_key);
    }

    #[test]
    fn test_server_config_rejects_bad_explicit_key() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerConfig::new(
            "127.0.0.1:3000".to_string(),
            "sqlite::memory:".to_string(),
            dir.path().to_path_buf(),
            Some("too-short".to_string()),
        );
        assert!(result.is_err());
    }
}
