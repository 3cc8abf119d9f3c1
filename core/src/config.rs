use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "as_default_log_path")]
    pub path: PathBuf,

    /// Console filter directive, overridden by `RUST_LOG`.
    #[serde(default = "as_default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_enabled: false,
            path: as_default_log_path(),
            level: as_default_log_level(),
        }
    }
}

fn as_default_log_path() -> PathBuf {
    PathBuf::from("api_tool.log")
}

fn as_default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// e.g. `http://namenode:9870/webhdfs/v1`
    pub base_url: String,

    /// Sent as `user.name` on every request.
    pub username: Option<String>,

    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,

    #[serde(default)]
    pub log: LogConfig,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            username: None,
            token: None,
            log: LogConfig::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ApiError> {
        toml::from_str(content).map_err(|e| ApiError::Decode(format!("invalid client config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ApiError::local_io(path, e))?;
        Self::from_toml_str(&content)
    }
}
