//! Client configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker address (host:port)
    pub broker_addr: String,

    /// Host the receiver dials for the direct connection
    pub transfer_host: String,

    /// Port the sender listens on and the receiver dials
    pub transfer_port: u16,

    /// Directory received files are written into
    pub download_dir: String,

    /// Per-operation socket deadline in seconds
    pub io_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_addr: ferry_core::DEFAULT_BROKER_ADDR.to_string(),
            transfer_host: "localhost".to_string(),
            transfer_port: ferry_core::DEFAULT_TRANSFER_PORT,
            download_dir: ".".to_string(),
            io_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// `host:port` the receiver dials for the direct connection.
    pub fn transfer_addr(&self) -> String {
        format!("{}:{}", self.transfer_host, self.transfer_port)
    }

    /// Expand ~ in download_dir path
    pub fn download_dir(&self) -> std::path::PathBuf {
        if self.download_dir.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&self.download_dir[2..]);
            }
        }
        std::path::PathBuf::from(&self.download_dir)
    }
}
