//! Configuration for usability-store

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Longest redemption code a design test may carry
pub const MAX_CODE_LENGTH: usize = 12;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("usability-store")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// SQLite file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// IP address the HTTP API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request bodies above this size are rejected
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Send storage error text to clients on 500 responses (debugging only)
    #[serde(default)]
    pub expose_internal_errors: bool,

    /// Length of generated redemption codes
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

fn default_database_file() -> String {
    "survey.db".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_http_port() -> u16 {
    8095
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_code_length() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
            expose_internal_errors: false,
            code_length: default_code_length(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.database_file.trim().is_empty() {
            return Err("database_file must not be empty".to_string());
        }
        if self.code_length == 0 || self.code_length > MAX_CODE_LENGTH {
            return Err(format!(
                "code_length must be between 1 and {}",
                MAX_CODE_LENGTH
            ));
        }
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Get database file path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Socket address for the HTTP API
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }
}
