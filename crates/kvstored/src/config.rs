//! Server configuration.
//!
//! Resolution order: defaults → config file (`$KVSTORED_CONFIG` or
//! `~/.config/kvstored/config.toml`) → environment (`KVSTORED_*`) → CLI
//! flags (highest precedence, applied by the caller after `ServerConfig::load`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub db_file: PathBuf,
    pub capacity: usize,
    pub workers: usize,
    pub backlog: u32,
    pub auto_save: bool,
    pub daemonize: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 6391,
            db_file: data_dir().join("kvstored.db"),
            capacity: 1024,
            workers: 0, // 0 = let tokio pick (num_cpus)
            backlog: 1024,
            auto_save: true,
            daemonize: false,
            log_file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("kvstored")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
        .join("kvstored")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

impl ServerConfig {
    /// Loads configuration: defaults → file → `KVSTORED_*` env overrides.
    /// CLI flags are applied afterward by the caller, since they take the
    /// highest precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ServerConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn file_path() -> PathBuf {
        std::env::var("KVSTORED_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KVSTORED_BIND") {
            self.bind = v;
        }
        if let Ok(v) = std::env::var("KVSTORED_PORT") {
            if let Ok(p) = v.parse() {
                self.port = p;
            }
        }
        if let Ok(v) = std::env::var("KVSTORED_DB_FILE") {
            self.db_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("KVSTORED_CAPACITY") {
            if let Ok(c) = v.parse() {
                self.capacity = c;
            }
        }
        if let Ok(v) = std::env::var("KVSTORED_WORKERS") {
            if let Ok(w) = v.parse() {
                self.workers = w;
            }
        }
        if let Ok(v) = std::env::var("KVSTORED_BACKLOG") {
            if let Ok(b) = v.parse() {
                self.backlog = b;
            }
        }
        if let Ok(v) = std::env::var("KVSTORED_AUTO_SAVE") {
            self.auto_save = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("KVSTORED_DAEMONIZE") {
            self.daemonize = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("KVSTORED_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
    }
}
