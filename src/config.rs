//! On-disk configuration, persisted as `<data_dir>/config.json`.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DISCOVERY_PORT_DEFAULT: u16 = 49221;
pub const LISTEN_PORT_DEFAULT: u16 = 49222;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device_name: String,
    pub download_dir: PathBuf,
    pub allow_incoming: bool,
    pub listen_port: u16,
    pub discovery_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            download_dir: default_download_dir(),
            allow_incoming: true,
            listen_port: LISTEN_PORT_DEFAULT,
            discovery_port: DISCOVERY_PORT_DEFAULT,
        }
    }
}

impl Config {
    /// Load `<data_dir>/config.json`, falling back to defaults for any
    /// field missing from an existing file and for a missing file entirely.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.json");
        let cfg = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => merge_defaults(value),
                Err(_) => Config::default(),
            },
            Err(_) => Config::default(),
        };
        std::fs::create_dir_all(&cfg.download_dir)
            .with_context(|| format!("creating download dir {}", cfg.download_dir.display()))?;
        Ok(cfg)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

fn merge_defaults(value: serde_json::Value) -> Config {
    let defaults = serde_json::to_value(Config {
        device_name: default_device_name(),
        download_dir: default_download_dir(),
        allow_incoming: true,
        listen_port: LISTEN_PORT_DEFAULT,
        discovery_port: DISCOVERY_PORT_DEFAULT,
    })
    .expect("Config always serializes");
    let mut merged = defaults;
    if let (Some(merged_map), Some(value_map)) = (merged.as_object_mut(), value.as_object()) {
        for (k, v) in value_map {
            merged_map.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(merged).unwrap_or_else(|_| Config {
        device_name: default_device_name(),
        download_dir: default_download_dir(),
        allow_incoming: true,
        listen_port: LISTEN_PORT_DEFAULT,
        discovery_port: DISCOVERY_PORT_DEFAULT,
    })
}

fn default_device_name() -> String {
    let raw = std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "FIshare".to_string());
    raw.chars().take(32).collect()
}

fn default_download_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("Downloads").join("FIshare")
}
