use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use beatlight::analysis::{DecomposeConfig, SpectrumConfig};
use beatlight::detect::DetectionParams;
use beatlight::dispatch::DispatchConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: SpectrumConfig,
    #[serde(default)]
    pub bands: DecomposeConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

#[derive(Debug, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(flatten)]
    pub params: DetectionParams,
}

#[derive(Debug, Deserialize)]
pub struct DispatchSection {
    #[serde(default)]
    pub device_url: Option<String>,
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,
    #[serde(flatten)]
    pub pulses: DispatchConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            params: DetectionParams::default(),
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            device_url: None,
            device_timeout_ms: default_device_timeout_ms(),
            pulses: DispatchConfig::default(),
        }
    }
}

fn default_engine() -> String { "spectral-flux".into() }
fn default_device_timeout_ms() -> u64 { 500 }

/// Explicit path first, then `./beatlight.toml`, the XDG-style
/// `~/.config/beatlight/config.toml`, and the platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("beatlight.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatlight").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatlight").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
