//! Configuration Management
//!
//! Handles persistent configuration storage for tcloud.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Region used when neither the CLI nor the config names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Page size used when the config does not set one
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Regions listed by default
    #[serde(default)]
    pub regions: Vec<String>,
    /// Region used for single-region calls
    #[serde(default)]
    pub default_region: Option<String>,
    /// Items per page for paginated listings
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Block all write operations
    #[serde(default)]
    pub readonly: bool,
    /// Last viewed resource (`service/kind`)
    #[serde(default)]
    pub last_resource: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tcloud").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config {:?}", path))?;

        Ok(())
    }

    /// Get effective regions (CLI > config > default region)
    pub fn effective_regions(&self, cli: &[String]) -> Vec<String> {
        if !cli.is_empty() {
            return cli.to_vec();
        }
        if !self.regions.is_empty() {
            return self.regions.clone();
        }
        vec![self
            .default_region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())]
    }

    pub fn effective_page_size(&self) -> usize {
        self.page_size.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Set last viewed resource and save
    pub fn set_last_resource(&mut self, key: &str) -> Result<()> {
        self.last_resource = Some(key.to_string());
        self.save()
    }
}
