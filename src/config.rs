use std::path::Path;

use anyhow::{Result, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub default_width: u32,
    pub minimized_width: u32,
    pub title: String,
    pub child_frame_title: String,
    pub docked_title: String,
    pub empty_message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Store key holding the shared link collection.
    pub store_key: String,
    /// Frame element id that gets its own overlay surface.
    pub child_frame_id: String,
    pub ajax_marker_attribute: String,
    pub overlay_id: String,
    /// How deep the page loader follows nested iframes.
    pub max_frame_depth: usize,
    pub panel: PanelConfig,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes)?;
    if config.store_key.trim().is_empty() {
        bail!("store_key must not be empty");
    }
    if config.panel.minimized_width > config.panel.default_width {
        bail!(
            "panel.minimized_width {} exceeds panel.default_width {}",
            config.panel.minimized_width,
            config.panel.default_width
        );
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
