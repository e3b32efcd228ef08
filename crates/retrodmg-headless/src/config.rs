use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_FRAMES: u32 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    pub boot_rom_path: Option<PathBuf>,
    /// Frames to run before exiting.
    pub frames: u32,
    pub save_battery: bool,
    /// Write the last committed frame here as a grayscale PNG.
    pub screenshot_path: Option<PathBuf>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            boot_rom_path: None,
            frames: DEFAULT_FRAMES,
            save_battery: true,
            screenshot_path: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("retrodmg").join("headless.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("retrodmg")
            .join("headless.toml");
    }

    PathBuf::from("headless.toml")
}

pub fn load_from_file(path: &Path) -> HeadlessConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return HeadlessConfig::default(),
    };

    match toml::from_str::<HeadlessConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            HeadlessConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &HeadlessConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
