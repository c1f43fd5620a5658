use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "heightfield.toml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialise settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerPreferenceSetting {
    LowPower,
    HighPerformance,
}

impl Default for PowerPreferenceSetting {
    fn default() -> Self {
        Self::HighPerformance
    }
}

impl From<PowerPreferenceSetting> for wgpu::PowerPreference {
    fn from(value: PowerPreferenceSetting) -> Self {
        match value {
            PowerPreferenceSetting::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreferenceSetting::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Grid subdivisions per axis.
    pub tessellation: u32,
    pub elevation_texture: Option<PathBuf>,
    pub diffuse_texture: Option<PathBuf>,
    pub power_preference: PowerPreferenceSetting,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            tessellation: 64,
            elevation_texture: None,
            diffuse_texture: None,
            power_preference: PowerPreferenceSetting::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Dump the first vertices and indices of every generated mesh.
    pub mesh_trace: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            mesh_trace: false,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightfieldSettings {
    pub terrain: TerrainSettings,
    pub logging: LoggingSettings,
}

/// Where [`load_settings`] and [`save_settings`] keep the per-user file.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "heightfield", "heightfield")
        .map(|proj| proj.config_dir().join(CONFIG_FILE))
}

pub fn save_settings_to(path: &Path, settings: &HeightfieldSettings) -> Result<(), SettingsError> {
    let io_error = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let toml = toml::to_string_pretty(settings)?;
    fs::write(path, toml).map_err(io_error)
}

pub fn load_settings_from(path: &Path) -> Result<HeightfieldSettings, SettingsError> {
    let data = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&data).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves to the per-user config directory; a platform without one is a no-op.
pub fn save_settings(settings: &HeightfieldSettings) -> Result<(), SettingsError> {
    match config_path() {
        Some(path) => save_settings_to(&path, settings),
        None => Ok(()),
    }
}

/// Loads from the per-user config directory, `None` if absent or unreadable.
pub fn load_settings() -> Option<HeightfieldSettings> {
    let path = config_path()?;
    if !path.exists() {
        return None;
    }
    match load_settings_from(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("Ignoring settings file: {}", e);
            None
        }
    }
}
