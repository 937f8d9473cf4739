use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::{
    playlist::{DiscoveryConfig, DEFAULT_VOLUME},
    timer::{DEFAULT_MINUTES, MAX_MINUTES, MIN_MINUTES},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MusicSettings {
    /// Turn the playlist on as soon as a session starts.
    pub enabled_on_start: bool,
    pub volume: f32,
    /// Where `music1.mp3`, `music2.mp3`, ... are looked up.
    pub directory: PathBuf,
    pub discovery: DiscoveryConfig,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            enabled_on_start: false,
            volume: DEFAULT_VOLUME,
            directory: PathBuf::from("music"),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusSettings {
    pub default_minutes: u32,
    pub music: MusicSettings,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            default_minutes: DEFAULT_MINUTES,
            music: MusicSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<FocusSettings>,
}

impl SettingsStore {
    /// Opens the settings file, falling back to defaults when it is missing
    /// or unreadable as JSON.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!("ignoring malformed settings in {}: {err}", path.display());
                    FocusSettings::default()
                }
            }
        } else {
            FocusSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> Result<FocusSettings> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(guard.clone())
    }

    pub fn update_default_minutes(&self, minutes: u32) -> Result<()> {
        if !(MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
            bail!("default session length must be {MIN_MINUTES}-{MAX_MINUTES} minutes, got {minutes}");
        }
        self.update(|settings| settings.default_minutes = minutes)
    }

    pub fn update_volume(&self, volume: f32) -> Result<()> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.update(|settings| settings.music.volume = volume)
    }

    fn update(&self, apply: impl FnOnce(&mut FocusSettings)) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &FocusSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: FocusSettings = serde_json::from_str(&contents)?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }
}
