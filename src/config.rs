use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio_system::pool::{OverflowPolicy, StopGuard};
use crate::audio_system::source::Category;
use crate::error::ConfigError;

/// One clip in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub name: String,
    /// Audio file, relative to the config directory unless absolute
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// BGM channel count; `None` sizes the pool to the BGM clip count
    pub bgm_channels: Option<usize>,

    /// SE channel count; `None` sizes the pool to the SE clip count
    pub se_channels: Option<usize>,

    /// What a BGM request does when no channel is free
    pub bgm_overflow: OverflowPolicy,

    /// What an SE request does when every channel is playing
    pub se_overflow: OverflowPolicy,

    /// Which channel state stop-by-name requests act on
    pub stop_guard: StopGuard,

    /// Whether `play_bgm` stops the other BGM channels
    pub stop_others_on_play: bool,

    /// Fade-out length for stop commands that give no length
    pub default_fade_seconds: f32,

    /// Per-channel volume a new BGM/SE starts at (before bus gain)
    pub channel_volume: f32,

    /// Initial bus levels (linear, 0.0-1.0)
    pub master_volume: f32,
    pub bgm_volume: f32,
    pub se_volume: f32,

    pub bgm_clips: Vec<ClipEntry>,
    pub se_clips: Vec<ClipEntry>,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            bgm_channels: None,
            se_channels: None,
            bgm_overflow: OverflowPolicy::Reject,
            se_overflow: OverflowPolicy::StealFirst,
            stop_guard: StopGuard::RequirePlaying,
            stop_others_on_play: true,
            default_fade_seconds: 2.0,
            channel_volume: 1.0,
            master_volume: 1.0,
            bgm_volume: 1.0,
            se_volume: 1.0,
            bgm_clips: Vec::new(),
            se_clips: Vec::new(),
        }
    }
}

impl SoundConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let config: SoundConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Load configuration, writing a default file if none exists yet
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = SoundConfig::default();
            config.save(path)?;
            tracing::info!("Created default config at: {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let save_failed = |e: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: e,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))?;

        Ok(())
    }

    /// Default config file location in the user config folder
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("SoundPool"))
            .unwrap_or_else(|| PathBuf::from("config"))
            .join("config.json")
    }

    /// Reject settings the manager cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bgm_channels == Some(0) || self.se_channels == Some(0) {
            return Err(ConfigError::Invalid(
                "channel counts must be at least 1".to_string(),
            ));
        }

        for (label, policy) in [("bgm_overflow", self.bgm_overflow), ("se_overflow", self.se_overflow)] {
            if let OverflowPolicy::Grow { max_channels: 0 } = policy {
                return Err(ConfigError::Invalid(format!(
                    "{} grow limit must be at least 1",
                    label
                )));
            }
        }

        let levels = [
            ("channel_volume", self.channel_volume),
            ("master_volume", self.master_volume),
            ("bgm_volume", self.bgm_volume),
            ("se_volume", self.se_volume),
        ];
        for (label, value) in levels {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 0.0-1.0, got {}",
                    label, value
                )));
            }
        }

        if self.default_fade_seconds.is_nan() || self.default_fade_seconds < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_fade_seconds must be non-negative, got {}",
                self.default_fade_seconds
            )));
        }

        Ok(())
    }

    /// Resolved channel count for a category, given its registered clip count
    pub fn channel_count(&self, category: Category, clip_count: usize) -> usize {
        let configured = match category {
            Category::Bgm => self.bgm_channels,
            Category::Se => self.se_channels,
        };
        configured.unwrap_or(clip_count).max(1)
    }

    pub fn overflow(&self, category: Category) -> OverflowPolicy {
        match category {
            Category::Bgm => self.bgm_overflow,
            Category::Se => self.se_overflow,
        }
    }
}
