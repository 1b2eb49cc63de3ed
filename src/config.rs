// Preference persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::engine::core::{AudioPolicy, Backend, Codec, PresetTier};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Codec used when the command line does not name one
    #[serde(default)]
    pub codec: Codec,

    /// Encoder backend; hardware backends still need a capability trial
    #[serde(default)]
    pub backend: Backend,

    /// Encoder effort tier
    #[serde(default)]
    pub preset: PresetTier,

    /// Audio handling for pass 2
    #[serde(default)]
    pub audio: AudioPolicy,

    /// Target output size in MB
    #[serde(default = "default_target_mb")]
    pub target_mb: f64,

    /// Suffix appended to the input stem when no output path is given
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

fn default_target_mb() -> f64 {
    50.0
}

fn default_output_suffix() -> String {
    "_compressed".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            backend: Backend::default(),
            preset: PresetTier::default(),
            audio: AudioPolicy::default(),
            target_mb: default_target_mb(),
            output_suffix: default_output_suffix(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("ffsqueeze")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("ffsqueeze")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist.
    /// Malformed data is an `Err`; callers fall back to defaults (non-fatal).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;

            Ok(config)
        } else {
            let config = Config::default();

            // Best effort; a read-only config dir should not block a run
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {}", e);
            }

            Ok(config)
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Fold the settings of a submitted job back into the stored defaults.
    /// Returns true when anything actually changed, so the owning controller
    /// knows a save is warranted.
    pub fn apply_job_settings(
        &mut self,
        codec: Codec,
        backend: Backend,
        preset: PresetTier,
        audio: AudioPolicy,
        target_mb: f64,
    ) -> bool {
        let updated = DefaultsConfig {
            codec,
            backend,
            preset,
            audio,
            target_mb,
            output_suffix: self.defaults.output_suffix.clone(),
        };

        if updated == self.defaults {
            false
        } else {
            self.defaults = updated;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.codec, Codec::H264);
        assert_eq!(config.defaults.backend, Backend::Software);
        assert_eq!(config.defaults.preset, PresetTier::Standard);
        assert_eq!(config.defaults.audio, AudioPolicy::Copy);
        assert_eq!(config.defaults.target_mb, 50.0);
        assert_eq!(config.defaults.output_suffix, "_compressed");
    }

    #[test]
    fn config_serialization_round_trips() {
        let mut config = Config::default();
        config.defaults.codec = Codec::H265;
        config.defaults.backend = Backend::Nvidia;
        config.defaults.target_mb = 25.0;

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = toml::from_str("[defaults]\ncodec = \"av1\"\n").unwrap();
        assert_eq!(config.defaults.codec, Codec::Av1);
        assert_eq!(config.defaults.target_mb, 50.0);
        assert_eq!(config.defaults.backend, Backend::Software);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(toml::from_str::<Config>("defaults = \"nope\"").is_err());
    }

    #[test]
    fn apply_job_settings_reports_changes() {
        let mut config = Config::default();

        let unchanged = config.apply_job_settings(
            Codec::H264,
            Backend::Software,
            PresetTier::Standard,
            AudioPolicy::Copy,
            50.0,
        );
        assert!(!unchanged);

        let changed = config.apply_job_settings(
            Codec::H265,
            Backend::Intel,
            PresetTier::Efficient,
            AudioPolicy::Reencode,
            30.0,
        );
        assert!(changed);
        assert_eq!(config.defaults.codec, Codec::H265);
        assert_eq!(config.defaults.target_mb, 30.0);
    }
}
