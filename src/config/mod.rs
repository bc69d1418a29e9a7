//! Configuration module for rootmod.
//!
//! # Module Structure
//!
//! - `loader`: locating, reading, writing and validating the settings file
//!
//! # Settings Management
//!
//! `Settings` is a flat serde struct persisted as pretty JSON at
//! `~/.config/rootmod/settings.json`. Missing fields take their defaults, so
//! an empty `{}` file is valid. `SettingsManager::load` never fails on a
//! malformed file: it warns and falls back to defaults.

pub mod loader;

use crate::backend::BackendKind;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    // Device layout
    pub module_root: PathBuf,
    pub adb_root: PathBuf,

    // Backend selection
    pub backend: BackendKind,
    pub magisk_binary: String,
    pub ksud_binary: String,

    // Privileged shell
    pub shell_program: String,
    pub shell_args: Vec<String>,
    pub require_root: bool,

    /// Where install archives are unpacked while resolving the module id.
    pub scratch_dir: PathBuf,

    // Logging
    pub log_dir: PathBuf,
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            module_root: PathBuf::from("/data/adb/modules"),
            adb_root: PathBuf::from("/data/adb"),
            backend: BackendKind::Auto,
            magisk_binary: "magisk".to_string(),
            ksud_binary: "ksud".to_string(),
            shell_program: "su".to_string(),
            shell_args: Vec::new(),
            require_root: true,
            scratch_dir: std::env::temp_dir(),
            log_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("rootmod/logs"),
            debug_logging: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "module_root cannot be empty".to_string(),
            ));
        }
        if self.shell_program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "shell_program cannot be empty".to_string(),
            ));
        }
        if self.magisk_binary.trim().is_empty() || self.ksud_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "backend binaries cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug_logging {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

pub struct SettingsManager;

impl SettingsManager {
    /// Load settings from `path`, or defaults when the file is missing.
    ///
    /// A file that fails to parse or validate is reported and replaced by
    /// defaults instead of aborting startup.
    pub fn load(path: &Path) -> Settings {
        match loader::load_settings_from_file(path) {
            Ok(settings) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    log::warn!("[Config] {} invalid, using defaults: {}", path.display(), e);
                    Settings::default()
                }
            },
            Err(ConfigError::FileNotFound(_)) => Settings::default(),
            Err(e) => {
                log::warn!(
                    "[Config] Failed to load {}, using defaults: {}",
                    path.display(),
                    e
                );
                Settings::default()
            }
        }
    }

    /// Load from the global settings path.
    pub fn load_global() -> Settings {
        match loader::get_global_settings_path() {
            Ok(path) => Self::load(&path),
            Err(e) => {
                log::warn!("[Config] {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
        settings.validate()?;
        loader::save_settings_to_file(settings, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.module_root, PathBuf::from("/data/adb/modules"));
        assert_eq!(settings.backend, BackendKind::Auto);
        assert!(settings.require_root);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"backend": "kernelsu", "require_root": false}"#).unwrap();
        assert_eq!(settings.backend, BackendKind::KernelSu);
        assert!(!settings.require_root);
        assert_eq!(settings.shell_program, "su");
    }

    #[test]
    fn test_validate_rejects_empty_shell() {
        let settings = Settings {
            shell_program: "  ".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_load_falls_back_on_garbage() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(SettingsManager::load(&path), Settings::default());

        let missing = tmp.path().join("missing.json");
        assert_eq!(SettingsManager::load(&missing), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rootmod/settings.json");
        let settings = Settings {
            backend: BackendKind::KernelSu,
            debug_logging: true,
            ..Settings::default()
        };

        SettingsManager::save(&settings, &path).unwrap();
        assert_eq!(SettingsManager::load(&path), settings);
        assert_eq!(SettingsManager::load(&path).log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_save_rejects_invalid_settings() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let settings = Settings {
            ksud_binary: String::new(),
            ..Settings::default()
        };
        assert!(SettingsManager::save(&settings, &path).is_err());
        assert!(!path.exists());
    }
}
