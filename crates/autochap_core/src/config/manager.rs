//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load (range checks, unknown sections dropped)
//! - Preserves comments and formatting with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the settings file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for `config_path`. Call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Changes are only in memory until `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Take the loaded settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load config from file. Returns error if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = parse_and_validate(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if missing.
    ///
    /// Unknown sections and missing defaults are cleaned up and saved back.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let settings = parse_and_validate(&content)?;
            let was_modified = needs_cleanup(&content, &settings)?;
            self.settings = settings;

            if was_modified {
                tracing::debug!("Rewriting {} with defaults", self.config_path.display());
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update one section on disk atomically.
    ///
    /// Re-reads the file, replaces only `section`, and writes it back, so
    /// other sections (and their comments) are left as they are on disk.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        self.settings.validate().map_err(ConfigError::InvalidValue)?;

        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// Put one section back to its defaults, in memory and on disk.
    pub fn reset_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let defaults = Settings::default();
        let s = &mut self.settings;
        match section {
            ConfigSection::Paths => s.paths = defaults.paths,
            ConfigSection::Logging => s.logging = defaults.logging,
            ConfigSection::Matching => s.matching = defaults.matching,
            ConfigSection::Chapters => s.chapters = defaults.chapters,
            ConfigSection::Snapping => s.snapping = defaults.snapping,
            ConfigSection::Download => s.download = defaults.download,
        }
        self.update_section(section)
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        Ok(match section {
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
            ConfigSection::Matching => toml::to_string_pretty(&s.matching)?,
            ConfigSection::Chapters => toml::to_string_pretty(&s.chapters)?,
            ConfigSection::Snapping => toml::to_string_pretty(&s.snapping)?,
            ConfigSection::Download => toml::to_string_pretty(&s.download)?,
        })
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# autochap configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n\n",
        );

        for (i, section) in ConfigSection::ALL.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&format!("# {}\n", section.description()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(*section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }
        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Temp file in the same directory so the rename is atomic
        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

fn parse_and_validate(content: &str) -> ConfigResult<Settings> {
    let settings: Settings = toml::from_str(content)?;
    settings.validate().map_err(ConfigError::InvalidValue)?;
    Ok(settings)
}

/// Whether the file has unknown sections or lacks defaults.
fn needs_cleanup(content: &str, settings: &Settings) -> ConfigResult<bool> {
    let doc: DocumentMut = content.parse()?;
    let known: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
    let has_unknown = doc.iter().any(|(key, _)| !known.contains(&key));

    // A file that was missing any default re-parses into a different table set
    let complete: DocumentMut = toml::to_string_pretty(settings)?.parse()?;
    let missing = ConfigSection::ALL.iter().any(|section| {
        let name = section.table_name();
        match (doc.get(name).and_then(Item::as_table), complete.get(name).and_then(Item::as_table)) {
            (Some(have), Some(want)) => want.iter().any(|(key, _)| !have.contains_key(key)),
            _ => true,
        }
    });

    Ok(has_unknown || missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("autochap.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        for section in ConfigSection::ALL {
            assert!(content.contains(&format!("[{}]", section.table_name())));
        }
        // The generated file loads back to the defaults
        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings(), &Settings::default());
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("autochap.toml");
        fs::write(&config_path, "[matching]\nscore_threshold = 2500.0\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().matching.score_threshold, 2500.0);
        // Missing defaults were written back
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[snapping]"));
        assert!(content.contains("score_threshold = 2500.0"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("autochap.toml");
        fs::write(&config_path, "[snapping]\nwindow_ms = 5000\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        assert!(matches!(manager.load(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("autochap.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        // Hand edit on disk that the in-memory settings don't know about
        let content = fs::read_to_string(&config_path).unwrap();
        fs::write(&config_path, content.replace("concurrency = 4", "concurrency = 8")).unwrap();

        manager.settings_mut().snapping.enabled = true;
        manager.update_section(ConfigSection::Snapping).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("enabled = true"));
        assert!(content.contains("concurrency = 8"));
    }

    #[test]
    fn reset_section_restores_defaults_only_there() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("autochap.toml");
        fs::write(
            &config_path,
            "[matching]\nscore_threshold = 2500.0\n\n[download]\nconcurrency = 8\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        manager.reset_section(ConfigSection::Matching).unwrap();
        assert_eq!(manager.settings().matching.score_threshold, 1000.0);

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().matching, Settings::default().matching);
        assert_eq!(reloaded.settings().download.concurrency, 8);
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("autochap.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }
}
