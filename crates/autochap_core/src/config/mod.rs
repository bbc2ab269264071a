//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use autochap_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("autochap.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().snapping.enabled = true;
//! config.update_section(ConfigSection::Snapping).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ChapterSettings, ConfigSection, DownloadSettings, LoggingSettings, MatchingSettings,
    PathSettings, Settings, SnappingSettings,
};
