//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chapters::{SnapConfig, MAX_WINDOW_MS};
use crate::correlation::MatchConfig;
use crate::logging::{LogConfig, LogLevel};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Theme matching settings.
    #[serde(default)]
    pub matching: MatchingSettings,

    /// Chapter layout settings.
    #[serde(default)]
    pub chapters: ChapterSettings,

    /// Keyframe snapping settings.
    #[serde(default)]
    pub snapping: SnappingSettings,

    /// Theme download settings.
    #[serde(default)]
    pub download: DownloadSettings,
}

impl Settings {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let m = &self.matching;
        if m.downsample_factor == 0 {
            return Err("matching.downsample_factor must be at least 1".to_string());
        }
        if !(m.theme_portion > 0.0 && m.theme_portion <= 1.0) {
            return Err(format!(
                "matching.theme_portion must be in (0, 1], got {}",
                m.theme_portion
            ));
        }
        if !m.score_threshold.is_finite() {
            return Err("matching.score_threshold must be finite".to_string());
        }
        if !(self.chapters.episode_snap_seconds >= 0.0) {
            return Err(format!(
                "chapters.episode_snap_seconds must not be negative, got {}",
                self.chapters.episode_snap_seconds
            ));
        }
        if self.snapping.window_ms > MAX_WINDOW_MS {
            return Err(format!(
                "snapping.window_ms must be at most {}, got {}",
                MAX_WINDOW_MS, self.snapping.window_ms
            ));
        }
        if self.download.concurrency == 0 {
            return Err("download.concurrency must be at least 1".to_string());
        }
        Ok(())
    }

    /// Snapping window and episode-edge snap distance.
    pub fn snap_config(&self) -> SnapConfig {
        SnapConfig {
            window_ms: self.snapping.window_ms,
            episode_snap_seconds: self.chapters.episode_snap_seconds,
        }
    }
}

/// Path configuration for themes and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Theme directory name, created inside the work path.
    #[serde(default = "default_themes_dir_name")]
    pub themes_dir_name: String,

    /// Folder for log files, relative to the work path unless absolute.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_themes_dir_name() -> String {
    ".themes".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            themes_dir_name: default_themes_dir_name(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to the run log.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep per-theme detail out of the run log.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of lines to show in tail.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
        }
    }
}

impl LoggingSettings {
    /// Run logger configuration for these settings.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            error_tail: self.error_tail as usize,
            show_timestamps: true,
        }
    }
}

/// Theme matching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Correlation peak needed to accept a match (before decimation scaling).
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    /// Keep every Nth sample before correlating.
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: usize,

    /// Fraction of the theme used as the probe.
    #[serde(default = "default_theme_portion")]
    pub theme_portion: f64,

    /// Render correlation charts into the theme directory.
    #[serde(default)]
    pub charts: bool,
}

fn default_score_threshold() -> f64 {
    1000.0
}

fn default_downsample_factor() -> usize {
    4
}

fn default_theme_portion() -> f64 {
    0.5
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            downsample_factor: default_downsample_factor(),
            theme_portion: default_theme_portion(),
            charts: false,
        }
    }
}

impl MatchingSettings {
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            score_threshold: self.score_threshold,
            downsample_factor: self.downsample_factor,
            theme_portion: self.theme_portion,
        }
    }
}

/// Chapter layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSettings {
    /// Offsets this close to either end of the episode snap to it.
    #[serde(default = "default_episode_snap_seconds")]
    pub episode_snap_seconds: f64,
}

fn default_episode_snap_seconds() -> f64 {
    4.0
}

impl Default for ChapterSettings {
    fn default() -> Self {
        Self {
            episode_snap_seconds: default_episode_snap_seconds(),
        }
    }
}

/// Keyframe snapping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnappingSettings {
    /// Snap matched offsets to scene changes.
    #[serde(default)]
    pub enabled: bool,

    /// Search window in milliseconds (at most 1000).
    #[serde(default = "default_window_ms")]
    pub window_ms: u32,
}

fn default_window_ms() -> u32 {
    1000
}

impl Default for SnappingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: default_window_ms(),
        }
    }
}

/// Theme download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Maximum parallel downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Matching,
    Chapters,
    Snapping,
    Download,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Matching,
        ConfigSection::Chapters,
        ConfigSection::Snapping,
        ConfigSection::Download,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Matching => "matching",
            ConfigSection::Chapters => "chapters",
            ConfigSection::Snapping => "snapping",
            ConfigSection::Download => "download",
        }
    }

    /// Comment written above the section.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Theme and log locations",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Matching => "Theme matching by cross-correlation",
            ConfigSection::Chapters => "Chapter layout",
            ConfigSection::Snapping => "Snap chapters to scene changes",
            ConfigSection::Download => "Theme downloads",
        }
    }
}

impl FromStr for ConfigSection {
    type Err = String;

    /// Parses a table name such as `snapping`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigSection::ALL
            .into_iter()
            .find(|section| section.table_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
                format!("unknown section '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}
