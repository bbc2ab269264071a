//! Theme clip storage and acquisition.
//!
//! A series' themes live in one directory (by default `<work>/.themes`)
//! together with a `data.json` manifest and a `charts/` folder for
//! correlation charts.

mod download;
mod library;
mod manifest;

use std::path::PathBuf;

pub use download::{
    execute_downloads, plan_downloads, DownloadPlan, DownloadReport, RemoteTheme, ThemeListing,
    ThemeProvider,
};
pub use library::{is_theme_audio, ThemeFile, ThemeLibrary, THEME_EXTENSIONS};
pub use manifest::{sha256_file, sha256_hex, ManifestEntry, ThemeManifest, MANIFEST_FILE};

/// Sub-directory of the theme directory holding correlation charts.
pub const CHARTS_DIR: &str = "charts";

/// Errors from theme storage and download.
#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    /// Remote series lookup failed.
    #[error("Theme lookup failed: {0}")]
    Lookup(String),

    /// A single theme could not be fetched.
    #[error("Download failed: {0}")]
    Download(String),

    /// No usable theme audio is available.
    #[error("No valid themes in {0}")]
    NoThemes(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),
}

/// Result type for theme operations.
pub type ThemeResult<T> = Result<T, ThemeError>;
