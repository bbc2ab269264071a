//! Download manifest for a theme directory.
//!
//! Records which series the directory holds and, per theme, the provider's
//! fingerprint of the audio it was fetched from. Persisted as `data.json`
//! next to the theme files.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::library::is_theme_audio;
use super::ThemeResult;

/// Manifest file name inside the theme directory.
pub const MANIFEST_FILE: &str = "data.json";

/// Bookkeeping for one downloaded theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Provider fingerprint (e.g. last-modified stamp) of the source audio.
    pub fingerprint: String,
    /// File name inside the theme directory.
    pub file: String,
    /// SHA-256 of the stored file, lowercase hex.
    pub sha256: String,
}

/// Per-directory download record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeManifest {
    #[serde(default)]
    pub series_name: Option<String>,
    /// Keyed by theme id (`OP1`, `ED2v2`, ...).
    #[serde(default)]
    pub themes: BTreeMap<String, ManifestEntry>,
}

impl ThemeManifest {
    /// Empty manifest for `series_name`.
    pub fn for_series(series_name: impl Into<String>) -> Self {
        Self {
            series_name: Some(series_name.into()),
            themes: BTreeMap::new(),
        }
    }

    /// Path of the manifest inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Load the manifest from `dir`. Missing or unreadable manifests start empty.
    pub fn load(dir: &Path) -> Self {
        let path = Self::path_in(dir);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save to `dir` atomically (temp file, then rename).
    pub fn save(&self, dir: &Path) -> ThemeResult<()> {
        fs::create_dir_all(dir)?;
        let path = Self::path_in(dir);
        let temp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Fingerprint recorded for `id`, if any.
    pub fn fingerprint(&self, id: &str) -> Option<&str> {
        self.themes.get(id).map(|e| e.fingerprint.as_str())
    }

    /// Bring the directory in line with `series_name`.
    ///
    /// On a series change the manifest is replaced and every theme audio file
    /// in `dir` is deleted. Entries whose file is missing or no longer matches
    /// its recorded digest are dropped so they will be fetched again. Returns
    /// the deleted files.
    pub fn reconcile(&mut self, series_name: &str, dir: &Path) -> ThemeResult<Vec<PathBuf>> {
        let mut removed = Vec::new();

        if self.series_name.as_deref() != Some(series_name) {
            tracing::info!(
                "Theme directory series changed ({:?} -> {}), clearing themes",
                self.series_name,
                series_name
            );
            *self = Self::for_series(series_name);

            if dir.is_dir() {
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.is_file() && is_theme_audio(&path) {
                        fs::remove_file(&path)?;
                        removed.push(path);
                    }
                }
            }
            removed.sort();
            return Ok(removed);
        }

        let stale: Vec<String> = self
            .themes
            .iter()
            .filter(|(_, entry)| {
                let path = dir.join(&entry.file);
                !matches!(sha256_file(&path), Ok(digest) if digest == entry.sha256)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in stale {
            tracing::debug!("{} missing or modified on disk, will fetch again", id);
            self.themes.remove(&id);
        }
        Ok(removed)
    }
}

/// SHA-256 of a byte slice as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
