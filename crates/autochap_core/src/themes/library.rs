//! Local theme library.

use std::path::{Path, PathBuf};

use crate::audio::{AudioDecoder, ThemeClip, ThemeId};

use super::ThemeResult;

/// File extensions recognised as theme audio.
pub const THEME_EXTENSIONS: &[&str] = &["ogg", "opus", "mp3", "flac", "wav", "m4a"];

/// Whether `path` looks like a theme audio file by extension.
pub fn is_theme_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| THEME_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// A theme audio file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeFile {
    pub id: ThemeId,
    pub path: PathBuf,
}

/// Theme files of one series directory, in library order.
#[derive(Debug, Clone, Default)]
pub struct ThemeLibrary {
    dir: PathBuf,
    files: Vec<ThemeFile>,
}

impl ThemeLibrary {
    /// List theme audio files in `dir`. A missing directory is an empty library.
    pub fn scan(dir: &Path) -> ThemeResult<Self> {
        let mut files: Vec<ThemeFile> = Vec::new();

        if dir.is_dir() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_theme_audio(p))
                .collect();
            paths.sort();

            for path in paths {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match stem.parse::<ThemeId>() {
                    Ok(id) if files.iter().any(|f| f.id == id) => {
                        tracing::warn!("Duplicate theme {}, ignoring {}", id, path.display());
                    }
                    Ok(id) => files.push(ThemeFile { id, path }),
                    Err(_) => {
                        tracing::debug!("Skipping non-theme file {}", path.display());
                    }
                }
            }
        }

        files.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!("Found {} themes in {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[ThemeFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Decode every theme at `sample_rate`. Clips that fail are logged and left out.
    pub fn load(&self, decoder: &dyn AudioDecoder, sample_rate: u32) -> Vec<ThemeClip> {
        let mut clips = Vec::with_capacity(self.files.len());
        for file in &self.files {
            match decoder.decode(&file.path, sample_rate) {
                Ok(signal) => {
                    tracing::debug!("{} loaded ({:.1}s)", file.id, signal.duration_secs());
                    clips.push(ThemeClip::new(file.id, signal));
                }
                Err(e) => {
                    tracing::warn!("{} could not be decoded, skipping: {}", file.id, e);
                }
            }
        }
        clips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, AudioResult, AudioSignal};

    struct StubDecoder;

    impl AudioDecoder for StubDecoder {
        fn native_sample_rate(&self, _path: &Path) -> AudioResult<u32> {
            Ok(8000)
        }

        fn decode(&self, path: &Path, sample_rate: u32) -> AudioResult<AudioSignal> {
            if path.to_string_lossy().contains("ED1") {
                return Err(AudioError::ExtractionError("corrupt".to_string()));
            }
            AudioSignal::new(vec![0.0; 16], sample_rate)
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn scan_lists_themes_in_library_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ED1.ogg", "OP2.mp3", "OP1.ogg", "notes.txt", "cover.ogg", "OP1v2.flac"] {
            touch(dir.path(), name);
        }
        std::fs::write(dir.path().join("data.json"), b"{}").unwrap();

        let library = ThemeLibrary::scan(dir.path()).unwrap();
        let ids: Vec<String> = library.files().iter().map(|f| f.id.to_string()).collect();
        assert_eq!(ids, vec!["OP1", "OP1v2", "OP2", "ED1"]);
    }

    #[test]
    fn duplicate_ids_keep_one_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "OP1.ogg");
        touch(dir.path(), "OP1.opus");
        let library = ThemeLibrary::scan(dir.path()).unwrap();
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn missing_directory_is_empty() {
        let library = ThemeLibrary::scan(Path::new("/nonexistent/.themes")).unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn load_skips_clips_that_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "OP1.ogg");
        touch(dir.path(), "ED1.ogg");
        let library = ThemeLibrary::scan(dir.path()).unwrap();

        let clips = library.load(&StubDecoder, 8000);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].id.to_string(), "OP1");
        assert_eq!(clips[0].signal.sample_rate(), 8000);
    }

    #[test]
    fn recognises_audio_extensions() {
        assert!(is_theme_audio(Path::new("OP1.OGG")));
        assert!(is_theme_audio(Path::new("ED2.m4a")));
        assert!(!is_theme_audio(Path::new("data.json")));
        assert!(!is_theme_audio(Path::new("OP1")));
    }
}
