//! Stub collaborators and synthetic audio shared by orchestrator tests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{AudioDecoder, AudioError, AudioResult, AudioSignal, ThemeClip};
use crate::config::Settings;
use crate::correlation::CorrelationMatcher;
use crate::logging::{LogConfig, RunLogger};
use crate::scheduler::MatchScheduler;
use crate::themes::{RemoteTheme, ThemeError, ThemeListing, ThemeProvider, ThemeResult};

use super::types::{Context, JobRequest};

pub const RATE: u32 = 1000;

/// Episode file name used by `test_context`.
pub const EPISODE: &str = "Show - 01.mkv";

/// Deterministic white noise in [-1, 1).
pub fn noise(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        })
        .collect()
}

/// Create an empty file and its parent directories.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"").unwrap();
}

/// Settings that accept the white-noise fixtures.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.matching.score_threshold = 200.0;
    settings.matching.downsample_factor = 1;
    settings
}

/// Decoder serving fixed samples by file name.
#[derive(Default)]
pub struct StubDecoder {
    signals: HashMap<String, Vec<f64>>,
}

impl StubDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: &str, samples: Vec<f64>) -> Self {
        self.signals.insert(file_name.to_string(), samples);
        self
    }

    fn lookup(&self, path: &Path) -> AudioResult<&Vec<f64>> {
        path.file_name()
            .and_then(|name| self.signals.get(name.to_string_lossy().as_ref()))
            .ok_or_else(|| AudioError::SourceNotFound(path.display().to_string()))
    }
}

impl AudioDecoder for StubDecoder {
    fn native_sample_rate(&self, path: &Path) -> AudioResult<u32> {
        self.lookup(path).map(|_| RATE)
    }

    fn decode(&self, path: &Path, sample_rate: u32) -> AudioResult<AudioSignal> {
        AudioSignal::new(self.lookup(path)?.clone(), sample_rate)
    }
}

/// Provider with a fixed listing, or one whose lookup always fails.
pub struct StubProvider {
    listing: Option<ThemeListing>,
}

impl StubProvider {
    pub fn new(series_name: &str, themes: Vec<RemoteTheme>) -> Self {
        Self {
            listing: Some(ThemeListing {
                series_name: series_name.to_string(),
                themes,
            }),
        }
    }

    pub fn offline() -> Self {
        Self { listing: None }
    }
}

impl ThemeProvider for StubProvider {
    fn lookup(&self, _query: &str) -> ThemeResult<ThemeListing> {
        self.listing
            .clone()
            .ok_or_else(|| ThemeError::Lookup("network unreachable".to_string()))
    }

    fn fetch(&self, theme: &RemoteTheme) -> ThemeResult<Vec<u8>> {
        Ok(format!("audio of {}", theme.id).into_bytes())
    }
}

/// 60s episode at `RATE` with OP2 at `op_at` and ED1 at `ed_at` samples.
///
/// Returns the episode samples and the theme samples by file name
/// (`OP1.ogg`, `OP2.ogg`, `ED1.ogg`). OP1 never occurs in the episode.
pub fn fixture_samples(
    op_at: Option<usize>,
    ed_at: Option<usize>,
) -> (Vec<f64>, Vec<(&'static str, Vec<f64>)>) {
    let op1 = noise(1500, 1);
    let op2 = noise(1500, 2);
    let ed1 = noise(1500, 3);

    let mut episode: Vec<f64> = noise(60_000, 5).iter().map(|x| x * 0.1).collect();
    if let Some(at) = op_at {
        episode[at..at + op2.len()].copy_from_slice(&op2);
    }
    if let Some(at) = ed_at {
        episode[at..at + ed1.len()].copy_from_slice(&ed1);
    }
    (episode, vec![("OP1.ogg", op1), ("OP2.ogg", op2), ("ED1.ogg", ed1)])
}

/// `fixture_samples` as decoded audio.
pub fn episode_fixture(op_at: Option<usize>, ed_at: Option<usize>) -> (AudioSignal, Vec<ThemeClip>) {
    let (episode, themes) = fixture_samples(op_at, ed_at);
    let clips = themes
        .into_iter()
        .map(|(file, samples)| {
            let id = file.trim_end_matches(".ogg").parse().unwrap();
            ThemeClip::new(id, AudioSignal::new(samples, RATE).unwrap())
        })
        .collect();
    (AudioSignal::new(episode, RATE).unwrap(), clips)
}

/// Decoder knowing the fixture episode and themes.
pub fn fixture_decoder(op_at: Option<usize>, ed_at: Option<usize>) -> StubDecoder {
    let (episode, themes) = fixture_samples(op_at, ed_at);
    themes
        .into_iter()
        .fold(StubDecoder::new().with(EPISODE, episode), |decoder, (file, samples)| {
            decoder.with(file, samples)
        })
}

pub fn test_context(dir: &Path) -> Context {
    test_context_with(dir, StubDecoder::new())
}

/// Context for an episode at `<dir>/Show - 01.mkv` with test settings.
pub fn test_context_with(dir: &Path, decoder: StubDecoder) -> Context {
    let settings = test_settings();
    let request = JobRequest::new(dir.join(EPISODE));
    let logger = RunLogger::new(
        request.run_name(),
        dir.join(&settings.paths.logs_folder),
        LogConfig::default(),
        None,
    )
    .unwrap();
    let scheduler = MatchScheduler::new(CorrelationMatcher::new(settings.matching.match_config()));
    Context::new(request, settings, Arc::new(logger), Arc::new(decoder), scheduler)
}
