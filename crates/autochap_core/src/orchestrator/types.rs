//! Core types for the orchestrator pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::{AudioDecoder, AudioSignal, ThemeClip};
use crate::chapters::{
    ChapterBoundary, FrameRate, OffsetList, SceneChangeDetector, SnapStats, ValidatedOffsets,
};
use crate::config::Settings;
use crate::logging::RunLogger;
use crate::scheduler::{MatchReport, MatchScheduler};
use crate::themes::{DownloadReport, ThemeLibrary, ThemeProvider, CHARTS_DIR};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (step_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Where scene changes for snapping come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyframeSource {
    /// Snap only if a detector is supplied by the caller.
    #[default]
    None,
    /// SCXvid stat file.
    Scxvid(PathBuf),
    /// Ask ffprobe for the episode's keyframes.
    Probe,
}

/// One episode to generate chapters for.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Episode video or audio file.
    pub episode: PathBuf,
    /// Directory holding the theme directory and logs.
    pub work_path: PathBuf,
    /// Chapter file to write.
    pub output: PathBuf,
    /// Series search term for theme lookup. Guessed from the file name if unset.
    pub search_name: Option<String>,
    /// Render correlation charts regardless of settings.
    pub charts: bool,
    /// Remove the theme directory once the run is over.
    pub delete_themes: bool,
    pub keyframes: KeyframeSource,
    /// Overrides the detector's frame rate.
    pub frame_rate: Option<FrameRate>,
}

impl JobRequest {
    /// Request with defaults: work path is the episode's directory and the
    /// output is `<stem>.chapters.txt` next to the episode.
    pub fn new(episode: impl Into<PathBuf>) -> Self {
        let episode = episode.into();
        let work_path = episode
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let output = default_output_path(&episode);
        Self {
            episode,
            work_path,
            output,
            search_name: None,
            charts: false,
            delete_themes: false,
            keyframes: KeyframeSource::None,
            frame_rate: None,
        }
    }

    pub fn with_work_path(mut self, work_path: impl Into<PathBuf>) -> Self {
        self.work_path = work_path.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_search_name(mut self, name: impl Into<String>) -> Self {
        self.search_name = Some(name.into());
        self
    }

    pub fn with_keyframes(mut self, source: KeyframeSource) -> Self {
        self.keyframes = source;
        self
    }

    /// Episode file stem, used as the run name.
    pub fn run_name(&self) -> String {
        self.episode
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode".to_string())
    }

    /// Theme directory inside the work path.
    pub fn themes_dir(&self, settings: &Settings) -> PathBuf {
        self.work_path.join(&settings.paths.themes_dir_name)
    }

    /// Search term for the theme provider.
    pub fn series_query(&self) -> String {
        match &self.search_name {
            Some(name) => name.clone(),
            None => guess_series_name(&self.run_name()),
        }
    }
}

/// `<dir>/<stem>.chapters.txt` for an episode at `<dir>/<stem>.<ext>`.
pub fn default_output_path(episode: &Path) -> PathBuf {
    let stem = episode
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "episode".to_string());
    episode.with_file_name(format!("{}.chapters.txt", stem))
}

/// Rough series name from a release file name.
///
/// Drops `[group]` and `(info)` tags, turns `_` and `.` into spaces, and cuts
/// the trailing ` - 01` style episode number.
pub fn guess_series_name(stem: &str) -> String {
    let mut cleaned = String::with_capacity(stem.len());
    let mut depth = 0usize;
    for c in stem.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            '_' | '.' if depth == 0 => cleaned.push(' '),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }

    let mut name = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(idx) = name.rfind(" - ") {
        let tail = name[idx + 3..].trim();
        let is_episode = tail
            .trim_start_matches(['E', 'e'])
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        if is_episode {
            name.truncate(idx);
        }
    }
    name.trim().to_string()
}

/// Read-only context passed to pipeline steps.
///
/// Contains run configuration and shared collaborators that steps can use
/// but not replace. Mutable results go in `RunState`.
pub struct Context {
    pub request: JobRequest,
    pub settings: Settings,
    /// Run name used in logs and errors.
    pub job_name: String,
    /// Theme directory inside the work path.
    pub themes_dir: PathBuf,
    /// Per-run logger.
    pub logger: Arc<RunLogger>,
    pub decoder: Arc<dyn AudioDecoder>,
    /// Remote theme lookup. Without one, only cached themes are used.
    pub provider: Option<Arc<dyn ThemeProvider>>,
    /// Scene-change source that takes precedence over `request.keyframes`.
    pub detector: Option<Arc<dyn SceneChangeDetector>>,
    pub scheduler: MatchScheduler,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    pub fn new(
        request: JobRequest,
        settings: Settings,
        logger: Arc<RunLogger>,
        decoder: Arc<dyn AudioDecoder>,
        scheduler: MatchScheduler,
    ) -> Self {
        let themes_dir = request.themes_dir(&settings);
        Self {
            job_name: request.run_name(),
            request,
            settings,
            themes_dir,
            logger,
            decoder,
            provider: None,
            detector: None,
            scheduler,
            progress_callback: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ThemeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn SceneChangeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent, message);
        }
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.themes_dir.join(CHARTS_DIR)
    }

    /// Charts are on when the request or the settings ask for them.
    pub fn charts_enabled(&self) -> bool {
        self.request.charts || self.settings.matching.charts
    }

    /// Snapping is on when configured, requested, or a detector was supplied.
    pub fn snapping_enabled(&self) -> bool {
        self.settings.snapping.enabled
            || self.request.keyframes != KeyframeSource::None
            || self.detector.is_some()
    }
}

/// Mutable run state that accumulates results from pipeline steps.
///
/// Steps add their own section and read what earlier steps recorded.
#[derive(Default)]
pub struct RunState {
    /// When the run started.
    pub started_at: Option<String>,
    /// Theme files found after preparation.
    pub library: Option<ThemeLibrary>,
    /// Download pass results, when a provider was used.
    pub download: Option<DownloadReport>,
    /// Decoded episode audio.
    pub episode: Option<AudioSignal>,
    /// Decoded theme clips, in library order.
    pub clips: Vec<ThemeClip>,
    pub report: Option<MatchReport>,
    /// Raw offsets from accepted matches.
    pub offsets: Option<OffsetList>,
    /// Offsets that passed validation, snapped if snapping ran.
    pub validated: Option<ValidatedOffsets>,
    pub snap_stats: Option<SnapStats>,
    pub boundaries: Vec<ChapterBoundary>,
    /// Written chapter file.
    pub chapters_path: Option<PathBuf>,
    /// Why the offsets were rejected.
    pub rejection: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    /// Episode duration in seconds, once decoded.
    pub fn episode_duration(&self) -> Option<f64> {
        self.episode.as_ref().map(AudioSignal::duration_secs)
    }
}

/// Result of a step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step was skipped (with reason).
    Skipped(String),
    /// The run ends here without error (with reason).
    Stopped(String),
}
