//! Pipeline orchestrator for generating one episode's chapters.
//!
//! Each run is a sequence of steps that validate, execute, and record their
//! results in a shared `RunState`.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Step: PrepareThemes
//!     ├── Step: Decode
//!     ├── Step: Match
//!     ├── Step: Validate   (may stop the run)
//!     ├── Step: Snap       (optional)
//!     └── Step: Chapters
//! ```
//!
//! # Example
//!
//! ```no_run
//! use autochap_core::config::Settings;
//! use autochap_core::orchestrator::{run_job, JobRequest, RunOutcome, Services};
//!
//! let request = JobRequest::new("/anime/Show/Show - 01.mkv");
//! match run_job(request, Settings::default(), Services::default())? {
//!     RunOutcome::ChaptersWritten(path) => println!("Wrote {}", path.display()),
//!     RunOutcome::Rejected(reason) => println!("No chapters: {}", reason),
//! }
//! # Ok::<(), autochap_core::orchestrator::PipelineError>(())
//! ```

mod errors;
mod pipeline;
mod step;
pub mod steps;
#[cfg(test)]
pub(crate) mod test_support;
mod types;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{Pipeline, PipelineRunResult, StoppedAt};
pub use step::PipelineStep;
pub use steps::{ChaptersStep, DecodeStep, MatchStep, PrepareThemesStep, SnapStep, ValidateStep};
pub use types::{
    default_output_path, guess_series_name, Context, JobRequest, KeyframeSource,
    ProgressCallback, RunState, StepOutcome,
};

use crate::audio::{AudioDecoder, FfmpegDecoder};
use crate::chapters::SceneChangeDetector;
use crate::config::Settings;
use crate::correlation::{CorrelationMatcher, PngChartSink};
use crate::logging::{LogCallback, RunLogger};
use crate::scheduler::MatchScheduler;
use crate::themes::{ThemeProvider, CHARTS_DIR};

/// Create a standard pipeline with all steps in the correct order.
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(PrepareThemesStep::new())
        .with_step(DecodeStep::new())
        .with_step(MatchStep::new())
        .with_step(ValidateStep::new())
        .with_step(SnapStep::new())
        .with_step(ChaptersStep::new())
}

/// External collaborators for a run. Unset ones get their defaults.
#[derive(Default)]
pub struct Services {
    /// Defaults to ffmpeg decoding into the run's scratch directory.
    pub decoder: Option<Arc<dyn AudioDecoder>>,
    /// Without a provider only cached themes are used.
    pub provider: Option<Arc<dyn ThemeProvider>>,
    /// Takes precedence over the request's keyframe source.
    pub detector: Option<Arc<dyn SceneChangeDetector>>,
    /// Receives every formatted run-log line.
    pub log_callback: Option<LogCallback>,
    pub progress: Option<ProgressCallback>,
    /// Where the run's scratch directory is created. Defaults to the system
    /// temp directory.
    pub scratch_root: Option<PathBuf>,
}

/// How a run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A chapter file was written.
    ChaptersWritten(PathBuf),
    /// The matches could not be laid out; no file was written.
    Rejected(String),
}

/// Generate chapters for one episode.
///
/// Decoded audio lives in a scratch directory that is removed when this
/// returns, on success and on error alike. Background chart rendering is
/// waited for after the chapter file is written.
pub fn run_job(
    request: JobRequest,
    settings: Settings,
    services: Services,
) -> PipelineResult<RunOutcome> {
    let job_name = request.run_name();
    settings
        .validate()
        .map_err(|message| PipelineError::validation_failed(&job_name, message))?;
    if !request.episode.is_file() {
        return Err(PipelineError::validation_failed(
            &job_name,
            format!("Episode not found: {}", request.episode.display()),
        ));
    }
    if let (Some(name), None) = (&request.search_name, &services.provider) {
        return Err(PipelineError::validation_failed(
            &job_name,
            format!(
                "Search name '{}' given but no theme provider is configured; only cached themes can be used",
                name
            ),
        ));
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("autochap-");
    let scratch = match &services.scratch_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(|e| PipelineError::setup_failed(&job_name, format!("scratch directory: {}", e)))?;

    let logs_dir = request.work_path.join(&settings.paths.logs_folder);
    let logger = RunLogger::new(
        &job_name,
        &logs_dir,
        settings.logging.log_config(),
        services.log_callback,
    )
    .map_err(|e| PipelineError::setup_failed(&job_name, format!("log file: {}", e)))?;
    let logger = Arc::new(logger);

    let decoder: Arc<dyn AudioDecoder> = match services.decoder {
        Some(decoder) => decoder,
        None => Arc::new(FfmpegDecoder::new(scratch.path())),
    };

    let mut matcher = CorrelationMatcher::new(settings.matching.match_config());
    if request.charts || settings.matching.charts {
        let charts_dir = request.themes_dir(&settings).join(CHARTS_DIR);
        matcher = matcher.with_charts(Arc::new(PngChartSink::new(charts_dir)));
    }

    let mut ctx = Context::new(
        request,
        settings,
        Arc::clone(&logger),
        decoder,
        MatchScheduler::new(matcher),
    );
    if let Some(provider) = services.provider {
        ctx = ctx.with_provider(provider);
    }
    if let Some(detector) = services.detector {
        ctx = ctx.with_detector(detector);
    }
    if let Some(progress) = services.progress {
        ctx = ctx.with_progress_callback(progress);
    }

    logger.info(&format!("Episode: {}", ctx.request.episode.display()));
    tracing::debug!("Scratch directory {}", scratch.path().display());

    let mut state = RunState::new();
    let result = create_standard_pipeline().run(&ctx, &mut state);

    let charts = ctx.scheduler.matcher().finish_charts();
    if charts > 0 {
        logger.info(&format!("Rendered {} charts to {}", charts, ctx.charts_dir().display()));
    }

    if ctx.request.delete_themes {
        match fs::remove_dir_all(&ctx.themes_dir) {
            Ok(()) => logger.info(&format!("Deleted {}", ctx.themes_dir.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => logger.warn(&format!(
                "Could not delete {}: {}",
                ctx.themes_dir.display(),
                e
            )),
        }
    }

    let outcome = match result {
        Ok(run) => match (run.stopped, state.chapters_path.take()) {
            (Some(stopped), _) => Ok(RunOutcome::Rejected(stopped.reason)),
            (None, Some(path)) => Ok(RunOutcome::ChaptersWritten(path)),
            (None, None) => Err(PipelineError::step_failed(
                &job_name,
                "Chapters",
                StepError::invalid_output("Chapter file not recorded"),
            )),
        },
        Err(e) => Err(e),
    };

    if outcome.is_err() {
        logger.show_tail("error");
    }
    logger.close();
    outcome
}
