//! Theme-to-episode matching.
//!
//! A theme clip is located by sliding a truncated copy of it across the
//! decimated, silence-padded episode and taking the correlation peak. The
//! peak must clear a threshold that scales inversely with decimation, since
//! raw correlation magnitude grows with the number of samples summed.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioSignal, ThemeClip, ThemeId, ThemeKind};
use crate::chapters::format_timestamp;

use super::chart::{spawn_render, ChartRequest, ChartSink};
use super::xcorr::{correlate_valid, first_peak};

/// Silence prepended to the episode so a theme at time 0 is not clipped.
pub const PAD_SECONDS: f64 = 5.0;

/// Matching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Raw score a peak must exceed at downsample factor 1.
    pub score_threshold: f64,
    /// Keep every Nth sample before correlating.
    pub downsample_factor: usize,
    /// Fraction of (theme duration + pad) used as the probe, in (0, 1].
    pub theme_portion: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            score_threshold: 1000.0,
            downsample_factor: 4,
            theme_portion: 0.5,
        }
    }
}

impl MatchConfig {
    /// Score a peak must exceed after decimation.
    pub fn acceptance_threshold(&self) -> f64 {
        self.score_threshold / self.downsample_factor.max(1) as f64
    }

    fn validate(&self) -> Result<(), CorrelationError> {
        if self.downsample_factor == 0 {
            return Err(CorrelationError::InvalidConfig(
                "downsample_factor must be at least 1".to_string(),
            ));
        }
        if !(self.theme_portion > 0.0 && self.theme_portion <= 1.0) {
            return Err(CorrelationError::InvalidConfig(format!(
                "theme_portion must be in (0, 1], got {}",
                self.theme_portion
            )));
        }
        Ok(())
    }
}

/// Where an accepted theme sits in the episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Outcome of matching one theme clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub theme: ThemeId,
    /// Peak correlation value (0 when correlation never ran).
    pub score: f64,
    /// Present iff the theme was accepted.
    pub span: Option<MatchSpan>,
    /// Why correlation could not run, if it failed.
    pub failure: Option<String>,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.span.is_some()
    }

    pub fn kind(&self) -> ThemeKind {
        self.theme.kind
    }

    fn failed(theme: ThemeId, error: &CorrelationError) -> Self {
        Self {
            theme,
            score: 0.0,
            span: None,
            failure: Some(error.to_string()),
        }
    }
}

/// Errors that make one clip unmatchable. Never fatal for a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorrelationError {
    #[error("Empty signal: {0}")]
    EmptySignal(String),

    #[error("Sample rate mismatch: episode {episode} Hz, theme {theme} Hz")]
    SampleRateMismatch { episode: u32, theme: u32 },

    #[error("Probe of {probe} samples does not fit in padded episode of {episode} samples")]
    ProbeTooLong { probe: usize, episode: usize },

    #[error("Invalid match configuration: {0}")]
    InvalidConfig(String),
}

/// Episode audio decimated and padded once, shared by every theme.
#[derive(Debug, Clone)]
pub struct PreparedEpisode {
    samples: Vec<f64>,
    sample_rate: u32,
    downsample_factor: usize,
    duration_secs: f64,
}

impl PreparedEpisode {
    /// Decimate and pad the episode for the given factor.
    pub fn new(episode: &AudioSignal, downsample_factor: usize) -> Result<Self, CorrelationError> {
        if episode.is_empty() {
            return Err(CorrelationError::EmptySignal("episode".to_string()));
        }
        let factor = downsample_factor.max(1);
        let rate = episode.sample_rate() as f64 / factor as f64;
        let pad_len = (PAD_SECONDS * rate).round() as usize;

        let decimated = episode.decimated(factor);
        let mut samples = Vec::with_capacity(pad_len + decimated.len());
        samples.resize(pad_len, 0.0);
        samples.extend_from_slice(&decimated);

        Ok(Self {
            samples,
            sample_rate: episode.sample_rate(),
            downsample_factor: factor,
            duration_secs: episode.duration_secs(),
        })
    }

    /// Padded, decimated samples.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sample rate of the source signal.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the unpadded source signal.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn effective_rate(&self) -> f64 {
        self.sample_rate as f64 / self.downsample_factor as f64
    }
}

struct Correlation {
    score: f64,
    peak_index: usize,
    offset_secs: f64,
    curve: Vec<f64>,
}

/// Scores theme clips against an episode.
pub struct CorrelationMatcher {
    config: MatchConfig,
    charts: Option<Arc<dyn ChartSink>>,
    pending_charts: Mutex<Vec<JoinHandle<()>>>,
}

impl CorrelationMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config,
            charts: None,
            pending_charts: Mutex::new(Vec::new()),
        }
    }

    /// Render a chart of every correlation curve to `sink`.
    pub fn with_charts(mut self, sink: Arc<dyn ChartSink>) -> Self {
        self.charts = Some(sink);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Decimate and pad the episode with this matcher's settings.
    pub fn prepare(&self, episode: &AudioSignal) -> Result<PreparedEpisode, CorrelationError> {
        PreparedEpisode::new(episode, self.config.downsample_factor)
    }

    /// Match one clip against a raw episode signal.
    pub fn match_theme(&self, episode: &AudioSignal, clip: &ThemeClip) -> MatchResult {
        match self.prepare(episode) {
            Ok(prepared) => self.match_prepared(&prepared, clip),
            Err(e) => {
                tracing::warn!("{} Error in correlate: {}. Continuing...", clip.id, e);
                MatchResult::failed(clip.id, &e)
            }
        }
    }

    /// Match one clip against an already prepared episode.
    pub fn match_prepared(&self, episode: &PreparedEpisode, clip: &ThemeClip) -> MatchResult {
        let correlation = match self.correlate(episode, clip) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("{} Error in correlate: {}. Continuing...", clip.id, e);
                return MatchResult::failed(clip.id, &e);
            }
        };

        let accepted = correlation.score > self.config.acceptance_threshold();
        let span = accepted.then(|| MatchSpan {
            start_secs: correlation.offset_secs,
            end_secs: correlation.offset_secs + clip.duration_secs(),
        });

        match &span {
            Some(span) => tracing::debug!(
                "{} matched from {} -> {} (score {:.1})",
                clip.id,
                format_timestamp(span.start_secs),
                format_timestamp(span.end_secs),
                correlation.score
            ),
            None => tracing::debug!(
                "{} not matched (score {:.1}, needed > {:.1})",
                clip.id,
                correlation.score,
                self.config.acceptance_threshold()
            ),
        }

        if let Some(sink) = &self.charts {
            let request = ChartRequest {
                theme: clip.id,
                matched: accepted,
                curve: correlation.curve,
                peak_index: correlation.peak_index,
            };
            let handle = spawn_render(Arc::clone(sink), request);
            self.pending_charts.lock().push(handle);
        }

        MatchResult {
            theme: clip.id,
            score: correlation.score,
            span,
            failure: None,
        }
    }

    fn correlate(
        &self,
        episode: &PreparedEpisode,
        clip: &ThemeClip,
    ) -> Result<Correlation, CorrelationError> {
        self.config.validate()?;

        if clip.signal.is_empty() {
            return Err(CorrelationError::EmptySignal(clip.id.to_string()));
        }
        if clip.signal.sample_rate() != episode.sample_rate() {
            return Err(CorrelationError::SampleRateMismatch {
                episode: episode.sample_rate(),
                theme: clip.signal.sample_rate(),
            });
        }

        let rate = episode.effective_rate();
        let theme = clip.signal.decimated(episode.downsample_factor);

        let wanted = (self.config.theme_portion * (clip.duration_secs() + PAD_SECONDS) * rate)
            .floor() as usize;
        let probe_len = wanted.clamp(1, theme.len());
        let probe = &theme[..probe_len];

        if probe_len > episode.samples().len() {
            return Err(CorrelationError::ProbeTooLong {
                probe: probe_len,
                episode: episode.samples().len(),
            });
        }

        let curve = correlate_valid(episode.samples(), probe);
        let (peak_index, score) = first_peak(&curve).ok_or_else(|| {
            CorrelationError::EmptySignal(format!("no finite correlation for {}", clip.id))
        })?;

        let offset_secs = (peak_index as f64 / rate - PAD_SECONDS).max(0.0);

        tracing::debug!(
            "{} probe {} samples, peak index {}, offset {:.3}s",
            clip.id,
            probe_len,
            peak_index,
            offset_secs
        );

        Ok(Correlation {
            score,
            peak_index,
            offset_secs,
            curve,
        })
    }

    /// Wait for background chart rendering. Returns the number of charts waited on.
    pub fn finish_charts(&self) -> usize {
        let handles: Vec<_> = std::mem::take(&mut *self.pending_charts.lock());
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Chart rendering thread panicked");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::chart::{ChartError, NullChartSink};

    const RATE: u32 = 1000;

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    /// Episode of noise with `theme` copied in at `offset` samples.
    fn episode_with(theme: &[f64], offset: usize, len: usize) -> AudioSignal {
        let mut samples: Vec<f64> = noise(len, 99).iter().map(|x| x * 0.1).collect();
        samples[offset..offset + theme.len()].copy_from_slice(theme);
        AudioSignal::new(samples, RATE).unwrap()
    }

    fn clip(name: &str, samples: Vec<f64>) -> ThemeClip {
        ThemeClip::new(name.parse().unwrap(), AudioSignal::new(samples, RATE).unwrap())
    }

    fn config(ds: usize, threshold: f64) -> MatchConfig {
        MatchConfig {
            score_threshold: threshold,
            downsample_factor: ds,
            theme_portion: 0.5,
        }
    }

    #[test]
    fn finds_embedded_theme_exactly_without_decimation() {
        let theme = noise(2000, 7);
        let episode = episode_with(&theme, 3000, 8000);
        let matcher = CorrelationMatcher::new(config(1, 100.0));

        let result = matcher.match_theme(&episode, &clip("OP1", theme));
        let span = result.span.expect("theme should match");
        assert!((span.start_secs - 3.0).abs() < 1e-9);
        assert!((span.end_secs - 5.0).abs() < 1e-9);
        assert!(result.failure.is_none());
    }

    /// Low-passed noise, so decimation off the theme's sample grid still correlates.
    fn smooth_noise(len: usize, seed: u64) -> Vec<f64> {
        let raw = noise(len + 15, seed);
        raw.windows(16).map(|w| w.iter().sum::<f64>() / 4.0).collect()
    }

    #[test]
    fn finds_embedded_theme_within_one_decimated_period() {
        let theme = smooth_noise(2000, 11);
        let episode = episode_with(&theme, 4321, 9000);
        let matcher = CorrelationMatcher::new(config(4, 100.0));

        let result = matcher.match_theme(&episode, &clip("ED1", theme));
        let span = result.span.expect("theme should match");
        let period = 4.0 / RATE as f64;
        assert!((span.start_secs - 4.321).abs() <= period, "{}", span.start_secs);
    }

    #[test]
    fn any_threshold_below_the_peak_accepts_the_embedded_offset() {
        let theme = smooth_noise(2000, 11);
        let episode = episode_with(&theme, 4321, 9000);

        for ds in [1, 2, 4] {
            let peak = CorrelationMatcher::new(config(ds, 1.0))
                .match_theme(&episode, &clip("OP1", theme.clone()))
                .score;
            assert!(peak > 0.0, "ds={}", ds);
            let period = ds as f64 / RATE as f64;

            for fraction in [0.05, 0.25, 0.5, 0.75, 0.95] {
                let threshold = peak * fraction * ds as f64;
                let result = CorrelationMatcher::new(config(ds, threshold))
                    .match_theme(&episode, &clip("OP1", theme.clone()));
                let span = result
                    .span
                    .unwrap_or_else(|| panic!("ds={} threshold={} should match", ds, threshold));
                assert!(
                    (span.start_secs - 4.321).abs() <= period,
                    "ds={} threshold={} start={}",
                    ds,
                    threshold,
                    span.start_secs
                );
                assert_eq!(result.score, peak);
            }

            let above = CorrelationMatcher::new(config(ds, peak * 1.05 * ds as f64))
                .match_theme(&episode, &clip("OP1", theme.clone()));
            assert!(!above.is_matched(), "ds={}", ds);
        }
    }

    #[test]
    fn theme_at_start_is_not_clipped() {
        let theme = noise(1500, 5);
        let episode = episode_with(&theme, 0, 6000);
        let matcher = CorrelationMatcher::new(config(1, 100.0));

        let result = matcher.match_theme(&episode, &clip("OP1", theme));
        let span = result.span.expect("theme should match");
        assert_eq!(span.start_secs, 0.0);
    }

    #[test]
    fn threshold_scales_with_decimation() {
        let theme = noise(2000, 13);
        let episode = episode_with(&theme, 1000, 6000);

        // ~2000/3 energy at ds=1; ~500/3 at ds=4 against 1000/4 = 250
        let full = CorrelationMatcher::new(config(1, 500.0)).match_theme(&episode, &clip("OP1", theme.clone()));
        assert!(full.is_matched());

        let decimated = CorrelationMatcher::new(config(4, 1000.0)).match_theme(&episode, &clip("OP1", theme));
        assert!(!decimated.is_matched());
        assert!(decimated.score > 0.0);
        assert!(decimated.failure.is_none());
    }

    #[test]
    fn matching_is_deterministic() {
        let theme = noise(1200, 17);
        let episode = episode_with(&theme, 2500, 7000);
        let matcher = CorrelationMatcher::new(config(2, 100.0));
        let clip = clip("ED2v2", theme);

        let first = matcher.match_theme(&episode, &clip);
        let second = matcher.match_theme(&episode, &clip);
        assert_eq!(first, second);
    }

    #[test]
    fn unrelated_noise_is_rejected() {
        let theme = noise(2000, 21);
        let episode = AudioSignal::new(noise(8000, 22), RATE).unwrap();
        let matcher = CorrelationMatcher::new(config(1, 1000.0));

        let result = matcher.match_theme(&episode, &clip("OP1", theme));
        assert!(!result.is_matched());
        assert!(result.failure.is_none());
    }

    #[test]
    fn sample_rate_mismatch_is_unmatched_not_fatal() {
        let episode = AudioSignal::new(noise(8000, 1), RATE).unwrap();
        let clip = ThemeClip::new(
            "OP1".parse().unwrap(),
            AudioSignal::new(noise(100, 2), 2 * RATE).unwrap(),
        );
        let result = CorrelationMatcher::new(MatchConfig::default()).match_theme(&episode, &clip);
        assert!(!result.is_matched());
        assert!(result.failure.unwrap().contains("Sample rate mismatch"));
    }

    #[test]
    fn empty_clip_is_unmatched() {
        let episode = AudioSignal::new(noise(8000, 1), RATE).unwrap();
        let result = CorrelationMatcher::new(MatchConfig::default())
            .match_theme(&episode, &clip("ED1", Vec::new()));
        assert!(!result.is_matched());
        assert!(result.failure.is_some());
    }

    #[test]
    fn probe_is_clamped_to_one_sample() {
        let episode = AudioSignal::new(noise(100, 1), RATE).unwrap();
        let matcher = CorrelationMatcher::new(MatchConfig {
            score_threshold: 0.0,
            downsample_factor: 1,
            theme_portion: 1e-9,
        });
        let result = matcher.match_theme(&episode, &clip("OP1", vec![1.0]));
        assert!(result.failure.is_none());
    }

    struct FailingSink;

    impl ChartSink for FailingSink {
        fn render(&self, request: &ChartRequest) -> Result<(), ChartError> {
            Err(ChartError::EmptyCurve(request.theme))
        }
    }

    #[test]
    fn chart_failures_never_reach_the_result() {
        let theme = noise(1000, 3);
        let episode = episode_with(&theme, 500, 4000);
        let matcher = CorrelationMatcher::new(config(1, 100.0)).with_charts(Arc::new(FailingSink));

        let result = matcher.match_theme(&episode, &clip("OP1", theme));
        assert!(result.is_matched());
        assert_eq!(matcher.finish_charts(), 1);
        assert_eq!(matcher.finish_charts(), 0);
    }

    #[test]
    fn null_sink_collects_handles() {
        let theme = noise(500, 3);
        let episode = episode_with(&theme, 100, 2000);
        let matcher = CorrelationMatcher::new(config(1, 1e12)).with_charts(Arc::new(NullChartSink));
        matcher.match_theme(&episode, &clip("ED1", theme));
        assert_eq!(matcher.finish_charts(), 1);
    }
}
