//! Snap step - moves validated offsets onto nearby scene changes.
//!
//! Skipped unless snapping is enabled. Once enabled, a missing or broken
//! scene-change source fails the run rather than silently writing unsnapped
//! chapters.

use std::sync::Arc;

use crate::chapters::{
    probe_keyframes, snap_offsets, KeyframeList, SceneChangeDetector, SnapError,
};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, KeyframeSource, RunState, StepOutcome};

pub struct SnapStep;

impl SnapStep {
    pub fn new() -> Self {
        Self
    }

    fn detector(&self, ctx: &Context) -> Result<Arc<dyn SceneChangeDetector>, SnapError> {
        if let Some(detector) = &ctx.detector {
            return Ok(Arc::clone(detector));
        }
        let rate = ctx.request.frame_rate;
        let list = match &ctx.request.keyframes {
            KeyframeSource::Scxvid(path) => {
                ctx.logger
                    .info(&format!("Reading keyframes from {}", path.display()));
                KeyframeList::load(path, rate.unwrap_or_default())?
            }
            KeyframeSource::Probe => probe_keyframes(&ctx.request.episode, rate)?,
            KeyframeSource::None => {
                return Err(SnapError::Unavailable(
                    "snapping is enabled but no keyframe source was given".to_string(),
                ))
            }
        };
        Ok(Arc::new(list))
    }
}

impl Default for SnapStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for SnapStep {
    fn name(&self) -> &str {
        "Snap"
    }

    fn description(&self) -> &str {
        "Snap offsets to scene changes"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if let KeyframeSource::Scxvid(path) = &ctx.request.keyframes {
            if ctx.detector.is_none() && !path.is_file() {
                return Err(StepError::file_not_found(path.display().to_string()));
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if !ctx.snapping_enabled() {
            return Ok(StepOutcome::Skipped("Snapping disabled".to_string()));
        }
        let validated = state
            .validated
            .take()
            .ok_or_else(|| StepError::precondition_failed("Offsets not validated"))?;

        let detector = self.detector(ctx)?;
        let window_ms = ctx.settings.snapping.window_ms;
        ctx.logger.info(&format!(
            "Snapping {} offsets within {}ms at {} fps",
            validated.len(),
            window_ms,
            detector.frame_rate()
        ));

        let (snapped, stats) = snap_offsets(validated.as_slice(), detector.as_ref(), window_ms)?;
        for (before, after) in validated.as_slice().iter().zip(&snapped) {
            ctx.logger
                .detail(&format!("{:.3}s -> {:.3}s", before, after));
        }
        ctx.logger.info(&format!(
            "Moved {} of {} offsets to scene changes",
            stats.moved, stats.total
        ));

        state.validated = Some(validated.with_offsets(snapped));
        state.snap_stats = Some(stats);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.validated.is_none() || state.snap_stats.is_none() {
            return Err(StepError::invalid_output("Snapped offsets not recorded"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::{validate_offsets, FrameRate, OffsetList};
    use crate::orchestrator::test_support::test_context;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn state_with(offsets: Vec<f64>) -> RunState {
        let mut state = RunState::new();
        let validated = validate_offsets(&OffsetList::from_unsorted(offsets), 60.0).unwrap();
        state.validated = Some(validated);
        state
    }

    #[test]
    fn skipped_when_disabled() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let mut state = state_with(vec![10.0, 11.5, 40.0, 41.5]);

        let outcome = SnapStep::new().execute(&ctx, &mut state).unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
        assert!(state.snap_stats.is_none());
    }

    #[test]
    fn snaps_to_supplied_detector() {
        let dir = tempdir().unwrap();
        let rate = FrameRate::new(24, 1).unwrap();
        let keyframes = KeyframeList::new(vec![245, 960], Some(1500), rate);
        let ctx = test_context(dir.path()).with_detector(Arc::new(keyframes));
        let mut state = state_with(vec![10.0, 11.5, 40.0, 41.5]);

        let step = SnapStep::new();
        assert_eq!(step.execute(&ctx, &mut state).unwrap(), StepOutcome::Success);
        step.validate_output(&ctx, &state).unwrap();

        let offsets = state.validated.unwrap();
        assert!((offsets.as_slice()[0] - 244.5 / 24.0).abs() < 1e-9);
        assert!((offsets.as_slice()[2] - 959.5 / 24.0).abs() < 1e-9);
        let stats = state.snap_stats.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.moved, 2);
    }

    #[test]
    fn enabled_without_source_is_fatal() {
        let dir = tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.settings.snapping.enabled = true;
        let mut state = state_with(vec![10.0, 11.5, 40.0, 41.5]);

        let err = SnapStep::new().execute(&ctx, &mut state).unwrap_err();
        assert!(matches!(err, StepError::Snap(SnapError::Unavailable(_))));
    }

    #[test]
    fn missing_keyframe_file_fails_validation() {
        let dir = tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.request.keyframes = KeyframeSource::Scxvid(PathBuf::from("/nonexistent/keys.log"));
        assert!(matches!(
            SnapStep::new().validate_input(&ctx),
            Err(StepError::FileNotFound { .. })
        ));
    }
}
