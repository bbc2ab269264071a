//! Chapters step - lays out the chapter boundaries and writes the file.

use crate::chapters::{format_timestamp, synthesize, write_chapters, ChapterEntry};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

/// Synthesizes chapter boundaries from validated offsets and writes them to
/// the requested output file.
pub struct ChaptersStep;

impl ChaptersStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChaptersStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ChaptersStep {
    fn name(&self) -> &str {
        "Chapters"
    }

    fn description(&self) -> &str {
        "Write the chapter file"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if ctx.request.output.as_os_str().is_empty() {
            return Err(StepError::invalid_input("No output path"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let validated = state
            .validated
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("Offsets not validated"))?;
        let duration = state
            .episode_duration()
            .ok_or_else(|| StepError::precondition_failed("Episode audio not decoded"))?;

        let snap = ctx.settings.snap_config();
        let boundaries = synthesize(validated, duration, snap.episode_snap_seconds);
        for boundary in &boundaries {
            ctx.logger.info(&format!(
                "{} {}",
                format_timestamp(boundary.start_secs),
                boundary.label
            ));
        }

        let entries: Vec<ChapterEntry> = boundaries.iter().copied().map(ChapterEntry::from).collect();
        let output = &ctx.request.output;
        write_chapters(output, &entries)?;
        ctx.logger
            .success(&format!("Wrote {} chapters to {}", entries.len(), output.display()));

        state.boundaries = boundaries;
        state.chapters_path = Some(output.clone());
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        match &state.chapters_path {
            Some(path) if path.is_file() => Ok(()),
            Some(path) => Err(StepError::file_not_found(path.display().to_string())),
            None => Err(StepError::invalid_output("Chapter file not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSignal;
    use crate::chapters::{parse_chapters, validate_offsets, ChapterLabel, OffsetList};
    use crate::orchestrator::test_support::{test_context, RATE};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_layout_for_both_themes() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());

        let mut state = RunState::new();
        state.episode = Some(AudioSignal::new(vec![0.0; 60 * RATE as usize], RATE).unwrap());
        let offsets = OffsetList::from_unsorted(vec![10.0, 11.5, 40.0, 41.5]);
        state.validated = Some(validate_offsets(&offsets, 60.0).unwrap());

        let step = ChaptersStep::new();
        assert_eq!(step.execute(&ctx, &mut state).unwrap(), StepOutcome::Success);
        step.validate_output(&ctx, &state).unwrap();

        let labels: Vec<ChapterLabel> = state.boundaries.iter().map(|b| b.label).collect();
        assert_eq!(
            labels,
            vec![
                ChapterLabel::Prologue,
                ChapterLabel::Opening,
                ChapterLabel::Episode,
                ChapterLabel::Ending,
                ChapterLabel::Epilogue,
            ]
        );

        let text = fs::read_to_string(&ctx.request.output).unwrap();
        assert!(text.starts_with("CHAPTER01=00:00:00.000\nCHAPTER01NAME=Prologue\n"));
        let entries = parse_chapters(&text).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[3].name, "Ending");
        assert!((entries[3].start_secs - 40.0).abs() < 1e-9);
    }

    #[test]
    fn requires_validated_offsets() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let err = ChaptersStep::new()
            .execute(&ctx, &mut RunState::new())
            .unwrap_err();
        assert!(matches!(err, StepError::PreconditionFailed(_)));
    }
}
