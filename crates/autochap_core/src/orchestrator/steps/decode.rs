//! Decode step - decodes the episode and every theme at one sample rate.
//!
//! The episode is decoded at its native rate and the themes are resampled to
//! match. An undecodable episode is fatal; undecodable themes are skipped.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::themes::ThemeError;

pub struct DecodeStep;

impl DecodeStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DecodeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for DecodeStep {
    fn name(&self) -> &str {
        "Decode"
    }

    fn description(&self) -> &str {
        "Decode episode and theme audio"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if !ctx.request.episode.is_file() {
            return Err(StepError::file_not_found(
                ctx.request.episode.display().to_string(),
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let library = state
            .library
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("Themes were not prepared"))?;

        let episode_path = &ctx.request.episode;
        let sample_rate = ctx.decoder.native_sample_rate(episode_path)?;
        let episode = ctx.decoder.decode(episode_path, sample_rate)?;
        ctx.logger.info(&format!(
            "Episode: {:.1}s at {} Hz",
            episode.duration_secs(),
            sample_rate
        ));

        let clips = library.load(ctx.decoder.as_ref(), sample_rate);
        if clips.len() < library.len() {
            ctx.logger.warn(&format!(
                "{} of {} themes could not be decoded",
                library.len() - clips.len(),
                library.len()
            ));
        }
        if clips.is_empty() {
            return Err(ThemeError::NoThemes(library.dir().to_path_buf()).into());
        }
        for clip in &clips {
            ctx.logger
                .detail(&format!("{}: {:.1}s", clip.id, clip.duration_secs()));
        }

        state.episode = Some(episode);
        state.clips = clips;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.episode.is_none() {
            return Err(StepError::invalid_output("Episode audio not recorded"));
        }
        if state.clips.is_empty() {
            return Err(StepError::invalid_output("No theme clips decoded"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::orchestrator::test_support::{noise, test_context_with, touch, StubDecoder, RATE};
    use crate::themes::ThemeLibrary;
    use tempfile::tempdir;

    #[test]
    fn decodes_episode_and_skips_broken_themes() {
        let dir = tempdir().unwrap();
        let decoder = StubDecoder::new()
            .with("Show - 01.mkv", noise(5000, 1))
            .with("OP1.ogg", noise(1000, 2));
        let ctx = test_context_with(dir.path(), decoder);
        touch(&ctx.request.episode);
        touch(&ctx.themes_dir.join("OP1.ogg"));
        touch(&ctx.themes_dir.join("ED1.ogg"));

        let mut state = RunState::new();
        state.library = Some(ThemeLibrary::scan(&ctx.themes_dir).unwrap());

        let step = DecodeStep::new();
        assert_eq!(step.execute(&ctx, &mut state).unwrap(), StepOutcome::Success);
        step.validate_output(&ctx, &state).unwrap();

        assert_eq!(state.episode_duration(), Some(5.0));
        assert_eq!(state.clips.len(), 1);
        assert_eq!(state.clips[0].id.to_string(), "OP1");
        assert_eq!(state.clips[0].signal.sample_rate(), RATE);
    }

    #[test]
    fn undecodable_episode_is_fatal() {
        let dir = tempdir().unwrap();
        let decoder = StubDecoder::new().with("OP1.ogg", noise(1000, 2));
        let ctx = test_context_with(dir.path(), decoder);
        touch(&ctx.request.episode);
        touch(&ctx.themes_dir.join("OP1.ogg"));

        let mut state = RunState::new();
        state.library = Some(ThemeLibrary::scan(&ctx.themes_dir).unwrap());

        let err = DecodeStep::new().execute(&ctx, &mut state).unwrap_err();
        assert!(matches!(err, StepError::Audio(AudioError::SourceNotFound(_))));
    }

    #[test]
    fn requires_prepared_library() {
        let dir = tempdir().unwrap();
        let decoder = StubDecoder::new().with("Show - 01.mkv", noise(10, 1));
        let ctx = test_context_with(dir.path(), decoder);
        let err = DecodeStep::new()
            .execute(&ctx, &mut RunState::new())
            .unwrap_err();
        assert!(matches!(err, StepError::PreconditionFailed(_)));
    }
}
