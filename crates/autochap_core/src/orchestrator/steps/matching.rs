//! Match step - runs both theme lanes against the episode.

use crate::chapters::format_timestamp;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

pub struct MatchStep;

impl MatchStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MatchStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for MatchStep {
    fn name(&self) -> &str {
        "Match"
    }

    fn description(&self) -> &str {
        "Locate opening and ending in the episode"
    }

    fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let episode = state
            .episode
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("Episode audio not decoded"))?;

        let report = ctx.scheduler.run(episode, &state.clips)?;

        for lane in [&report.opening, &report.ending] {
            for attempt in &lane.attempts {
                match (&attempt.span, &attempt.failure) {
                    (Some(span), _) => ctx.logger.info(&format!(
                        "{} matched from {} -> {} (score {:.0})",
                        attempt.theme,
                        format_timestamp(span.start_secs),
                        format_timestamp(span.end_secs),
                        attempt.score
                    )),
                    (None, Some(reason)) => ctx
                        .logger
                        .warn(&format!("{} could not be matched: {}", attempt.theme, reason)),
                    (None, None) => ctx.logger.detail(&format!(
                        "{} not matched (score {:.0})",
                        attempt.theme, attempt.score
                    )),
                }
            }
            if !lane.skipped.is_empty() {
                let skipped: Vec<String> = lane.skipped.iter().map(|id| id.to_string()).collect();
                ctx.logger.detail(&format!("Skipped {}", skipped.join(", ")));
            }
        }

        let offsets = report.offsets();
        ctx.logger.info(&format!(
            "{} of {} candidates tried, {} offsets",
            report.attempted(),
            state.clips.len(),
            offsets.len()
        ));

        state.offsets = Some(offsets);
        state.report = Some(report);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.offsets.is_none() {
            return Err(StepError::invalid_output("Offsets not recorded"));
        }
        Ok(())
    }
}
