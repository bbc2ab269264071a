//! Validate step - accepts or rejects the matched offsets.
//!
//! A rejection stops the run without an error and without a chapter file.

use crate::chapters::validate_offsets;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

pub struct ValidateStep;

impl ValidateStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ValidateStep {
    fn name(&self) -> &str {
        "Validate"
    }

    fn description(&self) -> &str {
        "Check that the offsets form a usable layout"
    }

    fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let offsets = state
            .offsets
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("Offsets not recorded"))?;
        let duration = state
            .episode_duration()
            .ok_or_else(|| StepError::precondition_failed("Episode audio not decoded"))?;

        match validate_offsets(offsets, duration) {
            Ok(validated) => {
                ctx.logger
                    .debug(&format!("Offsets accepted: {:?}", validated.as_slice()));
                state.validated = Some(validated);
                Ok(StepOutcome::Success)
            }
            Err(rejection) => {
                let reason = rejection.to_string();
                ctx.logger.rejected(&reason);
                state.rejection = Some(reason.clone());
                Ok(StepOutcome::Stopped(reason))
            }
        }
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.validated.is_none() {
            return Err(StepError::invalid_output("Validated offsets not recorded"));
        }
        Ok(())
    }
}
