//! PrepareThemes step - refreshes the theme directory and scans it.
//!
//! With a provider, the series is looked up, the manifest reconciled and
//! missing or outdated themes fetched. A failed lookup falls back to whatever
//! is already cached. The step fails only if no theme audio is left.

use std::fs;

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::themes::{
    execute_downloads, plan_downloads, ThemeError, ThemeLibrary, ThemeManifest, ThemeProvider,
};

pub struct PrepareThemesStep;

impl PrepareThemesStep {
    pub fn new() -> Self {
        Self
    }

    fn refresh(&self, ctx: &Context, provider: &dyn ThemeProvider, state: &mut RunState) -> StepResult<()> {
        let query = ctx.request.series_query();
        ctx.logger.info(&format!("Looking up themes for '{}'", query));

        let listing = match provider.lookup(&query) {
            Ok(listing) => listing,
            Err(e) => {
                ctx.logger
                    .warn(&format!("Theme lookup failed, using cached themes: {}", e));
                return Ok(());
            }
        };
        ctx.logger.info(&format!(
            "Found series '{}' with {} themes",
            listing.series_name,
            listing.themes.len()
        ));

        let dir = &ctx.themes_dir;
        let mut manifest = ThemeManifest::load(dir);
        let removed = manifest.reconcile(&listing.series_name, dir)?;
        if !removed.is_empty() {
            ctx.logger
                .info(&format!("Removed {} themes of a previous series", removed.len()));
        }

        let plan = plan_downloads(&manifest, &listing);
        let report = execute_downloads(
            &plan,
            provider,
            dir,
            ctx.settings.download.concurrency,
            &mut manifest,
        )?;
        manifest.save(dir)?;

        for (id, path) in &report.downloaded {
            ctx.logger.detail(&format!("Downloaded {} to {}", id, path.display()));
        }
        for (id, reason) in &report.failed {
            ctx.logger.warn(&format!("Download of {} failed: {}", id, reason));
        }
        ctx.logger.info(&format!(
            "{} themes up to date, {} downloaded, {} failed",
            plan.up_to_date.len(),
            report.downloaded.len(),
            report.failed.len()
        ));
        state.download = Some(report);
        Ok(())
    }
}

impl Default for PrepareThemesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for PrepareThemesStep {
    fn name(&self) -> &str {
        "PrepareThemes"
    }

    fn description(&self) -> &str {
        "Download and scan theme audio"
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
        fs::create_dir_all(&ctx.themes_dir)
            .map_err(|e| StepError::io_error("create theme directory", e))?;

        if ctx.charts_enabled() {
            let charts = ctx.charts_dir();
            if charts.exists() {
                fs::remove_dir_all(&charts).map_err(|e| StepError::io_error("reset charts", e))?;
            }
            fs::create_dir_all(&charts).map_err(|e| StepError::io_error("reset charts", e))?;
        }

        match &ctx.provider {
            Some(provider) => self.refresh(ctx, provider.as_ref(), state)?,
            None => ctx.logger.info("No theme provider, using cached themes"),
        }

        let library = ThemeLibrary::scan(&ctx.themes_dir)?;
        if library.is_empty() {
            return Err(ThemeError::NoThemes(ctx.themes_dir.clone()).into());
        }
        let names: Vec<String> = library.files().iter().map(|f| f.id.to_string()).collect();
        ctx.logger.info(&format!("Themes: {}", names.join(", ")));

        state.library = Some(library);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        match &state.library {
            Some(library) if !library.is_empty() => Ok(()),
            _ => Err(StepError::invalid_output("Theme library not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ThemeId;
    use crate::orchestrator::test_support::{test_context, touch, StubProvider};
    use crate::themes::RemoteTheme;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn remote(id: &str) -> RemoteTheme {
        RemoteTheme {
            id: id.parse::<ThemeId>().unwrap(),
            fingerprint: "2024-01-01".to_string(),
            locator: format!("https://themes.invalid/{}", id),
            extension: "ogg".to_string(),
        }
    }

    #[test]
    fn cached_themes_are_used_without_provider() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        touch(&ctx.request.episode);
        touch(&ctx.themes_dir.join("ED1.ogg"));
        touch(&ctx.themes_dir.join("OP1.ogg"));

        let mut state = RunState::new();
        let step = PrepareThemesStep::new();
        assert_eq!(step.execute(&ctx, &mut state).unwrap(), StepOutcome::Success);
        step.validate_output(&ctx, &state).unwrap();

        let ids: Vec<String> = state
            .library
            .unwrap()
            .files()
            .iter()
            .map(|f| f.id.to_string())
            .collect();
        assert_eq!(ids, vec!["OP1", "ED1"]);
    }

    #[test]
    fn empty_theme_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        touch(&ctx.request.episode);

        let err = PrepareThemesStep::new()
            .execute(&ctx, &mut RunState::new())
            .unwrap_err();
        assert!(matches!(err, StepError::Theme(ThemeError::NoThemes(_))));
    }

    #[test]
    fn downloads_listed_themes() {
        let dir = tempdir().unwrap();
        let provider = StubProvider::new("Show", vec![remote("OP1"), remote("ED1")]);
        let ctx = test_context(dir.path()).with_provider(Arc::new(provider));
        touch(&ctx.request.episode);

        let mut state = RunState::new();
        PrepareThemesStep::new().execute(&ctx, &mut state).unwrap();

        assert_eq!(state.download.as_ref().unwrap().downloaded.len(), 2);
        assert_eq!(state.library.as_ref().unwrap().len(), 2);
        let manifest = ThemeManifest::load(&ctx.themes_dir);
        assert_eq!(manifest.series_name.as_deref(), Some("Show"));
        assert!(manifest.fingerprint("OP1").is_some());
    }

    #[test]
    fn failed_lookup_falls_back_to_cache() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path()).with_provider(Arc::new(StubProvider::offline()));
        touch(&ctx.request.episode);
        touch(&ctx.themes_dir.join("OP1.ogg"));

        let mut state = RunState::new();
        PrepareThemesStep::new().execute(&ctx, &mut state).unwrap();
        assert!(state.download.is_none());
        assert_eq!(state.library.unwrap().len(), 1);
    }

    #[test]
    fn missing_episode_fails_input_validation() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        assert!(matches!(
            PrepareThemesStep::new().validate_input(&ctx),
            Err(StepError::FileNotFound { .. })
        ));
    }
}
