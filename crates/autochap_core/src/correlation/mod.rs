//! Cross-correlation matching of theme clips against episode audio.

mod chart;
mod matcher;
mod xcorr;

pub use chart::{spawn_render, ChartError, ChartRequest, ChartSink, NullChartSink, PngChartSink};
pub use matcher::{
    CorrelationError, CorrelationMatcher, MatchConfig, MatchResult, MatchSpan, PreparedEpisode,
    PAD_SECONDS,
};
pub use xcorr::{correlate_valid, first_peak};
