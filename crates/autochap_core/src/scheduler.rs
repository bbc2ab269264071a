//! Two-lane theme matching.
//!
//! Openings and endings are matched in independent lanes that run
//! concurrently against the same read-only episode. Within a lane the
//! candidates are tried in library order and the first accepted match ends
//! the lane; later candidates are never correlated. The lanes share nothing
//! until both are joined.

use std::thread;

use crate::audio::{AudioSignal, ThemeClip, ThemeId, ThemeKind};
use crate::chapters::OffsetList;
use crate::correlation::{CorrelationError, CorrelationMatcher, MatchResult, PreparedEpisode};

/// What happened in one lane.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneReport {
    pub kind: ThemeKind,
    /// Every correlated candidate, in the order tried.
    pub attempts: Vec<MatchResult>,
    /// Candidates left untried after the lane's match.
    pub skipped: Vec<ThemeId>,
}

impl LaneReport {
    fn empty(kind: ThemeKind) -> Self {
        Self {
            kind,
            attempts: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// The accepted match, if any. Always the last attempt.
    pub fn accepted(&self) -> Option<&MatchResult> {
        self.attempts.last().filter(|r| r.is_matched())
    }
}

/// Merged outcome of both lanes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub opening: LaneReport,
    pub ending: LaneReport,
}

impl MatchReport {
    /// Accepted matches, opening first.
    pub fn accepted(&self) -> impl Iterator<Item = &MatchResult> {
        self.opening.accepted().into_iter().chain(self.ending.accepted())
    }

    /// Start and end of every accepted match, ascending.
    pub fn offsets(&self) -> OffsetList {
        let flat = self
            .accepted()
            .filter_map(|r| r.span)
            .flat_map(|span| [span.start_secs, span.end_secs])
            .collect();
        OffsetList::from_unsorted(flat)
    }

    /// Number of candidates that were actually correlated.
    pub fn attempted(&self) -> usize {
        self.opening.attempts.len() + self.ending.attempts.len()
    }
}

/// Runs the opening and ending lanes.
pub struct MatchScheduler {
    matcher: CorrelationMatcher,
}

impl MatchScheduler {
    pub fn new(matcher: CorrelationMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &CorrelationMatcher {
        &self.matcher
    }

    /// Match `clips` (in library order) against `episode`.
    ///
    /// Fails only when the episode itself cannot be prepared. Per-clip
    /// problems end up as unmatched attempts in the report.
    pub fn run(
        &self,
        episode: &AudioSignal,
        clips: &[ThemeClip],
    ) -> Result<MatchReport, CorrelationError> {
        let prepared = self.matcher.prepare(episode)?;

        let openings: Vec<&ThemeClip> = clips
            .iter()
            .filter(|c| c.kind() == ThemeKind::Opening)
            .collect();
        let endings: Vec<&ThemeClip> = clips
            .iter()
            .filter(|c| c.kind() == ThemeKind::Ending)
            .collect();

        tracing::debug!(
            "Matching {} opening and {} ending candidates",
            openings.len(),
            endings.len()
        );

        let (opening, ending) = thread::scope(|s| {
            let prepared = &prepared;
            let op_lane = s.spawn(move || self.run_lane(prepared, ThemeKind::Opening, openings));
            let ed_lane = s.spawn(move || self.run_lane(prepared, ThemeKind::Ending, endings));

            // A lane panic is a bug, not a per-clip failure
            let opening = op_lane
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            let ending = ed_lane
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (opening, ending)
        });

        Ok(MatchReport { opening, ending })
    }

    fn run_lane(
        &self,
        episode: &PreparedEpisode,
        kind: ThemeKind,
        candidates: Vec<&ThemeClip>,
    ) -> LaneReport {
        let mut report = LaneReport::empty(kind);
        let mut remaining = candidates.into_iter();

        for clip in remaining.by_ref() {
            let result = self.matcher.match_prepared(episode, clip);
            let accepted = result.is_matched();
            report.attempts.push(result);
            if accepted {
                break;
            }
        }

        report.skipped = remaining.map(|c| c.id).collect();
        if !report.skipped.is_empty() {
            tracing::debug!(
                "{} lane matched; skipping {:?}",
                kind.name(),
                report.skipped.iter().map(|id| id.to_string()).collect::<Vec<_>>()
            );
        }
        report
    }
}
