//! Chapter boundary synthesis.
//!
//! Turns a validated offset list into labeled boundaries. Three layouts are
//! possible and are chosen in priority order:
//!
//! 1. [`SynthesisBranch::SnapBeginning`]: the first offset is close enough to
//!    the start that the opening is treated as starting at 0.
//! 2. [`SynthesisBranch::EndingOnly`]: the earliest offset is already past the
//!    midpoint, so the only theme found is the ending.
//! 3. [`SynthesisBranch::Default`]: a prologue precedes the opening.
//!
//! Independently, a last offset within the snap distance of the end
//! suppresses the epilogue.

use super::types::{ChapterBoundary, ChapterLabel, ValidatedOffsets};

/// Layout chosen for a set of offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisBranch {
    SnapBeginning,
    EndingOnly,
    Default,
}

/// Pick the layout for `offsets`.
pub fn select_branch(
    offsets: &ValidatedOffsets,
    duration_secs: f64,
    episode_snap_seconds: f64,
) -> SynthesisBranch {
    let first = offsets.as_slice().first().copied().unwrap_or(0.0);
    if first < episode_snap_seconds {
        SynthesisBranch::SnapBeginning
    } else if first >= duration_secs / 2.0 {
        SynthesisBranch::EndingOnly
    } else {
        SynthesisBranch::Default
    }
}

/// Build the chapter boundaries for a validated offset list.
///
/// The result always starts at 0 and is strictly increasing.
pub fn synthesize(
    offsets: &ValidatedOffsets,
    duration_secs: f64,
    episode_snap_seconds: f64,
) -> Vec<ChapterBoundary> {
    use ChapterLabel::*;

    let o = offsets.as_slice();
    let last = o.last().copied().unwrap_or(0.0);
    let snap_end = last > duration_secs - episode_snap_seconds;
    let both_themes = o.len() == 4;
    let branch = select_branch(offsets, duration_secs, episode_snap_seconds);

    let mut planned = Vec::with_capacity(5);
    match branch {
        SynthesisBranch::SnapBeginning => {
            planned.push((Opening, 0.0));
            planned.push((Episode, o[1]));
            if both_themes {
                planned.push((Ending, o[2]));
                if !snap_end {
                    planned.push((Epilogue, o[3]));
                }
            }
        }
        SynthesisBranch::EndingOnly => {
            planned.push((Episode, 0.0));
            planned.push((Ending, o[0]));
            if !snap_end {
                planned.push((Epilogue, o[1]));
            }
        }
        SynthesisBranch::Default => {
            planned.push((Prologue, 0.0));
            planned.push((Opening, o[0]));
            planned.push((Episode, o[1]));
            if both_themes {
                planned.push((Ending, o[2]));
                if !snap_end {
                    planned.push((Epilogue, o[3]));
                }
            }
        }
    }

    tracing::debug!(
        "Chapter layout {:?} (snap_end: {}) for offsets {:?}",
        branch,
        snap_end,
        o
    );

    let mut boundaries: Vec<ChapterBoundary> = Vec::with_capacity(planned.len());
    for (label, start) in planned {
        if let Some(prev) = boundaries.last() {
            if start <= prev.start_secs {
                tracing::debug!(
                    "Dropping {} at {:.3}s, not after {} at {:.3}s",
                    label,
                    start,
                    prev.label,
                    prev.start_secs
                );
                continue;
            }
        }
        boundaries.push(ChapterBoundary::new(label, start));
    }
    boundaries
}
