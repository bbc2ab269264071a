//! Chapter keyframe snapping.
//!
//! Moves chapter offsets onto nearby scene changes so that chapter cuts land
//! on clean shot boundaries. The search is radial around the estimated frame
//! (center, then one frame earlier, one later, two earlier, ...), so the
//! closest scene change wins and ties favor the earlier frame.

use super::types::{ChapterEntry, FrameRate, SnapError};

/// Largest snap window the detectors are expected to handle.
pub const MAX_WINDOW_MS: u32 = 1000;

/// Source of scene-change information for one video.
pub trait SceneChangeDetector: Send + Sync {
    /// Total number of frames in the video.
    fn frame_count(&self) -> u64;

    /// Video frame rate.
    fn frame_rate(&self) -> FrameRate;

    /// Whether `frame` starts a new scene.
    fn is_scene_change(&self, frame: u64) -> Result<bool, SnapError>;
}

/// Counters from a snapping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapStats {
    /// Offsets considered.
    pub total: usize,
    /// Offsets moved onto a scene change.
    pub moved: usize,
    /// Offsets with no scene change in the window.
    pub unchanged: usize,
}

/// Frame the offset is estimated to fall in. Rounds up.
pub fn frame_for_offset(offset_secs: f64, rate: FrameRate) -> i64 {
    (offset_secs * rate.as_f64()).ceil() as i64
}

/// Start time of `frame`: half a frame before its nominal time, floored at 0.
pub fn frame_start_secs(frame: u64, rate: FrameRate) -> f64 {
    ((frame as f64 - 0.5) / rate.as_f64()).max(0.0)
}

/// Window half-width in frames for a window in milliseconds.
pub fn window_frames(window_ms: u32, rate: FrameRate) -> i64 {
    (window_ms as f64 / 1000.0 * rate.as_f64()).round() as i64
}

/// Find the scene change closest to `target` within `[target - window - 1, target + window]`.
pub fn find_scene_change(
    detector: &dyn SceneChangeDetector,
    target: i64,
    window: i64,
) -> Result<Option<u64>, SnapError> {
    let frame_count = detector.frame_count() as i64;
    if frame_count == 0 {
        return Ok(None);
    }

    let lo = (target - window - 1).max(0);
    let hi = (target + window).min(frame_count - 1);
    if lo > hi {
        return Ok(None);
    }

    let in_range = |f: i64| f >= lo && f <= hi;
    for distance in 0..=(window + 1) {
        let candidates = if distance == 0 {
            [Some(target), None]
        } else {
            [Some(target - distance), Some(target + distance)]
        };
        for frame in candidates.into_iter().flatten() {
            if in_range(frame) && detector.is_scene_change(frame as u64)? {
                return Ok(Some(frame as u64));
            }
        }
    }
    Ok(None)
}

/// Snap one offset. Returns the original offset when no scene change is in range.
pub fn snap_offset(
    offset_secs: f64,
    detector: &dyn SceneChangeDetector,
    window_ms: u32,
) -> Result<f64, SnapError> {
    let rate = detector.frame_rate();
    let target = frame_for_offset(offset_secs, rate);
    let window = window_frames(window_ms, rate);

    match find_scene_change(detector, target, window)? {
        Some(frame) => {
            let snapped = frame_start_secs(frame, rate);
            tracing::trace!(
                "Offset {:.3}s (frame {}) -> frame {} at {:.3}s",
                offset_secs,
                target,
                frame,
                snapped
            );
            Ok(snapped)
        }
        None => {
            tracing::trace!("Offset {:.3}s has no scene change in window", offset_secs);
            Ok(offset_secs)
        }
    }
}

/// Snap every offset and re-sort the result.
pub fn snap_offsets(
    offsets: &[f64],
    detector: &dyn SceneChangeDetector,
    window_ms: u32,
) -> Result<(Vec<f64>, SnapStats), SnapError> {
    check_window(window_ms)?;

    let mut stats = SnapStats {
        total: offsets.len(),
        ..SnapStats::default()
    };
    let mut snapped = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        let value = snap_offset(offset, detector, window_ms)?;
        if value != offset {
            stats.moved += 1;
        } else {
            stats.unchanged += 1;
        }
        snapped.push(value);
    }
    snapped.sort_by(f64::total_cmp);

    tracing::debug!(
        "Snapped {} of {} offsets to scene changes ({}ms window)",
        stats.moved,
        stats.total,
        window_ms
    );
    Ok((snapped, stats))
}

/// Snap the entries of an existing chapter file. The chapter at 0 stays put.
pub fn snap_chapter_file(
    entries: &[ChapterEntry],
    detector: &dyn SceneChangeDetector,
    window_ms: u32,
) -> Result<(Vec<ChapterEntry>, SnapStats), SnapError> {
    check_window(window_ms)?;

    let mut stats = SnapStats::default();
    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.start_secs == 0.0 {
            result.push(entry.clone());
            continue;
        }
        stats.total += 1;
        let start = snap_offset(entry.start_secs, detector, window_ms)?;
        if start != entry.start_secs {
            stats.moved += 1;
        } else {
            stats.unchanged += 1;
        }
        result.push(ChapterEntry::new(entry.name.clone(), start));
    }

    // Re-sort after snapping (order might change with aggressive snapping)
    result.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
    Ok((result, stats))
}

fn check_window(window_ms: u32) -> Result<(), SnapError> {
    if window_ms > MAX_WINDOW_MS {
        return Err(SnapError::WindowTooLarge(window_ms));
    }
    Ok(())
}
