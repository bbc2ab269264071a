//! Scene-change sources backed by precomputed keyframe lists.
//!
//! Two sources are supported: SCXvid / XviD 2-pass stat files, and the
//! I-frames of the video itself as reported by ffprobe.

use std::path::Path;
use std::process::Command;

use super::snapper::SceneChangeDetector;
use super::types::{FrameRate, SnapError};

/// Header line identifying an XviD 2-pass stat file.
const XVID_STAT_HEADER: &str = "# XviD 2pass stat file";
/// Lines preceding the first frame entry in a stat file.
const XVID_HEADER_LINES: usize = 3;

/// Sorted keyframe indices of one video.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeList {
    frames: Vec<u64>,
    frame_count: u64,
    frame_rate: FrameRate,
}

impl KeyframeList {
    /// Build from keyframe indices. Frame 0 is always a keyframe.
    ///
    /// `frame_count` defaults to one past the last keyframe.
    pub fn new(mut frames: Vec<u64>, frame_count: Option<u64>, frame_rate: FrameRate) -> Self {
        frames.push(0);
        frames.sort_unstable();
        frames.dedup();
        let last = frames.last().copied().unwrap_or(0);
        let frame_count = frame_count.unwrap_or(last + 1).max(last + 1);
        Self {
            frames,
            frame_count,
            frame_rate,
        }
    }

    /// Parse an SCXvid stat file. Keyframes are the lines starting with `i`.
    pub fn from_scxvid(text: &str, frame_rate: FrameRate) -> Result<Self, SnapError> {
        if !text.contains(XVID_STAT_HEADER) {
            return Err(SnapError::UnsupportedFormat(
                "expected an XviD 2pass stat file".to_string(),
            ));
        }

        let lines: Vec<&str> = text.lines().collect();
        let frames: Vec<u64> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with('i'))
            .filter_map(|(idx, _)| idx.checked_sub(XVID_HEADER_LINES))
            .map(|frame| frame as u64)
            .collect();
        let frame_count = lines.len().saturating_sub(XVID_HEADER_LINES) as u64;

        tracing::debug!(
            "Parsed {} keyframes from SCXvid stats ({} frames)",
            frames.len(),
            frame_count
        );
        Ok(Self::new(frames, Some(frame_count), frame_rate))
    }

    /// Load an SCXvid stat file. An unreadable file makes snapping unavailable.
    pub fn load(path: &Path, frame_rate: FrameRate) -> Result<Self, SnapError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnapError::Unavailable(format!("cannot read keyframes {}: {}", path.display(), e))
        })?;
        Self::from_scxvid(&text, frame_rate)
    }

    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    /// Use a different frame rate for frame/time conversion.
    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}

impl SceneChangeDetector for KeyframeList {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn is_scene_change(&self, frame: u64) -> Result<bool, SnapError> {
        if frame >= self.frame_count {
            return Err(SnapError::FrameOutOfRange {
                frame,
                frame_count: self.frame_count,
            });
        }
        Ok(self.frames.binary_search(&frame).is_ok())
    }
}

/// Keyframes of the first video stream, read with ffprobe.
///
/// The frame rate comes from the stream unless `frame_rate` overrides it.
/// A missing ffprobe or unreadable video makes snapping unavailable.
pub fn probe_keyframes(
    video_path: &Path,
    frame_rate: Option<FrameRate>,
) -> Result<KeyframeList, SnapError> {
    tracing::debug!("Extracting keyframes from {}", video_path.display());

    let frame_rate = match frame_rate {
        Some(rate) => rate,
        None => probe_frame_rate(video_path)?,
    };

    let stdout = run_ffprobe(
        video_path,
        &["-show_entries", "frame=pict_type", "-of", "csv=p=0"],
    )?;
    let (frames, frame_count) = parse_pict_types(&stdout);

    tracing::info!(
        "Found {} keyframes in {} frames of {}",
        frames.len(),
        frame_count,
        video_path.display()
    );

    Ok(KeyframeList::new(frames, Some(frame_count), frame_rate))
}

fn probe_frame_rate(video_path: &Path) -> Result<FrameRate, SnapError> {
    let stdout = run_ffprobe(
        video_path,
        &[
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ],
    )?;
    let line = stdout.lines().next().unwrap_or("").trim();
    line.parse()
        .map_err(|_| SnapError::Unavailable(format!("no video frame rate in '{}'", line)))
}

fn run_ffprobe(video_path: &Path, entries: &[&str]) -> Result<String, SnapError> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(entries)
        .arg(video_path)
        .output()
        .map_err(|e| SnapError::Unavailable(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(SnapError::Unavailable(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One line per decoded frame; `I` marks a keyframe.
fn parse_pict_types(stdout: &str) -> (Vec<u64>, u64) {
    let mut frames = Vec::new();
    let mut count = 0u64;
    for line in stdout.lines() {
        let kind = line.trim().trim_end_matches(',');
        if kind.is_empty() {
            continue;
        }
        if kind == "I" {
            frames.push(count);
        }
        count += 1;
    }
    (frames, count)
}
