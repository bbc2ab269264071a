//! Chapter types and error definitions.
//!
//! Offsets flow from matching through validation and snapping into
//! labeled boundaries, which are finally written as simple chapter entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ascending time instants (seconds) of accepted theme starts and ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetList(Vec<f64>);

impl OffsetList {
    /// Build from unordered offsets. Sorts ascending.
    pub fn from_unsorted(mut offsets: Vec<f64>) -> Self {
        offsets.sort_by(f64::total_cmp);
        Self(offsets)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for OffsetList {
    fn from(offsets: Vec<f64>) -> Self {
        Self::from_unsorted(offsets)
    }
}

/// An offset list that passed validation: two or four ascending offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOffsets(OffsetList);

impl ValidatedOffsets {
    pub(crate) fn new_unchecked(offsets: OffsetList) -> Self {
        Self(offsets)
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a validated list holds two or four offsets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace the offsets after snapping. Re-sorts.
    pub fn with_offsets(self, offsets: Vec<f64>) -> Self {
        Self(OffsetList::from_unsorted(offsets))
    }
}

/// Why an offset list cannot produce chapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OffsetRejection {
    #[error("No matches")]
    NoMatches,

    #[error("Chapters not valid. They both start in the first half")]
    BothInFirstHalf,

    #[error("Chapters not valid. They both start in the second half")]
    BothInSecondHalf,

    #[error("Chapters not valid. Invalid number of offsets ({0})")]
    WrongCount(usize),
}

/// Narrative segment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChapterLabel {
    Prologue,
    Opening,
    Episode,
    Ending,
    Epilogue,
}

impl ChapterLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterLabel::Prologue => "Prologue",
            ChapterLabel::Opening => "Opening",
            ChapterLabel::Episode => "Episode",
            ChapterLabel::Ending => "Ending",
            ChapterLabel::Epilogue => "Epilogue",
        }
    }
}

impl fmt::Display for ChapterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled chapter start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterBoundary {
    pub label: ChapterLabel,
    pub start_secs: f64,
}

impl ChapterBoundary {
    pub fn new(label: ChapterLabel, start_secs: f64) -> Self {
        Self { label, start_secs }
    }
}

/// One entry of a simple chapter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub name: String,
    pub start_secs: f64,
}

impl ChapterEntry {
    pub fn new(name: impl Into<String>, start_secs: f64) -> Self {
        Self {
            name: name.into(),
            start_secs,
        }
    }
}

impl From<ChapterBoundary> for ChapterEntry {
    fn from(boundary: ChapterBoundary) -> Self {
        Self::new(boundary.label.as_str(), boundary.start_secs)
    }
}

/// Timing knobs shared by the synthesizer and the snapper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapConfig {
    /// Scene-change search window in milliseconds.
    pub window_ms: u32,
    /// Offsets this close to either end of the episode snap to it.
    pub episode_snap_seconds: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            episode_snap_seconds: 4.0,
        }
    }
}

/// Rational video frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// NTSC film rate, 24000/1001.
    pub const NTSC_FILM: FrameRate = FrameRate {
        num: 24000,
        den: 1001,
    };

    pub fn new(num: u32, den: u32) -> Result<Self, SnapError> {
        if num == 0 || den == 0 {
            return Err(SnapError::InvalidFrameRate(format!("{}/{}", num, den)));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::NTSC_FILM
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = SnapError;

    /// Accepts `24000/1001` or a decimal such as `23.976`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SnapError::InvalidFrameRate(s.to_string());
        let s = s.trim();

        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse().map_err(|_| invalid())?;
            let den = den.trim().parse().map_err(|_| invalid())?;
            return FrameRate::new(num, den);
        }

        let value: f64 = s.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid());
        }
        // 23.976 and friends are NTSC rates
        for base in [24u32, 30, 48, 60] {
            let ntsc = FrameRate {
                num: base * 1000,
                den: 1001,
            };
            if (ntsc.as_f64() - value).abs() < 0.0005 {
                return Ok(ntsc);
            }
        }
        let num = (value * 1000.0).round();
        if num > u32::MAX as f64 {
            return Err(invalid());
        }
        FrameRate::new(num as u32, 1000)
    }
}

/// Errors from chapter file handling.
#[derive(Debug, thiserror::Error)]
pub enum ChapterError {
    /// Chapter parsing failed.
    #[error("Failed to parse chapters: {0}")]
    ParseError(String),

    /// No chapters found in source.
    #[error("No chapters found in source")]
    NoChapters,

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors from keyframe snapping.
#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    /// The scene-change source cannot be used at all.
    #[error("Scene-change detection unavailable: {0}")]
    Unavailable(String),

    /// Keyframe file is not in a supported format.
    #[error("Unsupported keyframes format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    #[error("Frame {frame} out of range (0..{frame_count})")]
    FrameOutOfRange { frame: u64, frame_count: u64 },

    /// Snap window larger than the detector supports.
    #[error("Snap window of {0}ms exceeds the 1000ms limit")]
    WindowTooLarge(u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for chapter operations.
pub type ChapterResult<T> = Result<T, ChapterError>;
