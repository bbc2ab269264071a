//! Core audio and theme types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Decoded mono PCM samples with their sample rate.
///
/// Produced once per run by the decoder and shared read-only by every
/// matcher invocation.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Create a signal from samples. The sample rate must be non-zero.
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidAudio(
                "Sample rate must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Sample values.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the signal has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Keep every `factor`-th sample. A factor of 0 is treated as 1.
    pub fn decimated(&self, factor: usize) -> Vec<f64> {
        self.samples.iter().step_by(factor.max(1)).copied().collect()
    }
}

/// Theme type. Each type is matched in its own lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThemeKind {
    /// Opening song ("OP").
    Opening,
    /// Ending song ("ED").
    Ending,
}

impl ThemeKind {
    /// Identifier prefix used in file names and listings.
    pub fn prefix(&self) -> &'static str {
        match self {
            ThemeKind::Opening => "OP",
            ThemeKind::Ending => "ED",
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ThemeKind::Opening => "Opening",
            ThemeKind::Ending => "Ending",
        }
    }
}

/// Theme identifier: type prefix, sequence number and optional version.
///
/// Printed as `OP1`, `ED2`, `ED2v2`. Ordering is kind, then sequence, then
/// version with the unversioned theme first; this is the library order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThemeId {
    pub kind: ThemeKind,
    pub sequence: u32,
    pub version: Option<u32>,
}

impl ThemeId {
    /// Create an unversioned identifier.
    pub fn new(kind: ThemeKind, sequence: u32) -> Self {
        Self {
            kind,
            sequence,
            version: None,
        }
    }

    /// Set the version suffix.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

impl Ord for ThemeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then(self.sequence.cmp(&other.sequence))
            .then(self.version.cmp(&other.version))
    }
}

impl PartialOrd for ThemeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.sequence)?;
        if let Some(version) = self.version {
            write!(f, "v{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for ThemeId {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AudioError::InvalidThemeId(s.to_string());
        let trimmed = s.trim();
        if trimmed.len() < 2 || !trimmed.is_char_boundary(2) {
            return Err(invalid());
        }

        let (prefix, rest) = trimmed.split_at(2);
        let kind = match prefix.to_ascii_uppercase().as_str() {
            "OP" => ThemeKind::Opening,
            "ED" => ThemeKind::Ending,
            _ => return Err(invalid()),
        };

        let (sequence_part, version_part) = match rest.find(|c: char| c == 'v' || c == 'V') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        // A theme without a sequence number is the first of its kind.
        let sequence = if sequence_part.is_empty() {
            1
        } else {
            sequence_part.parse().map_err(|_| invalid())?
        };

        let version = match version_part {
            Some(v) => Some(v.parse().map_err(|_| invalid())?),
            None => None,
        };

        Ok(Self {
            kind,
            sequence,
            version,
        })
    }
}

impl Serialize for ThemeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ThemeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A reference recording of an opening or ending used as a matching probe.
#[derive(Debug, Clone)]
pub struct ThemeClip {
    pub id: ThemeId,
    pub signal: AudioSignal,
}

impl ThemeClip {
    /// Create a new theme clip.
    pub fn new(id: ThemeId, signal: AudioSignal) -> Self {
        Self { id, signal }
    }

    /// Theme type.
    pub fn kind(&self) -> ThemeKind {
        self.id.kind
    }

    /// Full clip duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.signal.duration_secs()
    }
}

/// Error types for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// FFmpeg/FFprobe execution failed.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// Audio extraction failed.
    #[error("Audio extraction failed: {0}")]
    ExtractionError(String),

    /// Invalid audio data.
    #[error("Invalid audio data: {0}")]
    InvalidAudio(String),

    /// File name does not carry a valid theme identifier.
    #[error("Invalid theme identifier: {0}")]
    InvalidThemeId(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Source file not found.
    #[error("Source file not found: {0}")]
    SourceNotFound(String),
}

/// Type alias for audio results.
pub type AudioResult<T> = Result<T, AudioError>;
