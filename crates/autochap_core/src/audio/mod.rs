//! Audio inputs for theme matching.
//!
//! The episode and every theme clip are decoded once per run into
//! [`AudioSignal`]s. Decoding is behind the [`AudioDecoder`] trait so the
//! matching core never touches containers or external tools directly.

mod ffmpeg;
mod types;

pub use ffmpeg::{probe_sample_rate, AudioDecoder, FfmpegDecoder};
pub use types::{AudioError, AudioResult, AudioSignal, ThemeClip, ThemeId, ThemeKind};
