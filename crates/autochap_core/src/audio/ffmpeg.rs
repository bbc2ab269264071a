//! FFmpeg audio decoding.
//!
//! Decodes the first audio stream of a media file to mono raw f64 samples
//! in a scratch directory, then loads them into an [`AudioSignal`]. Each
//! intermediate file is deleted as soon as its samples are in memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{AudioError, AudioResult, AudioSignal};

/// Source of decoded PCM for the episode and the theme clips.
pub trait AudioDecoder: Send + Sync {
    /// Native sample rate of the first audio stream.
    fn native_sample_rate(&self, path: &Path) -> AudioResult<u32>;

    /// Decode to mono at the given sample rate.
    fn decode(&self, path: &Path, sample_rate: u32) -> AudioResult<AudioSignal>;
}

/// Decoder that shells out to `ffmpeg` / `ffprobe`.
pub struct FfmpegDecoder {
    scratch_dir: PathBuf,
    counter: AtomicUsize,
}

impl FfmpegDecoder {
    /// Create a decoder writing intermediate PCM files under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            counter: AtomicUsize::new(0),
        }
    }

    /// Directory holding decoded intermediates.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    fn scratch_path(&self, input_path: &Path) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.scratch_dir.join(format!("{}.{}.f64", stem, n))
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn native_sample_rate(&self, path: &Path) -> AudioResult<u32> {
        probe_sample_rate(path)
    }

    fn decode(&self, path: &Path, sample_rate: u32) -> AudioResult<AudioSignal> {
        if !path.exists() {
            return Err(AudioError::SourceNotFound(path.display().to_string()));
        }

        fs::create_dir_all(&self.scratch_dir)?;
        let out_path = self.scratch_path(path);

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-v")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(path)
            .arg("-vn") // No video
            .arg("-ac")
            .arg("1") // Mono
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-f")
            .arg("f64le")
            .arg("-acodec")
            .arg("pcm_f64le")
            .arg(&out_path)
            .stdin(Stdio::null());

        tracing::debug!("Running FFmpeg: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| AudioError::FfmpegError(format!("Failed to spawn FFmpeg: {}", e)))?;

        if !output.status.success() {
            remove_scratch(&out_path);
            return Err(AudioError::FfmpegError(format!(
                "FFmpeg exited with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let samples = read_scratch_samples(&out_path)?;

        if samples.is_empty() {
            return Err(AudioError::ExtractionError(format!(
                "No audio samples decoded from {}",
                path.display()
            )));
        }

        tracing::debug!(
            "Decoded {} samples ({:.2}s) from {}",
            samples.len(),
            samples.len() as f64 / sample_rate as f64,
            path.display()
        );

        AudioSignal::new(samples, sample_rate)
    }
}

/// Get the sample rate of the first audio stream using FFprobe.
pub fn probe_sample_rate(input_path: &Path) -> AudioResult<u32> {
    if !input_path.exists() {
        return Err(AudioError::SourceNotFound(
            input_path.display().to_string(),
        ));
    }

    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("a:0")
        .arg("-show_entries")
        .arg("stream=sample_rate")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(input_path)
        .output()
        .map_err(|e| AudioError::FfmpegError(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(AudioError::FfmpegError(format!(
            "ffprobe failed to read sample rate of {}",
            input_path.display()
        )));
    }

    parse_sample_rate(&String::from_utf8_lossy(&output.stdout))
}

fn parse_sample_rate(stdout: &str) -> AudioResult<u32> {
    let line = stdout.lines().next().unwrap_or("").trim();
    match line.parse::<u32>() {
        Ok(rate) if rate > 0 => Ok(rate),
        _ => Err(AudioError::ExtractionError(format!(
            "No audio stream sample rate in ffprobe output: '{}'",
            line
        ))),
    }
}

/// Load a decoded intermediate and delete it.
fn read_scratch_samples(path: &Path) -> AudioResult<Vec<f64>> {
    let bytes = fs::read(path);
    remove_scratch(path);
    Ok(bytes_to_f64_samples(&bytes?))
}

fn remove_scratch(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Convert raw bytes to f64 samples (little-endian).
fn bytes_to_f64_samples(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            f64::from_le_bytes(arr)
        })
        .collect()
}
