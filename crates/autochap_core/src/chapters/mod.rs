//! Chapter synthesis module.
//!
//! Takes the sorted offsets of matched themes and turns them into a chapter
//! file.
//!
//! # Features
//!
//! - **Validation**: Reject offset sets that cannot describe an episode
//! - **Synthesis**: Label boundaries as Prologue / Opening / Episode / Ending / Epilogue
//! - **Snapping**: Move boundaries onto nearby scene changes
//! - **Serialization**: Read and write the simple `CHAPTERnn=` format
//!
//! # Usage
//!
//! ```ignore
//! use autochap_core::chapters::{validate_offsets, synthesize, write_chapters, ChapterEntry};
//!
//! let valid = validate_offsets(&offsets, duration)?;
//! let boundaries = synthesize(&valid, duration, 4.0);
//! let entries: Vec<ChapterEntry> = boundaries.into_iter().map(Into::into).collect();
//! write_chapters(Path::new("episode.chapters.txt"), &entries)?;
//! ```

mod format;
mod keyframes;
mod snapper;
mod synthesizer;
mod types;
mod validator;

// Re-export types
pub use types::{
    ChapterBoundary, ChapterEntry, ChapterError, ChapterLabel, ChapterResult, FrameRate,
    OffsetList, OffsetRejection, SnapConfig, SnapError, ValidatedOffsets,
};

// Re-export functions
pub use format::{format_timestamp, parse_chapters, parse_timestamp, render_chapters, write_chapters};
pub use keyframes::{probe_keyframes, KeyframeList};
pub use snapper::{
    find_scene_change, frame_for_offset, frame_start_secs, snap_chapter_file, snap_offset,
    snap_offsets, window_frames, SceneChangeDetector, SnapStats, MAX_WINDOW_MS,
};
pub use synthesizer::{select_branch, synthesize, SynthesisBranch};
pub use validator::validate_offsets;
