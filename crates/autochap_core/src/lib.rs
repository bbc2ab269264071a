//! autochap core - theme matching and chapter synthesis
//!
//! This crate contains all matching and chapter logic with no CLI
//! dependencies. It locates an episode's opening and ending by
//! cross-correlating known theme audio against the episode's audio track,
//! then writes a chapter file describing the episode's segments.

pub mod audio;
pub mod chapters;
pub mod config;
pub mod correlation;
pub mod logging;
pub mod orchestrator;
pub mod scheduler;
pub mod themes;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
