//! Pipeline step implementations.
//!
//! Each step handles one phase of chapter generation.

mod chapters;
mod decode;
mod matching;
mod prepare_themes;
mod snap;
mod validate;

pub use chapters::ChaptersStep;
pub use decode::DecodeStep;
pub use matching::MatchStep;
pub use prepare_themes::PrepareThemesStep;
pub use snap::SnapStep;
pub use validate::ValidateStep;
