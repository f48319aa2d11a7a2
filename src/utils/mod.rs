pub mod archive;
pub mod path_validator;
pub mod pattern;

pub use archive::{ArchiveExtractor, ContentKind, ZipExtractor, write_temp_archive};
pub use path_validator::PathValidator;
pub use pattern::PatternMatcher;
