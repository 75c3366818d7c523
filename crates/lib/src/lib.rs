//! # Tag Catalog Streaming
//!
//! This crate runs an external metadata tool (`exiftool -listx` by default),
//! reads its XML tag catalog incrementally and re-emits it as a streamed JSON
//! document of flattened tag records:
//!
//! ```json
//! {"tags":[{"writable":true,"path":"EXIF:Width","group":"Image::EXIF","description":{"en":"Image width"},"type":"int16u"}]}
//! ```
//!
//! The tool is reached through the [`ToolLauncher`] trait so the transcoding
//! logic can be driven by canned output in tests.

pub mod catalog;
pub mod encoder;
pub mod errors;
pub mod model;
pub mod process;
pub mod transcoder;

pub use catalog::CatalogReader;
pub use encoder::TagArrayEncoder;
pub use errors::{CatalogError, ProcessError, TranscodeError};
pub use model::{Table, Tag, TagRecord};
pub use process::{ExifToolLauncher, ExitReport, ToolLauncher, ToolOutput, ToolProcess};
pub use transcoder::{transcode, TagStream, TranscodeOutcome, Transcoder};
pub use tokio_util::sync::CancellationToken;
