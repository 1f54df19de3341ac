//! Cache image backends.
//!
//! Every backend implements [`poolwarm_core::ports::CacheImage`], writes
//! through a staged temporary file, and refuses images whose header names
//! another backend or a newer layout.

pub mod header;
pub mod registry;
pub mod sqlite;
pub mod staging;
pub mod structured;
mod validate;

pub use header::{IMAGE_FORMAT_VERSION, ImageHeader};
pub use registry::{ImageBackend, create, detect, lookup};
pub use sqlite::SqliteImage;
pub use staging::StagedPath;
pub use structured::{Codec, StructuredFileImage};
