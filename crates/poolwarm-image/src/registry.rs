//! Name-to-backend lookup for cache images.

use crate::sqlite::{self, SqliteImage};
use crate::structured::StructuredFileImage;
use poolwarm_core::ports::CacheImage;
use poolwarm_core::{Error, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// A registered image backend.
#[derive(Clone, Copy)]
pub struct ImageBackend {
    pub name: &'static str,
    pub description: &'static str,
    factory: fn() -> Box<dyn CacheImage>,
}

impl ImageBackend {
    pub fn create(&self) -> Box<dyn CacheImage> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ImageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBackend")
            .field("name", &self.name)
            .finish()
    }
}

static BACKENDS: &[ImageBackend] = &[
    ImageBackend {
        name: "json",
        description: "pretty-printed JSON document",
        factory: || Box::new(StructuredFileImage::json()),
    },
    ImageBackend {
        name: "yaml",
        description: "YAML document",
        factory: || Box::new(StructuredFileImage::yaml()),
    },
    ImageBackend {
        name: sqlite::FORMAT_NAME,
        description: "SQLite database, pages streamed on restore",
        factory: || Box::new(SqliteImage::new()),
    },
];

/// All registered backends, in display order.
pub fn backends() -> &'static [ImageBackend] {
    BACKENDS
}

pub fn names() -> Vec<&'static str> {
    BACKENDS.iter().map(|b| b.name).collect()
}

/// Find a backend by name, ignoring case and surrounding whitespace.
pub fn lookup(name: &str) -> Result<&'static ImageBackend> {
    let wanted = name.trim();
    BACKENDS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| {
            Error::UnsupportedImageFormat(format!(
                "{} (available: {})",
                wanted,
                names().join(", ")
            ))
        })
}

/// Construct a fresh, closed image for the named backend.
pub fn create(name: &str) -> Result<Box<dyn CacheImage>> {
    Ok(lookup(name)?.create())
}

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Guess the backend that wrote an existing image from its leading bytes.
pub async fn detect(path: &Path) -> Result<&'static ImageBackend> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; 16];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let head = &head[..filled];

    let name = if head == SQLITE_MAGIC {
        sqlite::FORMAT_NAME
    } else if head
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
    {
        "json"
    } else {
        "yaml"
    };
    lookup(name)
}
