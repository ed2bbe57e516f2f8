//! Error types for the export pipeline.

use std::io;
use thiserror::Error;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting a lesson.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading inputs or writing the document.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The lesson JSON could not be read or parsed.
    #[error("Invalid lesson: {0}")]
    Lesson(String),

    /// The export configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The render surface has nothing to export.
    #[error("Render target is missing: the lesson produced no blocks")]
    MissingRenderTarget,

    /// A font could not be parsed.
    #[error("Font error: {0}")]
    Font(String),

    /// An illustration could not be resolved or decoded.
    #[error("Image error: {0}")]
    Image(String),

    /// Painting the surface into a bitmap failed.
    #[error("Rasterization failed: {0}")]
    Raster(String),

    /// Assembling the paginated document failed.
    #[error("Document assembly failed: {0}")]
    Document(String),

    /// Handing the document to the user failed.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Lesson(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
