use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum SegError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no images found under {path}")]
    EmptyDirectory { path: PathBuf },

    #[error("image/mask count mismatch: {images} images vs {masks} masks")]
    PairMismatch { images: usize, masks: usize },

    #[error("shape error: {0}")]
    Shape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SegError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SegError::Io { path: path.into(), source }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        SegError::Image { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SegError>;
