//! # Errors
//!
//! One error type for the whole pipeline. Geometry, encoding and decoding
//! never recover from these themselves; skipping a broken frame is the
//! loader's decision.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed calibration, point cloud or subset file. Fatal for the frame.
    #[error("parse error: {0}")]
    Parse(String),

    /// A single annotation record could not be parsed. Lines and columns
    /// are 1-based; column 0 stands for the record as a whole.
    #[error("record parse error at line {line}, column {column}: {value:?}")]
    RecordParse {
        line: usize,
        column: usize,
        value: String,
    },

    /// Perspective projection of a point with non-positive depth.
    #[error("degenerate projection of point {index}: depth {depth}")]
    DegenerateProjection { index: usize, depth: f32 },

    #[error("invalid IoU threshold {0}, expected a value in [0, 1]")]
    InvalidThreshold(f32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
