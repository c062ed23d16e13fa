//! road_data error types

/// road_data result type
pub type Result<T> = std::result::Result<T, Error>;

/// road_data errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Channel normalisation received a tensor it cannot expand
    #[error("image with invalid number of channels given {0}")]
    InvalidChannelCount(usize),

    /// Error from ndarray reshaping or concatenation
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// An array did not have the shape an operation requires
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected dimensions
        expected: Vec<usize>,
        /// Actual dimensions
        got: Vec<usize>,
    },

    /// A batch whose images and features do not line up
    #[error("malformed batch: {reason}")]
    MalformedBatch {
        /// Description of what went wrong
        reason: String,
    },

    /// The batch source has no more batches
    #[error("batch source exhausted")]
    SourceExhausted,

    /// The cache directory holds no shards
    #[error("no batch shards found in {path}")]
    EmptyCache {
        /// Cache directory
        path: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
