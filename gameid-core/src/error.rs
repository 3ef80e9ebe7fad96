use thiserror::Error;

/// Errors raised while identifying the contents of a disc image.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// I/O error while reading the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not recognized or is invalid
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// A descriptor or header is corrupted or incomplete
    #[error("Corrupted header: {0}")]
    CorruptedHeader(String),

    /// The image is too small to contain valid data
    #[error("Image too small: expected at least {expected} bytes, got {actual}")]
    TooSmall { expected: u64, actual: u64 },

    /// A named entry was looked up and not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AnalysisError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn corrupted_header(msg: impl Into<String>) -> Self {
        Self::CorruptedHeader(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
