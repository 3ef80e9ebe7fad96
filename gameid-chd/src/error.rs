use std::io;

use thiserror::Error;

use gameid_core::util::fourcc;

/// Errors raised while decoding a CHD container.
#[derive(Error, Debug)]
pub enum ChdError {
    /// I/O error while reading the container
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The first eight bytes are not `MComprHD`
    #[error("Not a CHD container: missing MComprHD magic")]
    InvalidMagic,

    /// Header too short, truncated, or internally inconsistent
    #[error("Invalid CHD header: {0}")]
    InvalidHeader(String),

    /// Header revision outside 3..=5
    #[error("Unsupported CHD version {0}")]
    UnsupportedVersion(u32),

    /// No codec is registered for the tag
    #[error("Unsupported compression codec 0x{tag:08x} ({name})")]
    UnsupportedCodec { tag: u32, name: String },

    /// Hunk index past the end of the hunk map
    #[error("Hunk {index} out of range (container has {count} hunks)")]
    HunkOutOfRange { index: u64, count: u32 },

    /// A codec failed to decode a hunk payload
    #[error("{codec} decompression failed: {reason}")]
    Decompression { codec: &'static str, reason: String },

    /// Decoded hunk does not match the checksum recorded in the map
    #[error("Hunk {index} checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    CorruptHunk {
        index: u32,
        expected: u32,
        actual: u32,
    },

    /// The hunk map could not be decoded
    #[error("Invalid hunk map: {0}")]
    InvalidMap(String),

    /// The metadata chain or a track record is malformed
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The hunk lives in a parent container, which is not supported
    #[error("Hunk {index} is stored in a parent CHD")]
    ParentRequired { index: u32 },
}

impl ChdError {
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Header shorter than its revision requires.
    pub fn header_too_small(version: u32, expected: u64, actual: u64) -> Self {
        Self::InvalidHeader(format!(
            "v{} header needs {} bytes, got {}",
            version, expected, actual
        ))
    }

    pub fn unsupported_codec(tag: u32) -> Self {
        Self::UnsupportedCodec {
            tag,
            name: fourcc(tag),
        }
    }

    pub fn decompression(codec: &'static str, reason: impl ToString) -> Self {
        Self::Decompression {
            codec,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_map(msg: impl Into<String>) -> Self {
        Self::InvalidMap(msg.into())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<ChdError> for io::Error {
    fn from(err: ChdError) -> Self {
        match err {
            ChdError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChdError>;
