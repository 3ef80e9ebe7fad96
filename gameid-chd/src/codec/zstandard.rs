use super::Codec;
use crate::error::{ChdError, Result};

/// Zstandard frames, one per hunk.
#[derive(Default)]
pub struct ZstdCodec;

impl ZstdCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for ZstdCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        zstd::bulk::decompress_to_buffer(src, dst).map_err(|e| ChdError::decompression("zstd", e))
    }
}
