use flate2::{Decompress, FlushDecompress};

use super::Codec;
use crate::error::{ChdError, Result};

/// Raw deflate (no zlib wrapper), registered as `zlib`.
pub struct DeflateCodec {
    inflater: Decompress,
}

impl DeflateCodec {
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(false),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for DeflateCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        self.inflater.reset(false);
        self.inflater
            .decompress(src, dst, FlushDecompress::Finish)
            .map_err(|e| ChdError::decompression("zlib", e))?;
        Ok(self.inflater.total_out() as usize)
    }
}
