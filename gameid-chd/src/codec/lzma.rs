use lzma_rust2::LzmaReader;

use super::{Codec, read_full};
use crate::error::{ChdError, Result};

/// Properties byte for lc=3, lp=0, pb=2.
const LZMA_PROPS: u8 = 0x5D;

/// Headerless LZMA as written by the container tools.
///
/// The stream carries neither properties nor a dictionary size; both are
/// fixed by the encoder, the dictionary being derived from the hunk size.
#[derive(Default)]
pub struct LzmaCodec;

impl LzmaCodec {
    pub fn new() -> Self {
        Self
    }

    /// Smallest `2 << i` or `3 << i` (i in 11..=30) that holds `hunk_bytes`.
    pub fn dictionary_size(hunk_bytes: u32) -> u32 {
        for i in 11..=30 {
            let two = 2u32 << i;
            if hunk_bytes <= two {
                return two;
            }
            let three = 3u32 << i;
            if hunk_bytes <= three {
                return three;
            }
        }
        3u32 << 30
    }
}

impl Codec for LzmaCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let dict_size = Self::dictionary_size(dst.len() as u32);
        let mut reader = LzmaReader::new_with_props(src, dst.len() as u64, LZMA_PROPS, dict_size, None)
            .map_err(|e| ChdError::decompression("lzma", e))?;
        read_full(&mut reader, dst).map_err(|e| ChdError::decompression("lzma", e))
    }
}
