//! CD frame codecs.
//!
//! A CD hunk holds whole frames of 2352 sector bytes plus 96 subchannel
//! bytes. The compressor splits those into two streams and prefixes them
//! with a small header:
//!
//! ```text
//! [ECC bitmap: ceil(frames / 8) bytes]
//! [sector stream length: 2 bytes, or 3 when the hunk is 64 KiB or larger]
//! [sector stream][subchannel stream]
//! ```
//!
//! A set ECC bit means the compressor stripped the sync header from that
//! frame; it is restored here. ECC parity bytes are not regenerated.

use gameid_core::cd::{CD_SYNC_PATTERN, FRAME_SIZE, RAW_SECTOR_SIZE, SUBCODE_SIZE};
use gameid_core::util::be_uint;

use super::{CdCodec, Codec, DeflateCodec, LzmaCodec, ZstdCodec};
use crate::error::{ChdError, Result};

const SECTOR: usize = RAW_SECTOR_SIZE as usize;
const SUBCODE: usize = SUBCODE_SIZE as usize;
const FRAME: usize = FRAME_SIZE as usize;

/// CD codec built from a sector-stream codec and a subchannel-stream codec.
pub struct FramedCdCodec<B, S> {
    name: &'static str,
    base: B,
    subcode: S,
}

/// `cdzl`: deflate sectors, deflate subchannel.
pub type CdZlibCodec = FramedCdCodec<DeflateCodec, DeflateCodec>;
/// `cdlz`: LZMA sectors, deflate subchannel.
pub type CdLzmaCodec = FramedCdCodec<LzmaCodec, DeflateCodec>;
/// `cdzs`: zstd sectors, zstd subchannel.
pub type CdZstdCodec = FramedCdCodec<ZstdCodec, ZstdCodec>;

impl CdZlibCodec {
    pub fn new() -> Self {
        Self {
            name: "cdzl",
            base: DeflateCodec::new(),
            subcode: DeflateCodec::new(),
        }
    }
}

impl CdLzmaCodec {
    pub fn new() -> Self {
        Self {
            name: "cdlz",
            base: LzmaCodec::new(),
            subcode: DeflateCodec::new(),
        }
    }
}

impl CdZstdCodec {
    pub fn new() -> Self {
        Self {
            name: "cdzs",
            base: ZstdCodec::new(),
            subcode: ZstdCodec::new(),
        }
    }
}

impl<B: Codec, S: Codec> Codec for FramedCdCodec<B, S> {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let frames = (dst.len() / FRAME) as u32;
        self.decompress_cd(src, dst, dst.len() as u32, frames)
    }

    fn as_cd(&mut self) -> Option<&mut dyn CdCodec> {
        Some(self)
    }
}

impl<B: Codec, S: Codec> CdCodec for FramedCdCodec<B, S> {
    fn decompress_cd(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        hunk_bytes: u32,
        frames: u32,
    ) -> Result<usize> {
        let frames = (frames as usize).min(dst.len() / FRAME);
        let ecc_bytes = frames.div_ceil(8);
        let length_bytes = if hunk_bytes < 65536 { 2 } else { 3 };
        let header_bytes = ecc_bytes + length_bytes;
        if src.len() < header_bytes {
            return Err(ChdError::decompression(
                self.name,
                format!("payload of {} bytes has no frame header", src.len()),
            ));
        }

        let base_len = be_uint(&src[ecc_bytes..header_bytes]) as usize;
        let base_end = header_bytes + base_len;
        if base_end > src.len() {
            return Err(ChdError::decompression(
                self.name,
                format!(
                    "sector stream of {} bytes overruns payload of {}",
                    base_len,
                    src.len()
                ),
            ));
        }

        let mut sectors = vec![0u8; frames * SECTOR];
        self.base.decompress(&src[header_bytes..base_end], &mut sectors)?;

        let mut subcode = vec![0u8; frames * SUBCODE];
        if base_end < src.len() {
            self.subcode.decompress(&src[base_end..], &mut subcode)?;
        }

        let ecc = &src[..ecc_bytes];
        interleave(dst, &sectors, &subcode, frames, |frame| {
            ecc[frame / 8] & (1 << (frame % 8)) != 0
        });
        Ok(frames * FRAME)
    }
}

/// Write frames back into `dst`, restoring sync headers where `needs_sync` says so.
pub(super) fn interleave(
    dst: &mut [u8],
    sectors: &[u8],
    subcode: &[u8],
    frames: usize,
    needs_sync: impl Fn(usize) -> bool,
) {
    for frame in 0..frames {
        let out = &mut dst[frame * FRAME..(frame + 1) * FRAME];
        out[..SECTOR].copy_from_slice(&sectors[frame * SECTOR..(frame + 1) * SECTOR]);
        out[SECTOR..].copy_from_slice(&subcode[frame * SUBCODE..(frame + 1) * SUBCODE]);
        if needs_sync(frame) {
            out[..CD_SYNC_PATTERN.len()].copy_from_slice(&CD_SYNC_PATTERN);
        }
    }
}
