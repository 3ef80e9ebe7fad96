//! FLAC audio codecs.
//!
//! Payloads are bare FLAC frames with no stream header. The container tools
//! write 16-bit stereo frames that state their own sample size, so frames
//! are decoded one by one straight from the payload.

use std::io::Cursor;

use claxon::frame::FrameReader;

use gameid_core::cd::{FRAME_SIZE, RAW_SECTOR_SIZE, SUBCODE_SIZE};

use super::cd::interleave;
use super::{CdCodec, Codec, DeflateCodec};
use crate::error::{ChdError, Result};

/// Bytes per interleaved stereo sample.
const BYTES_PER_SAMPLE: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SampleOrder {
    Little,
    Big,
}

/// Generic `flac`: the first payload byte selects sample byte order.
#[derive(Default)]
pub struct FlacCodec;

impl FlacCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for FlacCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let (&marker, frames) = src
            .split_first()
            .ok_or_else(|| ChdError::decompression("flac", "empty payload"))?;
        let order = match marker {
            b'L' => SampleOrder::Little,
            b'B' => SampleOrder::Big,
            other => {
                return Err(ChdError::decompression(
                    "flac",
                    format!("unknown byte order marker 0x{:02x}", other),
                ));
            }
        };
        decode_samples(frames, dst, order)
            .map(|decoded| decoded.written)
            .map_err(|reason| ChdError::decompression("flac", reason))
    }
}

/// `cdfl`: CD audio frames with samples stored big-endian.
///
/// The deflated subchannel stream follows the last FLAC frame with no
/// length prefix; it starts wherever the audio decoder stopped reading.
#[derive(Default)]
pub struct CdFlacCodec {
    subcode: DeflateCodec,
}

impl CdFlacCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for CdFlacCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let frames = (dst.len() as u64 / FRAME_SIZE) as u32;
        self.decompress_cd(src, dst, dst.len() as u32, frames)
    }

    fn as_cd(&mut self) -> Option<&mut dyn CdCodec> {
        Some(self)
    }
}

impl CdCodec for CdFlacCodec {
    fn decompress_cd(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        _hunk_bytes: u32,
        frames: u32,
    ) -> Result<usize> {
        let frames = (frames as usize).min(dst.len() / FRAME_SIZE as usize);
        let mut audio = vec![0u8; frames * RAW_SECTOR_SIZE as usize];
        let consumed = match decode_samples(src, &mut audio, SampleOrder::Big) {
            Ok(decoded) => decoded.consumed,
            Err(reason) => {
                // Audio is irrelevant to identification; keep the hunk readable.
                log::debug!("cdfl audio undecodable ({}), substituting silence", reason);
                audio.fill(0);
                src.len()
            }
        };

        let mut subcode = vec![0u8; frames * SUBCODE_SIZE as usize];
        if consumed < src.len()
            && let Err(e) = self.subcode.decompress(&src[consumed..], &mut subcode)
        {
            log::debug!("cdfl subchannel undecodable ({}), substituting zeros", e);
            subcode.fill(0);
        }

        interleave(dst, &audio, &subcode, frames, |_| false);
        Ok(frames * FRAME_SIZE as usize)
    }
}

struct Decoded {
    /// Bytes of PCM written to the destination.
    written: usize,
    /// Bytes of FLAC input the frames occupied.
    consumed: usize,
}

/// Decode interleaved 16-bit stereo samples into `dst` until it is full.
fn decode_samples(
    frames: &[u8],
    dst: &mut [u8],
    order: SampleOrder,
) -> std::result::Result<Decoded, String> {
    let mut reader = FrameReader::new(Cursor::new(frames));

    let mut written = 0;
    let mut buffer = Vec::new();
    while written + BYTES_PER_SAMPLE <= dst.len() {
        let block = match reader.read_next_or_eof(buffer) {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(e) => return Err(e.to_string()),
        };
        let right_channel = if block.channels() > 1 { 1 } else { 0 };
        for i in 0..block.duration() {
            if written + BYTES_PER_SAMPLE > dst.len() {
                break;
            }
            let left = block.sample(0, i) as i16;
            let right = block.sample(right_channel, i) as i16;
            let (l, r) = match order {
                SampleOrder::Little => (left.to_le_bytes(), right.to_le_bytes()),
                SampleOrder::Big => (left.to_be_bytes(), right.to_be_bytes()),
            };
            dst[written..written + 2].copy_from_slice(&l);
            dst[written + 2..written + 4].copy_from_slice(&r);
            written += BYTES_PER_SAMPLE;
        }
        buffer = block.into_buffer();
    }

    Ok(Decoded {
        written,
        consumed: reader.into_inner().position() as usize,
    })
}
