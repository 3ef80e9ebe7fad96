//! In-memory container builder for tests.
//!
//! Produces byte-exact v3, v4 and v5 containers from a list of hunks, so
//! tests can exercise every map encoding without fixture files.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use lzma_rust2::{LzmaOptions, LzmaWriter};
use sha1::{Digest, Sha1};

use gameid_core::cd::{FRAME_SIZE, RAW_SECTOR_SIZE, SUBCODE_SIZE};

use crate::codec::{CodecTag, LzmaCodec};
use crate::header::{CHD_MAGIC, V3_HEADER_SIZE, V4_HEADER_SIZE, V5_HEADER_SIZE};
use crate::hunks::CRC16;
use crate::metadata::CDROM_TRACK_METADATA2_TAG;

// v5 compressed map codes used by the encoder.
const V5_NONE: u8 = 4;
const V5_SELF: u8 = 5;
const V5_PARENT: u8 = 6;
const V5_RLE_SMALL: u8 = 7;
const V5_RLE_LARGE: u8 = 8;

/// MSB-first bit writer, the inverse of the map's bit reader.
#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, value: u32, count: u32) {
        for bit in (0..count).rev() {
            self.acc = (self.acc << 1) | u64::from((value >> bit) & 1);
            self.bits += 1;
            if self.bits == 8 {
                self.bytes.push(self.acc as u8);
                self.acc = 0;
                self.bits = 0;
            }
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.bytes.push((self.acc << (8 - self.bits)) as u8);
        }
        self.bytes
    }
}

/// One hunk as it should appear in the built container.
#[derive(Debug, Clone)]
pub enum HunkSpec {
    /// Stored uncompressed.
    Stored(Vec<u8>),
    /// Compressed with the codec in `slot`; `data` is the decoded hunk,
    /// used for the map checksum.
    Compressed {
        slot: u8,
        payload: Vec<u8>,
        data: Vec<u8>,
    },
    /// Same contents as an earlier hunk.
    SelfRef(u32),
    /// Eight-byte repeated pattern (v3/v4 only).
    Mini(u64),
    /// Lives in a parent container.
    Parent(u64),
    /// Not stored (v5 uncompressed maps only); reads as zeros.
    Zero,
}

impl HunkSpec {
    /// Decoded bytes of this hunk, if known without resolving references.
    fn data(&self, hunk_bytes: usize) -> Option<Vec<u8>> {
        match self {
            Self::Stored(data) | Self::Compressed { data, .. } => Some(data.clone()),
            Self::Mini(value) => Some(
                value
                    .to_be_bytes()
                    .iter()
                    .copied()
                    .cycle()
                    .take(hunk_bytes)
                    .collect(),
            ),
            Self::Zero => Some(vec![0; hunk_bytes]),
            Self::SelfRef(_) | Self::Parent(_) => None,
        }
    }
}

/// Assembles a container image in memory.
#[derive(Debug, Clone)]
pub struct ChdBuilder {
    version: u32,
    hunk_bytes: u32,
    unit_bytes: u32,
    logical_bytes: Option<u64>,
    compressors: [u32; 4],
    hunks: Vec<HunkSpec>,
    metadata: Vec<(u32, Vec<u8>)>,
}

impl ChdBuilder {
    pub fn new(version: u32, hunk_bytes: u32, unit_bytes: u32) -> Self {
        Self {
            version,
            hunk_bytes,
            unit_bytes,
            logical_bytes: None,
            compressors: [0; 4],
            hunks: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// v5 container; the map is compressed once a compressor is set.
    pub fn v5(hunk_bytes: u32, unit_bytes: u32) -> Self {
        Self::new(5, hunk_bytes, unit_bytes)
    }

    pub fn compressor(mut self, slot: usize, tag: CodecTag) -> Self {
        self.compressors[slot] = tag.as_u32();
        self
    }

    pub fn logical_bytes(mut self, bytes: u64) -> Self {
        self.logical_bytes = Some(bytes);
        self
    }

    pub fn hunk(mut self, hunk: HunkSpec) -> Self {
        self.hunks.push(hunk);
        self
    }

    pub fn stored(self, data: Vec<u8>) -> Self {
        self.hunk(HunkSpec::Stored(data))
    }

    pub fn metadata(mut self, tag: u32, data: Vec<u8>) -> Self {
        self.metadata.push((tag, data));
        self
    }

    /// Append a `CHT2` track record.
    pub fn track(self, number: u32, track_type: &str, frames: u32, pregap: u32, pgtype: &str) -> Self {
        let record = format!(
            "TRACK:{} TYPE:{} SUBTYPE:NONE FRAMES:{} PREGAP:{} PGTYPE:{} PGSUB:NONE POSTGAP:0\0",
            number, track_type, frames, pregap, pgtype
        );
        self.metadata(CDROM_TRACK_METADATA2_TAG, record.into_bytes())
    }

    /// Concatenated decoded hunks, resolving self references.
    pub fn logical_data(&self) -> Vec<u8> {
        let hunk_bytes = self.hunk_bytes as usize;
        let mut decoded: Vec<Vec<u8>> = Vec::with_capacity(self.hunks.len());
        for hunk in &self.hunks {
            let mut data = match hunk {
                HunkSpec::SelfRef(index) => decoded.get(*index as usize).cloned().unwrap_or_default(),
                other => other.data(hunk_bytes).unwrap_or_default(),
            };
            data.resize(hunk_bytes, 0);
            decoded.push(data);
        }
        decoded.concat()
    }

    pub fn build(&self) -> Vec<u8> {
        match self.version {
            3 | 4 => self.build_v34(),
            _ => self.build_v5(),
        }
    }

    fn logical_len(&self) -> u64 {
        self.logical_bytes
            .unwrap_or(self.hunks.len() as u64 * u64::from(self.hunk_bytes))
    }

    fn raw_sha1(&self) -> [u8; 20] {
        let mut data = self.logical_data();
        data.truncate(self.logical_len() as usize);
        let mut out = [0u8; 20];
        out.copy_from_slice(Sha1::digest(&data).as_slice());
        out
    }

    // -----------------------------------------------------------------------
    // v5
    // -----------------------------------------------------------------------

    fn build_v5(&self) -> Vec<u8> {
        let mut out = vec![0u8; V5_HEADER_SIZE as usize];
        let map_offset = out.len() as u64;

        let hunk_bytes = self.hunk_bytes as usize;
        let compressed = self.compressors[0] != 0;

        let map_len = if compressed {
            // Placeholder; filled in once data offsets are known.
            0
        } else {
            self.hunks.len() * 4
        };
        out.resize(out.len() + map_len, 0);

        let meta_offset = self.append_metadata(&mut out);

        if compressed {
            // Map goes at the end so its size does not move the data.
            let first_offset = out.len() as u64;
            let mut cursor = first_offset;
            let mut data_section = Vec::new();
            for hunk in &self.hunks {
                match hunk {
                    HunkSpec::Compressed { payload, .. } => {
                        data_section.extend_from_slice(payload);
                        cursor += payload.len() as u64;
                    }
                    HunkSpec::SelfRef(_) | HunkSpec::Parent(_) => {}
                    stored => {
                        let mut data = stored.data(hunk_bytes).unwrap_or_default();
                        data.resize(hunk_bytes, 0);
                        data_section.extend_from_slice(&data);
                        cursor += hunk_bytes as u64;
                    }
                }
            }
            out.extend_from_slice(&data_section);
            let map_at = cursor;
            let map = self.encode_v5_map(first_offset);
            out.extend_from_slice(&map);
            self.write_v5_header(&mut out, map_at, meta_offset);
        } else {
            // Uncompressed maps address data in whole hunks.
            let mut block = (out.len() as u64).div_ceil(hunk_bytes as u64).max(1);
            for (index, hunk) in self.hunks.iter().enumerate() {
                let entry_at = map_offset as usize + index * 4;
                if let HunkSpec::Stored(data) = hunk {
                    let at = (block * hunk_bytes as u64) as usize;
                    out.resize(at + hunk_bytes, 0);
                    out[at..at + data.len().min(hunk_bytes)]
                        .copy_from_slice(&data[..data.len().min(hunk_bytes)]);
                    out[entry_at..entry_at + 4].copy_from_slice(&(block as u32).to_be_bytes());
                    block += 1;
                }
            }
            self.write_v5_header(&mut out, map_offset, meta_offset);
        }
        out
    }

    fn write_v5_header(&self, out: &mut [u8], map_offset: u64, meta_offset: u64) {
        out[0..8].copy_from_slice(CHD_MAGIC);
        out[8..12].copy_from_slice(&V5_HEADER_SIZE.to_be_bytes());
        out[12..16].copy_from_slice(&5u32.to_be_bytes());
        for (slot, tag) in self.compressors.iter().enumerate() {
            out[16 + slot * 4..20 + slot * 4].copy_from_slice(&tag.to_be_bytes());
        }
        out[32..40].copy_from_slice(&self.logical_len().to_be_bytes());
        out[40..48].copy_from_slice(&map_offset.to_be_bytes());
        out[48..56].copy_from_slice(&meta_offset.to_be_bytes());
        out[56..60].copy_from_slice(&self.hunk_bytes.to_be_bytes());
        out[60..64].copy_from_slice(&self.unit_bytes.to_be_bytes());
        out[64..84].copy_from_slice(&self.raw_sha1());
    }

    /// Huffman-coded v5 map using 4-bit codes for every symbol.
    fn encode_v5_map(&self, first_offset: u64) -> Vec<u8> {
        let hunk_bytes = self.hunk_bytes as usize;
        let types: Vec<u8> = self
            .hunks
            .iter()
            .map(|hunk| match hunk {
                HunkSpec::Stored(_) | HunkSpec::Mini(_) | HunkSpec::Zero => V5_NONE,
                HunkSpec::Compressed { slot, .. } => *slot,
                HunkSpec::SelfRef(_) => V5_SELF,
                HunkSpec::Parent(_) => V5_PARENT,
            })
            .collect();

        let max_length = self
            .hunks
            .iter()
            .filter_map(|h| match h {
                HunkSpec::Compressed { payload, .. } => Some(payload.len() as u32),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let max_self = self
            .hunks
            .iter()
            .filter_map(|h| match h {
                HunkSpec::SelfRef(index) => Some(*index),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let max_parent = self
            .hunks
            .iter()
            .filter_map(|h| match h {
                HunkSpec::Parent(unit) => Some(*unit as u32),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let length_bits = bit_width(max_length);
        let self_bits = bit_width(max_self);
        let parent_bits = bit_width(max_parent);

        let mut bits = BitWriter::new();
        // Tree: 16 literal code lengths of 4 bits each.
        for _ in 0..16 {
            bits.write(4, 4);
        }

        // Entry types with run-length compression of repeats.
        let mut i = 0;
        while i < types.len() {
            let kind = types[i];
            bits.write(u32::from(kind), 4);
            let mut run = types[i + 1..].iter().take_while(|&&t| t == kind).count();
            i += 1 + run;
            while run >= 3 {
                if run < 19 {
                    bits.write(u32::from(V5_RLE_SMALL), 4);
                    bits.write((run - 3) as u32, 4);
                    run = 0;
                } else {
                    let extra = (run - 19).min(255);
                    bits.write(u32::from(V5_RLE_LARGE), 4);
                    bits.write((extra >> 4) as u32, 4);
                    bits.write((extra & 0x0F) as u32, 4);
                    run -= 19 + extra;
                }
            }
            for _ in 0..run {
                bits.write(u32::from(kind), 4);
            }
        }

        // Per-entry fields and the expanded form the map CRC covers.
        let mut expanded = Vec::new();
        let mut cursor = first_offset;
        for (hunk, &kind) in self.hunks.iter().zip(&types) {
            let (length, offset, crc) = match hunk {
                HunkSpec::Compressed { payload, data, .. } => {
                    let crc = CRC16.checksum(data);
                    bits.write(payload.len() as u32, length_bits);
                    bits.write(u32::from(crc), 16);
                    let at = cursor;
                    cursor += payload.len() as u64;
                    (payload.len() as u32, at, crc)
                }
                HunkSpec::SelfRef(index) => {
                    bits.write(*index, self_bits);
                    (0, u64::from(*index), 0)
                }
                HunkSpec::Parent(unit) => {
                    bits.write(*unit as u32, parent_bits);
                    (0, *unit, 0)
                }
                other => {
                    let mut data = other.data(hunk_bytes).unwrap_or_default();
                    data.resize(hunk_bytes, 0);
                    let crc = CRC16.checksum(&data);
                    bits.write(u32::from(crc), 16);
                    let at = cursor;
                    cursor += hunk_bytes as u64;
                    (self.hunk_bytes, at, crc)
                }
            };
            expanded.push(kind);
            expanded.extend_from_slice(&length.to_be_bytes()[1..]);
            expanded.extend_from_slice(&offset.to_be_bytes()[2..]);
            expanded.extend_from_slice(&crc.to_be_bytes());
        }

        let compressed = bits.finish();
        let mut map = Vec::with_capacity(16 + compressed.len());
        map.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        map.extend_from_slice(&first_offset.to_be_bytes()[2..]);
        map.extend_from_slice(&CRC16.checksum(&expanded).to_be_bytes());
        map.push(length_bits as u8);
        map.push(self_bits as u8);
        map.push(parent_bits as u8);
        map.push(0);
        map.extend_from_slice(&compressed);
        map
    }

    // -----------------------------------------------------------------------
    // v3 / v4
    // -----------------------------------------------------------------------

    fn build_v34(&self) -> Vec<u8> {
        let header_size = if self.version == 3 {
            V3_HEADER_SIZE
        } else {
            V4_HEADER_SIZE
        };
        let mut out = vec![0u8; header_size as usize];
        let map_at = out.len();
        out.resize(map_at + self.hunks.len() * 16, 0);
        let meta_offset = self.append_metadata(&mut out);

        for (index, hunk) in self.hunks.iter().enumerate() {
            let (offset, crc, length, kind) = match hunk {
                HunkSpec::Stored(data) => {
                    let at = out.len() as u64;
                    out.extend_from_slice(data);
                    (at, crc32fast::hash(data), data.len() as u32, 2u8)
                }
                HunkSpec::Compressed { payload, data, .. } => {
                    let at = out.len() as u64;
                    out.extend_from_slice(payload);
                    (at, crc32fast::hash(data), payload.len() as u32, 1)
                }
                HunkSpec::Mini(value) => (*value, 0, 0, 3),
                HunkSpec::SelfRef(target) => (u64::from(*target), 0, 0, 4),
                HunkSpec::Parent(target) => (*target, 0, 0, 5),
                HunkSpec::Zero => (0, 0, 0, 3),
            };
            let e = map_at + index * 16;
            out[e..e + 8].copy_from_slice(&offset.to_be_bytes());
            out[e + 8..e + 12].copy_from_slice(&crc.to_be_bytes());
            out[e + 12..e + 14].copy_from_slice(&(length as u16).to_be_bytes());
            out[e + 14] = (length >> 16) as u8;
            out[e + 15] = kind;
        }

        let compression: u32 = if self
            .hunks
            .iter()
            .any(|h| matches!(h, HunkSpec::Compressed { .. }))
        {
            1
        } else {
            0
        };

        out[0..8].copy_from_slice(CHD_MAGIC);
        out[8..12].copy_from_slice(&header_size.to_be_bytes());
        out[12..16].copy_from_slice(&self.version.to_be_bytes());
        out[20..24].copy_from_slice(&compression.to_be_bytes());
        out[24..28].copy_from_slice(&(self.hunks.len() as u32).to_be_bytes());
        out[28..36].copy_from_slice(&self.logical_len().to_be_bytes());
        out[36..44].copy_from_slice(&meta_offset.to_be_bytes());
        let raw_sha1 = self.raw_sha1();
        if self.version == 3 {
            out[76..80].copy_from_slice(&self.hunk_bytes.to_be_bytes());
            out[80..100].copy_from_slice(&raw_sha1);
        } else {
            out[44..48].copy_from_slice(&self.hunk_bytes.to_be_bytes());
            out[88..108].copy_from_slice(&raw_sha1);
        }
        out
    }

    /// Append the metadata chain, returning the offset of its first entry.
    fn append_metadata(&self, out: &mut Vec<u8>) -> u64 {
        if self.metadata.is_empty() {
            return 0;
        }
        let first = out.len() as u64;
        for (i, (tag, data)) in self.metadata.iter().enumerate() {
            let at = out.len() as u64;
            let next = if i + 1 == self.metadata.len() {
                0
            } else {
                at + 16 + data.len() as u64
            };
            out.extend_from_slice(&tag.to_be_bytes());
            out.push(0x01);
            out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
            out.extend_from_slice(&next.to_be_bytes());
            out.extend_from_slice(data);
        }
        first
    }
}

fn bit_width(value: u32) -> u32 {
    32 - value.leading_zeros()
}

// ---------------------------------------------------------------------------
// Payload encoders
// ---------------------------------------------------------------------------

/// Raw deflate, as stored by the `zlib` codec.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Split a CD hunk into sector and subchannel streams.
fn split_frames(hunk: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut sectors = Vec::new();
    let mut subcode = Vec::new();
    for frame in hunk.chunks_exact(FRAME_SIZE as usize) {
        sectors.extend_from_slice(&frame[..RAW_SECTOR_SIZE as usize]);
        subcode.extend_from_slice(&frame[RAW_SECTOR_SIZE as usize..]);
    }
    debug_assert_eq!(subcode.len() % SUBCODE_SIZE as usize, 0);
    (sectors, subcode)
}

/// Frame header plus streams, with no ECC bits set.
fn cd_payload(hunk: &[u8], base: Vec<u8>, sub: Vec<u8>) -> Vec<u8> {
    let frames = hunk.len() / FRAME_SIZE as usize;
    let mut payload = vec![0u8; frames.div_ceil(8)];
    if hunk.len() < 65536 {
        payload.extend_from_slice(&(base.len() as u16).to_be_bytes());
    } else {
        payload.extend_from_slice(&(base.len() as u32).to_be_bytes()[1..]);
    }
    payload.extend_from_slice(&base);
    payload.extend_from_slice(&sub);
    payload
}

/// `cdzl` payload for a hunk of whole CD frames.
pub fn cd_zlib(hunk: &[u8]) -> io::Result<Vec<u8>> {
    let (sectors, subcode) = split_frames(hunk);
    Ok(cd_payload(hunk, deflate(&sectors)?, deflate(&subcode)?))
}

/// `cdzs` payload for a hunk of whole CD frames.
pub fn cd_zstd(hunk: &[u8]) -> io::Result<Vec<u8>> {
    let (sectors, subcode) = split_frames(hunk);
    Ok(cd_payload(
        hunk,
        zstd::bulk::compress(&sectors, 3)?,
        zstd::bulk::compress(&subcode, 3)?,
    ))
}

/// Headerless LZMA (lc=3, lp=0, pb=2), as stored by the `lzma` codec.
pub fn lzma(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut options = LzmaOptions::with_preset(6);
    options.dict_size = LzmaCodec::dictionary_size(data.len() as u32);
    let mut writer = LzmaWriter::new_no_header(Vec::new(), &options, false)?;
    writer.write_all(data)?;
    writer.finish()
}

/// `cdlz` payload for a hunk of whole CD frames.
pub fn cd_lzma(hunk: &[u8]) -> io::Result<Vec<u8>> {
    let (sectors, subcode) = split_frames(hunk);
    Ok(cd_payload(hunk, lzma(&sectors)?, deflate(&subcode)?))
}

const FLAC_CRC8: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);
const FLAC_CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_UMTS);

/// Bare FLAC frames of 16-bit stereo samples, one verbatim subframe per
/// channel. At most 127 frames.
pub fn flac_frames(samples: &[[i16; 2]], block_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for (number, block) in samples.chunks(block_size).enumerate() {
        debug_assert!(number < 128);
        let start = out.len();
        // Fixed blocking; block size in 16 bits after the frame number;
        // 44.1 kHz; two independent 16-bit channels.
        out.extend_from_slice(&[0xFF, 0xF8, 0x79, 0x18, number as u8]);
        out.extend_from_slice(&((block.len() - 1) as u16).to_be_bytes());
        out.push(FLAC_CRC8.checksum(&out[start..]));
        for channel in 0..2 {
            out.push(0x02);
            for sample in block {
                out.extend_from_slice(&sample[channel].to_be_bytes());
            }
        }
        let crc = FLAC_CRC16.checksum(&out[start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }
    out
}

/// `cdfl` payload: one FLAC frame per sector, then the deflated subchannel.
pub fn cd_flac(hunk: &[u8]) -> io::Result<Vec<u8>> {
    let (sectors, subcode) = split_frames(hunk);
    let samples: Vec<[i16; 2]> = sectors
        .chunks_exact(4)
        .map(|s| [i16::from_be_bytes([s[0], s[1]]), i16::from_be_bytes([s[2], s[3]])])
        .collect();
    let mut payload = flac_frames(&samples, RAW_SECTOR_SIZE as usize / 4);
    payload.extend_from_slice(&deflate(&subcode)?);
    Ok(payload)
}

/// ASCII track record text, NUL-terminated like the image tools write it.
pub fn track_record(number: u32, track_type: &str, frames: u32) -> Vec<u8> {
    format!(
        "TRACK:{} TYPE:{} SUBTYPE:NONE FRAMES:{}\0",
        number, track_type, frames
    )
    .into_bytes()
}
