//! Hunk map decoding and hunk retrieval.
//!
//! The map is decoded once when the container is opened. Each entry says
//! where a hunk lives and how to turn it back into `hunk_bytes` bytes.
//! Decoded hunks are kept in a small shared LRU cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use positioned_io::ReadAt;

use gameid_core::util::be_uint;

use crate::bitstream::BitReader;
use crate::codec::{CodecTag, create_codec};
use crate::error::{ChdError, Result};
use crate::header::{Header, HeaderVersion};
use crate::huffman::HuffmanDecoder;
use crate::options::ChdOptions;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on the compressed v5 map.
pub const MAX_COMPRESSED_MAP_BYTES: u32 = 100 * 1024 * 1024;

/// CRC-16/CCITT (init 0xFFFF) used by v5 maps and hunks.
pub(crate) const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

const V5_MAP_HEADER_SIZE: usize = 16;
const V5_RAW_ENTRY_SIZE: usize = 12;
const V34_ENTRY_SIZE: usize = 16;

// v5 compressed map entry types.
const V5_CODEC_LAST: u8 = 3;
const V5_NONE: u8 = 4;
const V5_SELF: u8 = 5;
const V5_PARENT: u8 = 6;
const V5_RLE_SMALL: u8 = 7;
const V5_RLE_LARGE: u8 = 8;
const V5_SELF_0: u8 = 9;
const V5_SELF_1: u8 = 10;
const V5_PARENT_SELF: u8 = 11;
const V5_PARENT_0: u8 = 12;
const V5_PARENT_1: u8 = 13;

// v3/v4 map entry types (low nibble of flags).
const V34_COMPRESSED: u8 = 1;
const V34_UNCOMPRESSED: u8 = 2;
const V34_MINI: u8 = 3;
const V34_SELF: u8 = 4;
const V34_PARENT: u8 = 5;
const V34_FLAG_NO_CRC: u8 = 0x10;

// ---------------------------------------------------------------------------
// Map entries
// ---------------------------------------------------------------------------

/// How a hunk is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
    /// Compressed with the codec in the given header slot.
    Compressed { slot: u8 },
    /// Stored verbatim at `offset`.
    Uncompressed,
    /// Eight-byte pattern (the `offset` field) repeated across the hunk.
    Mini,
    /// Identical to the earlier hunk whose index is `offset`. Chains are
    /// collapsed when the map is built, so the target is never itself a
    /// self reference.
    SelfRef,
    /// Stored in a parent container.
    ParentRef,
    /// Not stored at all; reads as zeros.
    Zero,
}

/// Checksum recorded for a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkCrc {
    Crc16(u16),
    Crc32(u32),
}

/// One decoded hunk map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkEntry {
    pub kind: HunkKind,
    pub offset: u64,
    pub length: u32,
    pub crc: Option<HunkCrc>,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Decoded hunk map plus the means to materialize hunks from it.
pub struct HunkDirectory<R> {
    source: R,
    entries: Vec<HunkEntry>,
    compressors: [CodecTag; 4],
    hunk_bytes: u32,
    units_per_hunk: u32,
    verify_crc: bool,
    cache: Option<Mutex<LruCache<u32, Arc<[u8]>>>>,
}

impl<R: ReadAt> HunkDirectory<R> {
    /// Decode the hunk map described by `header`.
    pub fn build(source: R, header: &Header, options: &ChdOptions) -> Result<Self> {
        let mut entries = match header.version {
            HeaderVersion::V5 if header.is_compressed() => decode_v5_compressed_map(&source, header)?,
            HeaderVersion::V5 => decode_v5_uncompressed_map(&source, header)?,
            HeaderVersion::V3 | HeaderVersion::V4 => decode_v34_map(&source, header)?,
        };
        resolve_self_refs(&mut entries)?;
        log::debug!(
            "Decoded {} hunk map entries at offset {}",
            entries.len(),
            header.map_offset
        );

        Ok(Self {
            source,
            entries,
            compressors: header.compressors.map(CodecTag::new),
            hunk_bytes: header.hunk_bytes,
            units_per_hunk: header.sectors_per_hunk(),
            verify_crc: options.verify_hunk_crc,
            cache: NonZeroUsize::new(options.hunk_cache_size)
                .map(|size| Mutex::new(LruCache::new(size))),
        })
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn entries(&self) -> &[HunkEntry] {
        &self.entries
    }

    pub fn num_hunks(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn hunk_bytes(&self) -> u32 {
        self.hunk_bytes
    }

    /// Return the decompressed contents of hunk `index`.
    ///
    /// The buffer is normally `hunk_bytes` long; a codec that produced fewer
    /// bytes yields a shorter buffer.
    pub fn read_hunk(&self, index: u64) -> Result<Arc<[u8]>> {
        if index >= self.entries.len() as u64 {
            return Err(ChdError::HunkOutOfRange {
                index,
                count: self.num_hunks(),
            });
        }
        let index = index as u32;

        if let Some(cache) = &self.cache
            && let Some(hit) = cache.lock().get(&index)
        {
            return Ok(Arc::clone(hit));
        }

        let data = self.decode_hunk(index)?;
        if let Some(cache) = &self.cache {
            cache.lock().put(index, Arc::clone(&data));
        }
        Ok(data)
    }

    fn decode_hunk(&self, index: u32) -> Result<Arc<[u8]>> {
        let entry = self.entries[index as usize];
        let hunk_bytes = self.hunk_bytes as usize;

        let data = match entry.kind {
            HunkKind::Compressed { slot } => {
                let tag = self.compressors[slot as usize];
                let mut src = vec![0u8; entry.length as usize];
                self.source.read_exact_at(entry.offset, &mut src)?;
                if tag.is_none() {
                    // An empty slot stores the payload as is.
                    src.resize(hunk_bytes, 0);
                    self.check_crc(index, entry.crc, &src)?;
                    return Ok(Arc::from(src));
                }

                let mut codec = create_codec(tag)?;
                let mut buf = vec![0u8; hunk_bytes];
                let written = match codec.as_cd() {
                    Some(cd) => {
                        cd.decompress_cd(&src, &mut buf, self.hunk_bytes, self.units_per_hunk)?
                    }
                    None => codec.decompress(&src, &mut buf)?,
                };
                self.check_crc(index, entry.crc, &buf)?;
                buf.truncate(written.min(hunk_bytes));
                buf
            }
            HunkKind::Uncompressed => {
                let mut buf = vec![0u8; hunk_bytes];
                self.source.read_exact_at(entry.offset, &mut buf)?;
                self.check_crc(index, entry.crc, &buf)?;
                buf
            }
            HunkKind::Mini => {
                let pattern = entry.offset.to_be_bytes();
                pattern.iter().copied().cycle().take(hunk_bytes).collect()
            }
            HunkKind::SelfRef => return self.read_hunk(entry.offset),
            HunkKind::ParentRef => return Err(ChdError::ParentRequired { index }),
            HunkKind::Zero => vec![0u8; hunk_bytes],
        };
        Ok(Arc::from(data))
    }

    fn check_crc(&self, index: u32, crc: Option<HunkCrc>, data: &[u8]) -> Result<()> {
        if !self.verify_crc {
            return Ok(());
        }
        let (expected, actual) = match crc {
            Some(HunkCrc::Crc16(expected)) => (u32::from(expected), u32::from(CRC16.checksum(data))),
            Some(HunkCrc::Crc32(expected)) => (expected, crc32fast::hash(data)),
            None => return Ok(()),
        };
        if expected != actual {
            return Err(ChdError::CorruptHunk {
                index,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Map decoding
// ---------------------------------------------------------------------------

/// Point every self reference straight at the hunk holding the data.
///
/// References must point backwards. Entries are visited in order, so an
/// earlier reference is already resolved when a later one lands on it.
fn resolve_self_refs(entries: &mut [HunkEntry]) -> Result<()> {
    for index in 0..entries.len() {
        let entry = entries[index];
        if entry.kind != HunkKind::SelfRef {
            continue;
        }
        if entry.offset >= index as u64 {
            return Err(ChdError::invalid_map(format!(
                "hunk {} refers to hunk {} which is not earlier",
                index, entry.offset
            )));
        }
        let target = entries[entry.offset as usize];
        if target.kind == HunkKind::SelfRef {
            entries[index].offset = target.offset;
        }
    }
    Ok(())
}

/// v5 map without compression: one big-endian u32 per hunk giving the file
/// offset in units of `hunk_bytes`.
fn decode_v5_uncompressed_map<R: ReadAt>(source: &R, header: &Header) -> Result<Vec<HunkEntry>> {
    let mut raw = vec![0u8; header.hunk_count as usize * 4];
    source.read_exact_at(header.map_offset, &mut raw)?;

    Ok(raw
        .chunks_exact(4)
        .map(|chunk| {
            let block = be_uint(chunk);
            HunkEntry {
                kind: if block == 0 {
                    HunkKind::Zero
                } else {
                    HunkKind::Uncompressed
                },
                offset: block * u64::from(header.hunk_bytes),
                length: header.hunk_bytes,
                crc: None,
            }
        })
        .collect())
}

/// v5 compressed map: Huffman-coded entry types followed by bit-packed
/// lengths, offsets and CRCs.
fn decode_v5_compressed_map<R: ReadAt>(source: &R, header: &Header) -> Result<Vec<HunkEntry>> {
    let mut map_header = [0u8; V5_MAP_HEADER_SIZE];
    source.read_exact_at(header.map_offset, &mut map_header)?;

    let compressed_len = be_uint(&map_header[0..4]) as u32;
    let first_offset = be_uint(&map_header[4..10]);
    let map_crc = be_uint(&map_header[10..12]) as u16;
    let length_bits = u32::from(map_header[12]);
    let self_bits = u32::from(map_header[13]);
    let parent_bits = u32::from(map_header[14]);

    if compressed_len > MAX_COMPRESSED_MAP_BYTES {
        return Err(ChdError::invalid_map(format!(
            "compressed map of {} bytes exceeds the limit of {}",
            compressed_len, MAX_COMPRESSED_MAP_BYTES
        )));
    }
    if length_bits > 32 || self_bits > 32 || parent_bits > 32 {
        return Err(ChdError::invalid_map("map field width exceeds 32 bits"));
    }

    let mut compressed = vec![0u8; compressed_len as usize];
    source.read_exact_at(
        header.map_offset + V5_MAP_HEADER_SIZE as u64,
        &mut compressed,
    )?;

    let mut bits = BitReader::new(&compressed);
    let mut decoder = HuffmanDecoder::new(16, 8);
    decoder.import_tree_rle(&mut bits)?;

    let count = header.hunk_count as usize;

    // Pass 1: entry types, with run-length repeats of the previous type.
    let mut types = Vec::with_capacity(count);
    let mut last = 0u8;
    let mut repeat = 0u32;
    for _ in 0..count {
        if repeat > 0 {
            types.push(last);
            repeat -= 1;
            continue;
        }
        let value = decoder.decode_one(&mut bits) as u8;
        match value {
            V5_RLE_SMALL => {
                types.push(last);
                repeat = 2 + decoder.decode_one(&mut bits);
            }
            V5_RLE_LARGE => {
                types.push(last);
                repeat = 2 + 16 + (decoder.decode_one(&mut bits) << 4);
                repeat += decoder.decode_one(&mut bits);
            }
            other => {
                types.push(other);
                last = other;
            }
        }
    }

    // Pass 2: per-entry fields. The expanded 12-byte form is what the map
    // CRC covers.
    let hunk_bytes = u64::from(header.hunk_bytes);
    let units_per_hunk = hunk_bytes / u64::from(header.unit_bytes);
    let mut entries = Vec::with_capacity(count);
    let mut expanded = Vec::with_capacity(count * V5_RAW_ENTRY_SIZE);
    let mut cursor = first_offset;
    let mut last_self = 0u64;
    let mut last_parent = 0u64;

    for (index, &kind) in types.iter().enumerate() {
        let mut stored_type = kind;
        let mut length = 0u32;
        let mut crc = 0u16;
        let offset;
        let entry_kind;

        match kind {
            0..=V5_CODEC_LAST => {
                length = bits.read(length_bits);
                crc = bits.read(16) as u16;
                offset = cursor;
                cursor += u64::from(length);
                entry_kind = HunkKind::Compressed { slot: kind };
            }
            V5_NONE => {
                length = header.hunk_bytes;
                crc = bits.read(16) as u16;
                offset = cursor;
                cursor += hunk_bytes;
                entry_kind = HunkKind::Uncompressed;
            }
            V5_SELF => {
                last_self = u64::from(bits.read(self_bits));
                offset = last_self;
                entry_kind = HunkKind::SelfRef;
            }
            V5_PARENT => {
                last_parent = u64::from(bits.read(parent_bits));
                offset = last_parent;
                entry_kind = HunkKind::ParentRef;
            }
            V5_SELF_0 | V5_SELF_1 => {
                if kind == V5_SELF_1 {
                    last_self += 1;
                }
                stored_type = V5_SELF;
                offset = last_self;
                entry_kind = HunkKind::SelfRef;
            }
            V5_PARENT_SELF => {
                stored_type = V5_PARENT;
                last_parent = index as u64 * units_per_hunk;
                offset = last_parent;
                entry_kind = HunkKind::ParentRef;
            }
            V5_PARENT_0 | V5_PARENT_1 => {
                if kind == V5_PARENT_1 {
                    last_parent += units_per_hunk;
                }
                stored_type = V5_PARENT;
                offset = last_parent;
                entry_kind = HunkKind::ParentRef;
            }
            other => {
                return Err(ChdError::invalid_map(format!(
                    "hunk {} has unknown map entry type {}",
                    index, other
                )));
            }
        }

        expanded.push(stored_type);
        expanded.extend_from_slice(&length.to_be_bytes()[1..]);
        expanded.extend_from_slice(&offset.to_be_bytes()[2..]);
        expanded.extend_from_slice(&crc.to_be_bytes());

        let crc = match entry_kind {
            HunkKind::Compressed { .. } | HunkKind::Uncompressed => Some(HunkCrc::Crc16(crc)),
            _ => None,
        };
        entries.push(HunkEntry {
            kind: entry_kind,
            offset,
            length,
            crc,
        });
    }

    if bits.overflowed() {
        return Err(ChdError::invalid_map("compressed map truncated"));
    }
    let actual = CRC16.checksum(&expanded);
    if actual != map_crc {
        return Err(ChdError::invalid_map(format!(
            "map checksum mismatch: expected {:#06x}, got {:#06x}",
            map_crc, actual
        )));
    }
    Ok(entries)
}

/// v3/v4 map: 16 bytes per hunk.
fn decode_v34_map<R: ReadAt>(source: &R, header: &Header) -> Result<Vec<HunkEntry>> {
    let mut raw = vec![0u8; header.hunk_count as usize * V34_ENTRY_SIZE];
    source.read_exact_at(header.map_offset, &mut raw)?;

    raw.chunks_exact(V34_ENTRY_SIZE)
        .enumerate()
        .map(|(index, e)| {
            let offset = be_uint(&e[0..8]);
            let crc32 = be_uint(&e[8..12]) as u32;
            let length = be_uint(&e[12..14]) as u32 | (u32::from(e[14]) << 16);
            let flags = e[15];
            let kind = match flags & 0x0F {
                V34_COMPRESSED => HunkKind::Compressed { slot: 0 },
                V34_UNCOMPRESSED => HunkKind::Uncompressed,
                V34_MINI => HunkKind::Mini,
                V34_SELF => HunkKind::SelfRef,
                V34_PARENT => HunkKind::ParentRef,
                other => {
                    return Err(ChdError::invalid_map(format!(
                        "hunk {} has unknown map entry type {}",
                        index, other
                    )));
                }
            };
            let crc = match kind {
                HunkKind::Compressed { .. } | HunkKind::Uncompressed
                    if flags & V34_FLAG_NO_CRC == 0 =>
                {
                    Some(HunkCrc::Crc32(crc32))
                }
                _ => None,
            };
            Ok(HunkEntry {
                kind,
                offset,
                length,
                crc,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/hunks_tests.rs"]
mod tests;
