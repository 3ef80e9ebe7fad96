//! Container header parsing.
//!
//! Three on-disk revisions exist. Each is parsed by its own function and
//! normalized into a single [`Header`], so nothing past this module needs to
//! know which revision it is looking at beyond what the header exposes.

use positioned_io::ReadAt;

use gameid_core::util::{be_uint, read_up_to};

use crate::codec::CodecTag;
use crate::error::{ChdError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Container magic bytes.
pub const CHD_MAGIC: &[u8; 8] = b"MComprHD";

pub const V3_HEADER_SIZE: u32 = 120;
pub const V4_HEADER_SIZE: u32 = 108;
pub const V5_HEADER_SIZE: u32 = 124;

/// Unit size assumed when the revision does not record one: one CD frame.
pub const DEFAULT_UNIT_BYTES: u32 = 2448;

/// Upper bound on hunk count; larger values are treated as corrupt.
pub const MAX_HUNKS: u64 = 10_000_000;

/// v3/v4 flag: the container depends on a parent.
const FLAG_HAS_PARENT: u32 = 0x0000_0001;

// Fixed prefix shared by all revisions: magic, length, version.
const PREFIX_SIZE: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// On-disk header revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeaderVersion {
    V3,
    V4,
    V5,
}

impl HeaderVersion {
    pub fn from_u32(version: u32) -> Option<Self> {
        match version {
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            5 => Some(Self::V5),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
            Self::V5 => 5,
        }
    }

    /// Minimum header length this revision requires.
    pub fn header_size(self) -> u32 {
        match self {
            Self::V3 => V3_HEADER_SIZE,
            Self::V4 => V4_HEADER_SIZE,
            Self::V5 => V5_HEADER_SIZE,
        }
    }
}

/// Normalized container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: HeaderVersion,
    /// Header length as declared on disk.
    pub length: u32,
    /// v3/v4 flags word (0 for v5).
    pub flags: u32,
    /// Codec tags for compressor slots 0..3. Legacy compression numbers are
    /// mapped to tags; unused slots are 0.
    pub compressors: [u32; 4],
    /// Size of the uncompressed virtual data.
    pub logical_bytes: u64,
    /// Offset of the hunk map.
    pub map_offset: u64,
    /// Offset of the first metadata entry (0 if none).
    pub meta_offset: u64,
    pub hunk_bytes: u32,
    pub unit_bytes: u32,
    /// Number of hunks in the map.
    pub hunk_count: u32,
    pub md5: Option<[u8; 16]>,
    pub parent_md5: Option<[u8; 16]>,
    pub sha1: [u8; 20],
    pub parent_sha1: [u8; 20],
    /// SHA-1 of the raw data only (v4/v5).
    pub raw_sha1_field: Option<[u8; 20]>,
}

impl Header {
    /// Read and parse the header at the start of `source`.
    pub fn read<R: ReadAt + ?Sized>(source: &R) -> Result<Self> {
        let mut buf = [0u8; V5_HEADER_SIZE as usize];
        let n = read_up_to(source, 0, &mut buf)?;
        Self::parse(&buf[..n])
    }

    /// Parse a header from the leading bytes of a container.
    ///
    /// `bytes` may be shorter than the declared header length, in which case
    /// the header is reported as truncated.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHD_MAGIC.len() || &bytes[..CHD_MAGIC.len()] != CHD_MAGIC {
            return Err(ChdError::InvalidMagic);
        }
        if bytes.len() < PREFIX_SIZE {
            return Err(ChdError::invalid_header(format!(
                "need {} bytes for the header prefix, got {}",
                PREFIX_SIZE,
                bytes.len()
            )));
        }

        let length = be_u32(bytes, 8);
        let raw_version = be_u32(bytes, 12);
        let version =
            HeaderVersion::from_u32(raw_version).ok_or(ChdError::UnsupportedVersion(raw_version))?;

        let required = version.header_size();
        if length < required {
            return Err(ChdError::header_too_small(
                raw_version,
                required as u64,
                length as u64,
            ));
        }
        if bytes.len() < required as usize {
            return Err(ChdError::header_too_small(
                raw_version,
                required as u64,
                bytes.len() as u64,
            ));
        }

        let header = match version {
            HeaderVersion::V3 => parse_v3(bytes, length),
            HeaderVersion::V4 => parse_v4(bytes, length),
            HeaderVersion::V5 => parse_v5(bytes, length),
        }?;

        log::debug!(
            "CHD v{}: {} logical bytes, {} hunks of {} bytes, unit {} bytes",
            header.version.as_u32(),
            header.logical_bytes,
            header.hunk_count,
            header.hunk_bytes,
            header.unit_bytes
        );
        Ok(header)
    }

    /// Number of hunks in the container.
    pub fn hunk_count(&self) -> u32 {
        self.hunk_count
    }

    /// Number of units (sectors, for CD images) in one hunk.
    pub fn sectors_per_hunk(&self) -> u32 {
        self.hunk_bytes / self.unit_bytes
    }

    pub fn is_compressed(&self) -> bool {
        self.compressors[0] != 0
    }

    pub fn has_parent(&self) -> bool {
        match self.version {
            HeaderVersion::V3 | HeaderVersion::V4 => self.flags & FLAG_HAS_PARENT != 0,
            HeaderVersion::V5 => self.parent_sha1.iter().any(|&b| b != 0),
        }
    }

    /// SHA-1 of the raw (non-metadata) data.
    ///
    /// v3 has a single SHA-1 field that covers only the raw data.
    pub fn raw_sha1(&self) -> [u8; 20] {
        self.raw_sha1_field.unwrap_or(self.sha1)
    }
}

// ---------------------------------------------------------------------------
// Per-revision parsing
// ---------------------------------------------------------------------------

fn parse_v3(b: &[u8], length: u32) -> Result<Header> {
    let flags = be_u32(b, 16);
    let compression = be_u32(b, 20);
    let total_hunks = be_u32(b, 24);
    let logical_bytes = be_u64(b, 28);
    let meta_offset = be_u64(b, 36);
    let hunk_bytes = be_u32(b, 76);

    validate(Header {
        version: HeaderVersion::V3,
        length,
        flags,
        compressors: [legacy_compressor(compression), 0, 0, 0],
        logical_bytes,
        map_offset: length as u64,
        meta_offset,
        hunk_bytes,
        unit_bytes: legacy_unit_bytes(hunk_bytes),
        hunk_count: total_hunks,
        md5: Some(array(b, 44)),
        parent_md5: Some(array(b, 60)),
        sha1: array(b, 80),
        parent_sha1: array(b, 100),
        raw_sha1_field: None,
    })
}

fn parse_v4(b: &[u8], length: u32) -> Result<Header> {
    let flags = be_u32(b, 16);
    let compression = be_u32(b, 20);
    let total_hunks = be_u32(b, 24);
    let logical_bytes = be_u64(b, 28);
    let meta_offset = be_u64(b, 36);
    let hunk_bytes = be_u32(b, 44);

    validate(Header {
        version: HeaderVersion::V4,
        length,
        flags,
        compressors: [legacy_compressor(compression), 0, 0, 0],
        logical_bytes,
        map_offset: length as u64,
        meta_offset,
        hunk_bytes,
        unit_bytes: legacy_unit_bytes(hunk_bytes),
        hunk_count: total_hunks,
        md5: None,
        parent_md5: None,
        sha1: array(b, 48),
        parent_sha1: array(b, 68),
        raw_sha1_field: Some(array(b, 88)),
    })
}

fn parse_v5(b: &[u8], length: u32) -> Result<Header> {
    let compressors = [
        be_u32(b, 16),
        be_u32(b, 20),
        be_u32(b, 24),
        be_u32(b, 28),
    ];
    let logical_bytes = be_u64(b, 32);
    let map_offset = be_u64(b, 40);
    let meta_offset = be_u64(b, 48);
    let hunk_bytes = be_u32(b, 56);
    let mut unit_bytes = be_u32(b, 60);
    if unit_bytes == 0 {
        log::debug!("v5 header has no unit size, assuming {DEFAULT_UNIT_BYTES}");
        unit_bytes = DEFAULT_UNIT_BYTES;
    }

    validate(Header {
        version: HeaderVersion::V5,
        length,
        flags: 0,
        compressors,
        logical_bytes,
        map_offset,
        meta_offset,
        hunk_bytes,
        unit_bytes,
        hunk_count: 0,
        md5: None,
        parent_md5: None,
        sha1: array(b, 84),
        parent_sha1: array(b, 104),
        raw_sha1_field: Some(array(b, 64)),
    })
}

/// Fill in the hunk count and reject headers the rest of the decoder cannot use.
fn validate(mut header: Header) -> Result<Header> {
    if header.hunk_bytes == 0 {
        return Err(ChdError::invalid_header("hunk size is zero"));
    }
    if header.hunk_bytes < header.unit_bytes {
        return Err(ChdError::invalid_header(format!(
            "hunk size {} is smaller than unit size {}",
            header.hunk_bytes, header.unit_bytes
        )));
    }

    let computed = header.logical_bytes.div_ceil(header.hunk_bytes as u64);
    let count = if header.hunk_count > 0 {
        header.hunk_count as u64
    } else {
        computed
    };
    if count > MAX_HUNKS {
        return Err(ChdError::invalid_header(format!(
            "{} hunks exceeds the limit of {}",
            count, MAX_HUNKS
        )));
    }
    header.hunk_count = count as u32;
    Ok(header)
}

/// Map a v3/v4 compression number to a codec tag.
fn legacy_compressor(compression: u32) -> u32 {
    match compression {
        0 => 0,
        1 | 2 => CodecTag::ZLIB.as_u32(),
        3 => CodecTag::AVHUFF.as_u32(),
        other => other,
    }
}

/// v3/v4 do not record a unit size; use a CD frame unless hunks are smaller.
fn legacy_unit_bytes(hunk_bytes: u32) -> u32 {
    if hunk_bytes > 0 && hunk_bytes < DEFAULT_UNIT_BYTES {
        hunk_bytes
    } else {
        DEFAULT_UNIT_BYTES
    }
}

// ---------------------------------------------------------------------------
// Byte helpers
// ---------------------------------------------------------------------------

fn be_u32(b: &[u8], at: usize) -> u32 {
    be_uint(&b[at..at + 4]) as u32
}

fn be_u64(b: &[u8], at: usize) -> u64 {
    be_uint(&b[at..at + 8])
}

fn array<const N: usize>(b: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[at..at + N]);
    out
}

#[cfg(test)]
#[path = "tests/header_tests.rs"]
mod tests;
