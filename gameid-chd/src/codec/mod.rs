//! Hunk codecs and the process-wide codec registry.
//!
//! A codec turns one compressed hunk payload into hunk bytes. CD codecs also
//! need the hunk geometry to split the payload into sector and subchannel
//! streams, so they additionally implement [`CdCodec`]. Codecs are created
//! per hunk read from a registered factory; instances are never shared.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use gameid_core::util::fourcc;

use crate::error::{ChdError, Result};

mod cd;
mod deflate;
mod flac;
mod lzma;
mod zstandard;

pub use cd::{CdLzmaCodec, CdZlibCodec, CdZstdCodec};
pub use deflate::DeflateCodec;
pub use flac::{CdFlacCodec, FlacCodec};
pub use lzma::LzmaCodec;
pub use zstandard::ZstdCodec;

// ---------------------------------------------------------------------------
// Codec tags
// ---------------------------------------------------------------------------

/// Four-character codec identifier, stored big-endian in the header.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecTag(u32);

impl CodecTag {
    /// Slot value meaning "no compression".
    pub const NONE: Self = Self(0);
    pub const ZLIB: Self = Self::from_bytes(*b"zlib");
    pub const LZMA: Self = Self::from_bytes(*b"lzma");
    pub const ZSTD: Self = Self::from_bytes(*b"zstd");
    pub const FLAC: Self = Self::from_bytes(*b"flac");
    pub const AVHUFF: Self = Self::from_bytes(*b"avhu");
    pub const CD_ZLIB: Self = Self::from_bytes(*b"cdzl");
    pub const CD_LZMA: Self = Self::from_bytes(*b"cdlz");
    pub const CD_ZSTD: Self = Self::from_bytes(*b"cdzs");
    pub const CD_FLAC: Self = Self::from_bytes(*b"cdfl");

    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Whether payloads for this codec use the CD frame layout.
    pub fn is_cd(self) -> bool {
        matches!(
            self,
            Self::CD_ZLIB | Self::CD_LZMA | Self::CD_ZSTD | Self::CD_FLAC
        )
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fourcc(self.0))
    }
}

impl fmt::Debug for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecTag({:?})", fourcc(self.0))
    }
}

impl From<u32> for CodecTag {
    fn from(tag: u32) -> Self {
        Self(tag)
    }
}

// ---------------------------------------------------------------------------
// Codec traits
// ---------------------------------------------------------------------------

/// A hunk decompressor.
pub trait Codec: Send {
    /// Decompress `src` into `dst`.
    ///
    /// # Returns
    /// The number of bytes written to `dst`. This may be less than
    /// `dst.len()` if the payload decodes to fewer bytes.
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Access the CD-aware entry point, if this codec has one.
    fn as_cd(&mut self) -> Option<&mut dyn CdCodec> {
        None
    }
}

/// A codec whose payload is split into sector and subchannel streams.
pub trait CdCodec: Codec {
    /// Decompress a CD hunk of `frames` frames spanning `hunk_bytes` bytes.
    fn decompress_cd(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        hunk_bytes: u32,
        frames: u32,
    ) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Factory producing a fresh codec instance.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn Codec> + Send + Sync>;

static REGISTRY: LazyLock<RwLock<HashMap<CodecTag, CodecFactory>>> =
    LazyLock::new(|| RwLock::new(builtin_codecs()));

fn builtin_codecs() -> HashMap<CodecTag, CodecFactory> {
    let mut map: HashMap<CodecTag, CodecFactory> = HashMap::new();
    map.insert(CodecTag::ZLIB, Arc::new(|| Box::new(DeflateCodec::new())));
    map.insert(CodecTag::LZMA, Arc::new(|| Box::new(LzmaCodec::new())));
    map.insert(CodecTag::ZSTD, Arc::new(|| Box::new(ZstdCodec::new())));
    map.insert(CodecTag::FLAC, Arc::new(|| Box::new(FlacCodec::new())));
    map.insert(CodecTag::CD_ZLIB, Arc::new(|| Box::new(CdZlibCodec::new())));
    map.insert(CodecTag::CD_LZMA, Arc::new(|| Box::new(CdLzmaCodec::new())));
    map.insert(CodecTag::CD_ZSTD, Arc::new(|| Box::new(CdZstdCodec::new())));
    map.insert(CodecTag::CD_FLAC, Arc::new(|| Box::new(CdFlacCodec::new())));
    map
}

/// Register (or replace) the factory for `tag`.
///
/// Registration is process-wide and visible to every container opened
/// afterwards, including from other threads.
pub fn register_codec<F>(tag: CodecTag, factory: F)
where
    F: Fn() -> Box<dyn Codec> + Send + Sync + 'static,
{
    log::debug!("Registering codec {}", tag);
    REGISTRY.write().insert(tag, Arc::new(factory));
}

/// Whether a factory is registered for `tag`.
pub fn is_registered(tag: CodecTag) -> bool {
    REGISTRY.read().contains_key(&tag)
}

/// Create a fresh codec instance for `tag`.
pub fn create_codec(tag: CodecTag) -> Result<Box<dyn Codec>> {
    let factory = REGISTRY
        .read()
        .get(&tag)
        .cloned()
        .ok_or_else(|| ChdError::unsupported_codec(tag.as_u32()))?;
    Ok(factory())
}

/// Fill `dst` from a decoder until it is full or the stream ends.
fn read_full(reader: &mut impl std::io::Read, dst: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < dst.len() {
        match reader.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
#[path = "../tests/codec_tests.rs"]
mod tests;
