//! Decoder for MAME compressed hunk (CHD) disc images.
//!
//! A CHD stores a disc as fixed-size hunks, each compressed independently
//! and located through a hunk map. This crate parses the header (v3, v4
//! and v5), decodes the map, decompresses hunks through a pluggable codec
//! registry, reads CD track metadata, and exposes the result as positional
//! byte streams of raw or user-data sectors.
//!
//! ```no_run
//! use gameid_chd::Chd;
//! use positioned_io::ReadAt;
//!
//! let chd = Chd::open("game.chd")?;
//! let reader = chd.data_track_reader();
//! let mut pvd = [0u8; 2048];
//! reader.read_exact_at(16 * 2048, &mut pvd)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bitstream;
mod chd;
pub mod codec;
pub mod error;
pub mod header;
pub mod hunks;
mod huffman;
pub mod metadata;
mod options;
pub mod reader;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use chd::Chd;
pub use codec::{CdCodec, Codec, CodecTag, create_codec, register_codec};
pub use error::{ChdError, Result};
pub use header::{Header, HeaderVersion};
pub use hunks::{HunkDirectory, HunkEntry, HunkKind};
pub use metadata::{MetadataEntry, Track, TrackTable, TrackType};
pub use options::ChdOptions;
pub use reader::{SectorLocation, SectorMode, SectorReader};
