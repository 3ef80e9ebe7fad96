//! ISO 9660 volume reader over positional byte sources.
//!
//! Works on plain `.iso` images, raw 2352-byte sector dumps, and the
//! data-track view of a CHD container alike: the volume descriptor is
//! located by signature, and block size and offset are derived from where
//! it was found.

mod descriptor;
mod directory;
mod image;

pub use descriptor::{PrimaryVolumeDescriptor, VolumeDateTime};
pub use directory::DirectoryRecord;
pub use image::{IsoImage, PVD_SEARCH_BYTES};
