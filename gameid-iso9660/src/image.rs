//! Volume access: descriptor discovery, sector addressing, file lookup.

use std::fs::File;
use std::io;
use std::path::Path;

use gameid_chd::{Chd, SectorReader};
use gameid_core::cd::{ISO_SECTOR_SIZE, PVD_SECTOR, PVD_SIGNATURE, RAW_SECTOR_SIZE};
use gameid_core::util::read_up_to;
use gameid_core::{AnalysisError, ReadAt};

use crate::descriptor::PrimaryVolumeDescriptor;
use crate::directory::{DirectoryRecord, parse_directory_sector};

/// How far into the source the volume descriptor is searched for.
pub const PVD_SEARCH_BYTES: usize = 1_000_000;

/// An ISO 9660 volume over a positional byte source.
pub struct IsoImage<S> {
    source: S,
    size: u64,
    block_size: u64,
    /// Byte position of block 0's user data; may point into a sector header.
    block_offset: u64,
    pvd: PrimaryVolumeDescriptor,
}

impl IsoImage<File> {
    /// Open an image file (`.iso` or raw `.bin`).
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        Self::open(file, size)
    }
}

impl<'a, R: ReadAt> IsoImage<SectorReader<'a, R>> {
    /// Open the filesystem on a container's first data track.
    pub fn from_chd(chd: &'a Chd<R>) -> Result<Self, AnalysisError> {
        Self::open(chd.data_track_reader(), chd.data_track_size())
    }
}

impl<S: ReadAt> IsoImage<S> {
    /// Locate and parse the volume descriptor in `source`, which is `size`
    /// bytes long.
    ///
    /// The descriptor is found by signature within the first
    /// [`PVD_SEARCH_BYTES`]. Sizes that are a whole number of raw sectors are
    /// read as 2352-byte blocks, anything else as 2048-byte blocks. The
    /// descriptor always sits in block 16, so its position fixes where
    /// block 0 begins.
    pub fn open(source: S, size: u64) -> Result<Self, AnalysisError> {
        if size == 0 {
            return Err(AnalysisError::TooSmall {
                expected: (PVD_SECTOR + 1) * ISO_SECTOR_SIZE,
                actual: 0,
            });
        }
        let search_len = size.min(PVD_SEARCH_BYTES as u64) as usize;
        let mut head = vec![0u8; search_len];
        let filled = read_up_to(&source, 0, &mut head)?;
        head.truncate(filled);

        let pvd_offset = head
            .windows(PVD_SIGNATURE.len())
            .position(|w| w == PVD_SIGNATURE)
            .ok_or_else(|| {
                AnalysisError::not_found(format!(
                    "Primary volume descriptor in the first {} bytes",
                    filled
                ))
            })? as u64;

        // A user-data view can be a whole number of raw sectors by accident;
        // a descriptor too early for raw blocks settles it.
        let block_size = if size % RAW_SECTOR_SIZE == 0 && pvd_offset >= PVD_SECTOR * RAW_SECTOR_SIZE {
            RAW_SECTOR_SIZE
        } else {
            ISO_SECTOR_SIZE
        };
        let block_offset = pvd_offset
            .checked_sub(PVD_SECTOR * block_size)
            .ok_or_else(|| {
                AnalysisError::corrupted_header(format!(
                    "Volume descriptor at byte {} is too early for {}-byte blocks",
                    pvd_offset, block_size
                ))
            })?;
        log::debug!(
            "Volume descriptor at byte {}: {}-byte blocks, block 0 at {}",
            pvd_offset,
            block_size,
            block_offset
        );

        let mut descriptor = vec![0u8; ISO_SECTOR_SIZE as usize];
        let n = read_up_to(&source, pvd_offset, &mut descriptor)?;
        descriptor.truncate(n);
        let pvd = PrimaryVolumeDescriptor::parse(&descriptor)?;

        Ok(Self {
            source,
            size,
            block_size,
            block_offset,
            pvd,
        })
    }

    pub fn pvd(&self) -> &PrimaryVolumeDescriptor {
        &self.pvd
    }

    pub fn volume_id(&self) -> &str {
        &self.pvd.volume_identifier
    }

    pub fn system_id(&self) -> &str {
        &self.pvd.system_identifier
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_offset(&self) -> u64 {
        self.block_offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read 2048 bytes of user data from block `lba`.
    pub fn read_sector(&self, lba: u64) -> Result<[u8; 2048], AnalysisError> {
        let offset = self.block_offset + lba * self.block_size;
        let mut data = [0u8; 2048];
        self.source.read_exact_at(offset, &mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                AnalysisError::corrupted_header(format!("Sector {} is beyond end of image", lba))
            } else {
                AnalysisError::Io(e)
            }
        })?;
        Ok(data)
    }

    /// Every record in the root directory, `.` and `..` included.
    pub fn root_entries(&self) -> Result<Vec<DirectoryRecord>, AnalysisError> {
        self.directory_entries(&self.pvd.root_directory)
    }

    /// Every record in the directory described by `dir`.
    pub fn directory_entries(
        &self,
        dir: &DirectoryRecord,
    ) -> Result<Vec<DirectoryRecord>, AnalysisError> {
        let sectors = u64::from(dir.data_length).div_ceil(ISO_SECTOR_SIZE);
        let mut records = Vec::new();
        for i in 0..sectors {
            let sector = self.read_sector(u64::from(dir.extent_lba) + i)?;
            records.extend(parse_directory_sector(&sector));
        }
        Ok(records)
    }

    /// Look up a file in the root directory by name.
    ///
    /// The comparison ignores case and the `;1` version suffix.
    pub fn find_file_in_root(&self, name: &str) -> Result<DirectoryRecord, AnalysisError> {
        self.root_entries()?
            .into_iter()
            .find(|record| !record.is_directory() && record.matches(name))
            .ok_or_else(|| {
                AnalysisError::not_found(format!("File '{}' in root directory", name))
            })
    }

    /// Read the full content of a file given its directory record.
    pub fn read_file(&self, record: &DirectoryRecord) -> Result<Vec<u8>, AnalysisError> {
        let mut result = Vec::with_capacity(record.data_length as usize);
        let sectors_needed = u64::from(record.data_length).div_ceil(ISO_SECTOR_SIZE);
        let mut remaining = record.data_length as usize;

        for i in 0..sectors_needed {
            let sector = self.read_sector(u64::from(record.extent_lba) + i)?;
            let to_copy = remaining.min(sector.len());
            result.extend_from_slice(&sector[..to_copy]);
            remaining -= to_copy;
        }
        Ok(result)
    }

    /// Find and read a root-directory file in one step.
    pub fn read_root_file(&self, name: &str) -> Result<Vec<u8>, AnalysisError> {
        let record = self.find_file_in_root(name)?;
        self.read_file(&record)
    }
}

#[cfg(test)]
#[path = "tests/image_tests.rs"]
mod tests;
