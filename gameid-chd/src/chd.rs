use std::fs::File;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use positioned_io::ReadAt;
use sha1::{Digest, Sha1};

use gameid_core::cd::{ISO_SECTOR_SIZE, PVD_SECTOR, RAW_SECTOR_SIZE, has_pvd_signature};

use crate::error::Result;
use crate::header::Header;
use crate::hunks::HunkDirectory;
use crate::metadata::{MetadataEntry, TrackTable, read_metadata_chain};
use crate::options::ChdOptions;
use crate::reader::SectorReader;

/// Hunks always scanned for a volume descriptor, whatever the hunk size.
const MIN_PVD_SEARCH_HUNKS: u64 = 5;

/// An open container.
///
/// Everything here is read-only after opening (the hunk cache is internally
/// synchronized), so a `Chd` can be shared by reference across threads and
/// any number of [`SectorReader`]s.
pub struct Chd<R> {
    header: Header,
    hunks: HunkDirectory<R>,
    metadata: Vec<MetadataEntry>,
    tracks: TrackTable,
    options: ChdOptions,
    data_track_start: OnceLock<u64>,
}

impl Chd<File> {
    /// Open a container file with options from the shared settings file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ChdOptions::from_settings())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: ChdOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_source_with_options(file, options)
    }
}

impl<R: ReadAt> Chd<R> {
    /// Open a container over any positional byte source, with default options.
    pub fn from_source(source: R) -> Result<Self> {
        Self::from_source_with_options(source, ChdOptions::default())
    }

    pub fn from_source_with_options(source: R, options: ChdOptions) -> Result<Self> {
        let header = Header::read(&source)?;
        if header.has_parent() {
            log::debug!("Container depends on a parent; parent hunks will not be readable");
        }
        let hunks = HunkDirectory::build(source, &header, &options)?;

        // Track metadata is optional: a broken chain leaves the track table
        // unknown and data-track discovery falls back to scanning.
        let metadata = match read_metadata_chain(hunks.source(), header.meta_offset) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Ignoring unreadable metadata chain: {}", e);
                Vec::new()
            }
        };
        let tracks = TrackTable::from_metadata_or_unknown(&metadata);
        if let TrackTable::Known(list) = &tracks {
            log::debug!("Container has {} tracks", list.len());
        }

        Ok(Self {
            header,
            hunks,
            metadata,
            tracks,
            options,
            data_track_start: OnceLock::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn hunks(&self) -> &HunkDirectory<R> {
        &self.hunks
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    /// All metadata entries, in chain order.
    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// First metadata entry with the given tag.
    pub fn find_metadata(&self, tag: u32) -> Option<&MetadataEntry> {
        self.metadata.iter().find(|e| e.tag == tag)
    }

    pub fn options(&self) -> &ChdOptions {
        &self.options
    }

    pub fn num_hunks(&self) -> u32 {
        self.hunks.num_hunks()
    }

    pub fn read_hunk(&self, index: u64) -> Result<Arc<[u8]>> {
        self.hunks.read_hunk(index)
    }

    pub fn raw_reader(&self) -> SectorReader<'_, R> {
        SectorReader::new_raw(self)
    }

    pub fn logical_reader(&self) -> SectorReader<'_, R> {
        SectorReader::new_logical(self)
    }

    /// Logical view anchored at the first data track.
    pub fn data_track_reader(&self) -> SectorReader<'_, R> {
        SectorReader::new_logical_from_first_data_track(self)
    }

    /// Sector index where the first data track's user data begins.
    ///
    /// Taken from track metadata when it names a nonzero position; otherwise
    /// early hunks are scanned for a Primary Volume Descriptor, which sits 16
    /// sectors into the data track. If none is found the whole container is
    /// assumed to be one data track starting at sector 0. Decided once and
    /// remembered.
    pub fn data_track_start(&self) -> u64 {
        *self
            .data_track_start
            .get_or_init(|| self.discover_data_track_start())
    }

    /// Size in bytes of the first data track's user data.
    ///
    /// Without track metadata this is the length of the data track view.
    pub fn data_track_size(&self) -> u64 {
        match self.tracks.first_data_track() {
            Some(track) => u64::from(track.data_frames()) * ISO_SECTOR_SIZE,
            None => self.data_track_reader().len(),
        }
    }

    /// Byte offset of the first data track within the raw sector view.
    pub fn first_data_track_offset(&self) -> u64 {
        self.data_track_start() * RAW_SECTOR_SIZE
    }

    /// Recompute the SHA-1 of the logical data and compare it with the header.
    pub fn verify_raw_sha1(&self) -> Result<bool> {
        let mut hasher = Sha1::new();
        let mut remaining = self.header.logical_bytes;
        for index in 0..u64::from(self.num_hunks()) {
            if remaining == 0 {
                break;
            }
            let hunk = self.read_hunk(index)?;
            let take = remaining.min(hunk.len() as u64) as usize;
            hasher.update(&hunk[..take]);
            remaining -= take as u64;
        }
        let digest = hasher.finalize();
        let matches = digest.as_slice() == self.header.raw_sha1().as_slice();
        if !matches {
            log::debug!("Raw SHA-1 mismatch");
        }
        Ok(matches)
    }

    fn discover_data_track_start(&self) -> u64 {
        if let Some(track) = self.tracks.first_data_track() {
            let start = track.data_start_frame();
            if start > 0 {
                log::debug!("Data track {} starts at sector {} (metadata)", track.number, start);
                return start;
            }
        }

        if !self.options.pvd_search {
            return 0;
        }
        match self.find_pvd_sector() {
            Some(sector) => {
                let start = sector.saturating_sub(PVD_SECTOR);
                log::debug!(
                    "Volume descriptor found at sector {}, data track starts at {}",
                    sector,
                    start
                );
                start
            }
            None => {
                log::debug!("No volume descriptor in scanned hunks, assuming data track at sector 0");
                0
            }
        }
    }

    /// Absolute sector index of the first unit carrying the PVD signature.
    fn find_pvd_sector(&self) -> Option<u64> {
        let sectors_per_hunk = u64::from(self.header.sectors_per_hunk());
        let unit_bytes = self.header.unit_bytes as usize;
        let hunks_to_scan = (u64::from(self.options.pvd_search_sectors) / sectors_per_hunk)
            .max(MIN_PVD_SEARCH_HUNKS)
            .min(u64::from(self.num_hunks()));

        for hunk_index in 0..hunks_to_scan {
            let hunk = match self.read_hunk(hunk_index) {
                Ok(hunk) => hunk,
                Err(e) => {
                    log::debug!("Skipping hunk {} during volume descriptor scan: {}", hunk_index, e);
                    continue;
                }
            };
            let units = hunk.chunks(unit_bytes).take(sectors_per_hunk as usize);
            for (sector_in_hunk, unit) in units.enumerate() {
                if has_pvd_signature(unit) {
                    return Some(hunk_index * sectors_per_hunk + sector_in_hunk as u64);
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "tests/chd_tests.rs"]
mod tests;
