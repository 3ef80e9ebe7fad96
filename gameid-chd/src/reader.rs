//! Sector views over an open container.
//!
//! A [`SectorReader`] turns hunk-addressed container data into a flat byte
//! stream of either raw 2352-byte sectors or 2048-byte user-data sectors.
//! Readers hold no cursor: every read is addressed by an absolute offset,
//! so any number of them can share one container across threads.

use std::io;

use positioned_io::ReadAt;

use gameid_core::cd::{ISO_SECTOR_SIZE, RAW_SECTOR_SIZE, user_data_offset};

use crate::chd::Chd;
use crate::error::Result;

/// Which bytes of each sector a reader exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorMode {
    /// Full 2352-byte sectors, sync and headers included.
    Raw,
    /// 2048 bytes of user data per sector.
    Logical,
}

impl SectorMode {
    pub fn sector_size(self) -> u64 {
        match self {
            Self::Raw => RAW_SECTOR_SIZE,
            Self::Logical => ISO_SECTOR_SIZE,
        }
    }
}

/// Where a byte offset of a view lands inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorLocation {
    pub hunk: u64,
    pub sector_in_hunk: u32,
    pub offset_in_sector: u32,
}

/// Positional byte view over a container's sectors.
pub struct SectorReader<'a, R> {
    chd: &'a Chd<R>,
    mode: SectorMode,
    data_track_start: u64,
}

impl<R> Clone for SectorReader<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for SectorReader<'_, R> {}

impl<'a, R: ReadAt> SectorReader<'a, R> {
    /// Raw 2352-byte sectors from the start of the container.
    pub fn new_raw(chd: &'a Chd<R>) -> Self {
        Self {
            chd,
            mode: SectorMode::Raw,
            data_track_start: 0,
        }
    }

    /// 2048-byte user data sectors from the start of the container.
    pub fn new_logical(chd: &'a Chd<R>) -> Self {
        Self {
            chd,
            mode: SectorMode::Logical,
            data_track_start: 0,
        }
    }

    /// 2048-byte user data sectors starting at the first data track.
    ///
    /// The data track position is decided here, before any read, by
    /// [`Chd::data_track_start`].
    pub fn new_logical_from_first_data_track(chd: &'a Chd<R>) -> Self {
        Self {
            chd,
            mode: SectorMode::Logical,
            data_track_start: chd.data_track_start(),
        }
    }

    pub fn mode(&self) -> SectorMode {
        self.mode
    }

    pub fn sector_size(&self) -> u64 {
        self.mode.sector_size()
    }

    pub fn is_raw(&self) -> bool {
        self.mode == SectorMode::Raw
    }

    /// Sector index that offset 0 of this view maps to.
    pub fn data_track_start(&self) -> u64 {
        self.data_track_start
    }

    /// Length of the virtual stream in bytes.
    pub fn len(&self) -> u64 {
        let header = self.chd.header();
        let sectors = header.logical_bytes.div_ceil(u64::from(header.unit_bytes));
        sectors.saturating_sub(self.data_track_start) * self.sector_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a byte offset of this view to a hunk and sector.
    pub fn locate(&self, offset: u64) -> SectorLocation {
        let sectors_per_hunk = u64::from(self.chd.header().sectors_per_hunk());
        let sector_size = self.sector_size();
        let sector = offset / sector_size + self.data_track_start;
        SectorLocation {
            hunk: sector / sectors_per_hunk,
            sector_in_hunk: (sector % sectors_per_hunk) as u32,
            offset_in_sector: (offset % sector_size) as u32,
        }
    }

    /// Copy bytes starting at `pos` into `buf`.
    ///
    /// Returns the number of bytes copied; 0 means `pos` is at or past the
    /// end of the view. A hunk that fails to decode after some bytes were
    /// already copied ends the read early instead of failing it.
    pub fn read_sectors_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let unit_bytes = self.chd.header().unit_bytes as usize;
        let sector_size = self.sector_size();
        let end = self.len();

        let mut copied = 0;
        while copied < buf.len() {
            let offset = pos + copied as u64;
            if offset >= end {
                break;
            }

            let location = self.locate(offset);
            let in_sector = location.offset_in_sector as usize;

            let hunk = match self.chd.read_hunk(location.hunk) {
                Ok(hunk) => hunk,
                Err(e) if copied > 0 => {
                    log::debug!("Short read at offset {}: {}", offset, e);
                    break;
                }
                Err(e) => return Err(e),
            };

            let unit_start = location.sector_in_hunk as usize * unit_bytes;
            if unit_start >= hunk.len() {
                break;
            }
            let unit = &hunk[unit_start..(unit_start + unit_bytes).min(hunk.len())];
            let data_offset = match self.mode {
                SectorMode::Raw => 0,
                SectorMode::Logical => user_data_offset(unit),
            };
            let start = data_offset + in_sector;
            if start >= unit.len() {
                break;
            }

            let n = (sector_size as usize - in_sector)
                .min(unit.len() - start)
                .min(buf.len() - copied)
                .min((end - offset) as usize);
            buf[copied..copied + n].copy_from_slice(&unit[start..start + n]);
            copied += n;
        }
        Ok(copied)
    }
}

impl<R: ReadAt> ReadAt for SectorReader<'_, R> {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.read_sectors_at(pos, buf).map_err(io::Error::from)
    }
}

#[cfg(test)]
#[path = "tests/reader_tests.rs"]
mod tests;
