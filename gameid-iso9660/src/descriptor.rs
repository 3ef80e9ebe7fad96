//! Primary Volume Descriptor parsing.

use std::fmt;

use gameid_core::AnalysisError;
use gameid_core::cd::PVD_SIGNATURE;
use gameid_core::util::read_ascii_fixed;

use crate::directory::{DirectoryRecord, parse_directory_record};

/// Parsed ISO 9660 Primary Volume Descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryVolumeDescriptor {
    /// System identifier (offset 8, 32 bytes). e.g. "PLAYSTATION"
    pub system_identifier: String,
    /// Volume identifier (offset 40, 32 bytes).
    pub volume_identifier: String,
    /// Volume space size in sectors (offset 80, LE u32).
    pub volume_space_size: u32,
    /// Logical block size (offset 128, LE u16), normally 2048.
    pub logical_block_size: u16,
    /// Root directory record (offset 156, 34 bytes).
    pub root_directory: DirectoryRecord,
    /// Publisher identifier (offset 318, 128 bytes).
    pub publisher_identifier: String,
    /// Data preparer identifier (offset 446, 128 bytes).
    pub data_preparer_identifier: String,
    /// Application identifier (offset 574, 128 bytes).
    pub application_identifier: String,
    /// Volume creation date (offset 813, 17 bytes), if recorded.
    pub creation_date: Option<VolumeDateTime>,
}

impl PrimaryVolumeDescriptor {
    /// Minimum bytes needed to parse every field.
    pub const SIZE: usize = 830;

    /// Parse a descriptor from the start of `data` (one 2048-byte block).
    pub fn parse(data: &[u8]) -> Result<Self, AnalysisError> {
        if data.len() < Self::SIZE {
            return Err(AnalysisError::TooSmall {
                expected: Self::SIZE as u64,
                actual: data.len() as u64,
            });
        }
        if data[..PVD_SIGNATURE.len()] != PVD_SIGNATURE {
            return Err(AnalysisError::invalid_format(format!(
                "Expected PVD type 0x01 and CD001, got 0x{:02X} {:?}",
                data[0],
                String::from_utf8_lossy(&data[1..6])
            )));
        }

        let root_directory = parse_directory_record(&data[156..190]).ok_or_else(|| {
            AnalysisError::corrupted_header("Root directory record in PVD is malformed")
        })?;

        Ok(Self {
            system_identifier: read_ascii_fixed(&data[8..40]),
            volume_identifier: read_ascii_fixed(&data[40..72]),
            volume_space_size: le_u32(&data[80..84]),
            logical_block_size: u16::from_le_bytes([data[128], data[129]]),
            root_directory,
            publisher_identifier: read_ascii_fixed(&data[318..446]),
            data_preparer_identifier: read_ascii_fixed(&data[446..574]),
            application_identifier: read_ascii_fixed(&data[574..702]),
            creation_date: VolumeDateTime::parse(&data[813..830]),
        })
    }

    /// Creation timestamp digits joined with dashes, as commonly used to
    /// tell releases of the same title apart. Empty when no date is recorded.
    pub fn disc_uuid(&self) -> String {
        self.creation_date
            .as_ref()
            .map(|date| date.to_string())
            .unwrap_or_default()
    }
}

/// A 17-byte volume descriptor timestamp: sixteen ASCII digits plus a GMT
/// offset in 15-minute units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
    pub gmt_offset: i8,
}

impl VolumeDateTime {
    /// Parse the timestamp; all-zero or non-numeric fields mean "not set".
    pub fn parse(data: &[u8]) -> Option<Self> {
        let digits = data.get(..16)?;
        if !digits.iter().all(u8::is_ascii_digit) || digits.iter().all(|&b| b == b'0') {
            return None;
        }
        let field = |range: std::ops::Range<usize>| {
            digits[range]
                .iter()
                .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'))
        };
        Some(Self {
            year: field(0..4),
            month: field(4..6) as u8,
            day: field(6..8) as u8,
            hour: field(8..10) as u8,
            minute: field(10..12) as u8,
            second: field(12..14) as u8,
            hundredths: field(14..16) as u8,
            gmt_offset: data.get(16).map_or(0, |&b| b as i8),
        })
    }
}

impl fmt::Display for VolumeDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.hundredths
        )
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
#[path = "tests/descriptor_tests.rs"]
mod tests;
