//! CD-ROM sector layout constants and helpers.

/// CD sync pattern at the start of every raw (2352-byte) data sector.
pub const CD_SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

/// Standard ISO 9660 sector size (user data only).
pub const ISO_SECTOR_SIZE: u64 = 2048;

/// Raw CD sector size (sync + header + subheader + data + EDC + ECC).
pub const RAW_SECTOR_SIZE: u64 = 2352;

/// Subchannel bytes stored after each raw sector in a CD frame.
pub const SUBCODE_SIZE: u64 = 96;

/// One CD frame as stored in a compressed container: raw sector plus subchannel.
pub const FRAME_SIZE: u64 = RAW_SECTOR_SIZE + SUBCODE_SIZE;

/// Offset to user data within a Mode 1 raw sector: 12 (sync) + 4 (header).
pub const MODE1_DATA_OFFSET: usize = 16;

/// Offset to user data within a Mode 2 Form 1 raw sector.
/// 12 (sync) + 4 (header) + 8 (subheader) = 24.
pub const MODE2_FORM1_DATA_OFFSET: usize = 24;

/// Position of the mode byte within the raw sector header.
pub const MODE_BYTE_OFFSET: usize = 15;

/// ISO 9660 Primary Volume Descriptor is always at sector 16.
pub const PVD_SECTOR: u64 = 16;

/// Leading bytes of a Primary Volume Descriptor: type 0x01 followed by "CD001".
pub const PVD_SIGNATURE: [u8; 6] = [0x01, b'C', b'D', b'0', b'0', b'1'];

/// Byte offset of user data inside a stored sector.
///
/// Sectors that begin with the sync pattern carry a header: Mode 2 sectors
/// (mode byte 2) put user data at 24, everything else at 16. Sectors without
/// the sync pattern are treated as plain user data.
pub fn user_data_offset(sector: &[u8]) -> usize {
    if sector.len() > MODE_BYTE_OFFSET && sector[..CD_SYNC_PATTERN.len()] == CD_SYNC_PATTERN {
        if sector[MODE_BYTE_OFFSET] == 2 {
            MODE2_FORM1_DATA_OFFSET
        } else {
            MODE1_DATA_OFFSET
        }
    } else {
        0
    }
}

/// Whether `sector` carries a Primary Volume Descriptor at its user data offset.
pub fn has_pvd_signature(sector: &[u8]) -> bool {
    let start = user_data_offset(sector);
    sector
        .get(start..start + PVD_SIGNATURE.len())
        .is_some_and(|sig| sig == PVD_SIGNATURE)
}

#[cfg(test)]
#[path = "tests/cd_tests.rs"]
mod tests;
