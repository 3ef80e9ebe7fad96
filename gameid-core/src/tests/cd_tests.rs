use super::*;

fn raw_sector(mode: u8) -> Vec<u8> {
    let mut sector = vec![0u8; RAW_SECTOR_SIZE as usize];
    sector[..12].copy_from_slice(&CD_SYNC_PATTERN);
    sector[MODE_BYTE_OFFSET] = mode;
    sector
}

#[test]
fn plain_user_data_starts_at_zero() {
    let sector = vec![0u8; ISO_SECTOR_SIZE as usize];
    assert_eq!(user_data_offset(&sector), 0);
}

#[test]
fn mode1_sector_data_offset() {
    assert_eq!(user_data_offset(&raw_sector(1)), MODE1_DATA_OFFSET);
}

#[test]
fn mode2_sector_data_offset() {
    assert_eq!(user_data_offset(&raw_sector(2)), MODE2_FORM1_DATA_OFFSET);
}

#[test]
fn short_buffer_is_plain_data() {
    assert_eq!(user_data_offset(&CD_SYNC_PATTERN), 0);
    assert_eq!(user_data_offset(&[]), 0);
}

#[test]
fn pvd_signature_in_plain_sector() {
    let mut sector = vec![0u8; 2048];
    sector[..6].copy_from_slice(&PVD_SIGNATURE);
    assert!(has_pvd_signature(&sector));
}

#[test]
fn pvd_signature_after_mode2_header() {
    let mut sector = raw_sector(2);
    sector[24..30].copy_from_slice(&PVD_SIGNATURE);
    assert!(has_pvd_signature(&sector));

    // Same bytes at the Mode 1 offset do not count for a Mode 2 sector.
    let mut wrong = raw_sector(2);
    wrong[16..22].copy_from_slice(&PVD_SIGNATURE);
    assert!(!has_pvd_signature(&wrong));
}

#[test]
fn truncated_signature_is_rejected() {
    assert!(!has_pvd_signature(&PVD_SIGNATURE[..5]));
}
