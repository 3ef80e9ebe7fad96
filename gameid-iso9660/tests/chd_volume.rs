//! Filesystem access through CHD containers.

use std::io::Write;

use gameid_chd::test_util::{ChdBuilder, HunkSpec, cd_zlib};
use gameid_chd::{Chd, ChdOptions, CodecTag};
use gameid_core::cd::{CD_SYNC_PATTERN, PVD_SIGNATURE};
use gameid_iso9660::IsoImage;

const README: &[u8] = b"Hello from the data track\n";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dir_record(id: &[u8], extent_lba: u32, data_length: u32, flags: u8) -> Vec<u8> {
    let record_len = 33 + id.len() + (id.len() + 1) % 2;
    let mut record = vec![0u8; record_len];
    record[0] = record_len as u8;
    record[2..6].copy_from_slice(&extent_lba.to_le_bytes());
    record[10..14].copy_from_slice(&data_length.to_le_bytes());
    record[25] = flags;
    record[32] = id.len() as u8;
    record[33..33 + id.len()].copy_from_slice(id);
    record
}

/// 20 user-data sectors: PVD at 16, terminator at 17, root directory at 18
/// holding README.TXT, whose data is at 19.
fn iso_sectors(volume_id: &str) -> Vec<Vec<u8>> {
    let mut sectors = vec![vec![0u8; 2048]; 20];

    let pvd = &mut sectors[16];
    pvd[..6].copy_from_slice(&PVD_SIGNATURE);
    pvd[6] = 1;
    pvd[40..72].fill(b' ');
    pvd[40..40 + volume_id.len()].copy_from_slice(volume_id.as_bytes());
    pvd[80..84].copy_from_slice(&20u32.to_le_bytes());
    pvd[156..190].copy_from_slice(&dir_record(&[0], 18, 2048, 0x02));

    sectors[17][0] = 0xFF;
    sectors[17][1..6].copy_from_slice(b"CD001");

    let mut root = dir_record(&[0], 18, 2048, 0x02);
    root.extend(dir_record(&[1], 18, 2048, 0x02));
    root.extend(dir_record(b"README.TXT;1", 19, README.len() as u32, 0));
    sectors[18][..root.len()].copy_from_slice(&root);

    sectors[19][..README.len()].copy_from_slice(README);
    sectors
}

/// Mode 2 frame (raw sector plus subchannel) around 2048 bytes of user data.
fn mode2_frame(user_data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 2448];
    frame[..12].copy_from_slice(&CD_SYNC_PATTERN);
    frame[15] = 2;
    frame[24..24 + 2048].copy_from_slice(user_data);
    frame
}

/// 8 frames of silent audio followed by a 24-frame Mode 2 data track,
/// compressed with cdzl in hunks of 8 frames.
fn mixed_mode_image(with_tracks: bool) -> Vec<u8> {
    let mut frames = vec![vec![0u8; 2448]; 8];
    let mut data = iso_sectors("MIXEDVOL");
    data.resize(24, vec![0u8; 2048]);
    frames.extend(data.iter().map(|s| mode2_frame(s)));

    let mut builder = ChdBuilder::v5(2448 * 8, 2448).compressor(0, CodecTag::CD_ZLIB);
    if with_tracks {
        builder = builder
            .track(1, "AUDIO", 8, 0, "AUDIO")
            .track(2, "MODE2_RAW", 24, 0, "MODE2");
    }
    for hunk in frames.chunks(8) {
        let hunk = hunk.concat();
        builder = builder.hunk(HunkSpec::Compressed {
            slot: 0,
            payload: cd_zlib(&hunk).unwrap(),
            data: hunk,
        });
    }
    builder.build()
}

#[test]
fn volume_id_from_uncompressed_container() {
    init_logger();
    let mut iso = iso_sectors("TESTVOL").concat();
    iso.truncate(18 * 2048);
    let image = ChdBuilder::v5(18 * 2048, 2048).stored(iso).build();

    let chd = Chd::from_source(image).unwrap();
    assert_eq!(chd.num_hunks(), 1);
    assert_eq!(chd.data_track_start(), 0);

    let volume = IsoImage::from_chd(&chd).unwrap();
    assert_eq!(volume.volume_id(), "TESTVOL");
    assert_eq!(volume.block_size(), 2048);
    assert_eq!(volume.block_offset(), 0);
}

#[test]
fn data_track_located_by_metadata() {
    init_logger();
    let chd = Chd::from_source(mixed_mode_image(true)).unwrap();
    assert_eq!(chd.data_track_start(), 8);
    assert_eq!(chd.data_track_size(), 24 * 2048);

    let volume = IsoImage::from_chd(&chd).unwrap();
    assert_eq!(volume.volume_id(), "MIXEDVOL");
    assert_eq!(volume.read_root_file("readme.txt").unwrap(), README);
}

#[test]
fn data_track_located_by_scan() {
    let chd = Chd::from_source(mixed_mode_image(false)).unwrap();
    assert!(!chd.tracks().is_known());
    assert_eq!(chd.data_track_start(), 8);
    assert_eq!(chd.first_data_track_offset(), 8 * 2352);

    let volume = IsoImage::from_chd(&chd).unwrap();
    assert_eq!(volume.read_root_file("README.TXT").unwrap(), README);
}

#[test]
fn raw_view_exposes_sector_headers() {
    let chd = Chd::from_source(mixed_mode_image(true)).unwrap();
    let raw = chd.raw_reader();
    let mut header = [0u8; 16];
    gameid_core::ReadAt::read_exact_at(&raw, (8 + 16) * 2352, &mut header).unwrap();
    assert_eq!(&header[..12], &CD_SYNC_PATTERN);
    assert_eq!(header[15], 2);
}

#[test]
fn container_file_on_disk() {
    init_logger();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&mixed_mode_image(true)).unwrap();
    file.flush().unwrap();

    let chd = Chd::open_with_options(file.path(), ChdOptions::default().hunk_cache_size(2)).unwrap();
    let volume = IsoImage::from_chd(&chd).unwrap();
    assert_eq!(volume.volume_id(), "MIXEDVOL");
    assert!(chd.verify_raw_sha1().unwrap());
}
