use super::*;
use crate::options::ChdOptions;
use crate::test_util::{ChdBuilder, HunkSpec};
use gameid_core::cd::{CD_SYNC_PATTERN, PVD_SIGNATURE};

const UNIT: usize = 2448;

/// Raw sector with sync and header; user data filled with `fill`.
fn raw_sector(mode: u8, fill: u8) -> Vec<u8> {
    let mut sector = vec![0xEE; 2352];
    sector[..12].copy_from_slice(&CD_SYNC_PATTERN);
    sector[12..15].copy_from_slice(&[0x00, 0x02, 0x00]);
    sector[15] = mode;
    let start = if mode == 2 { 24 } else { 16 };
    sector[start..start + 2048].fill(fill);
    sector
}

/// A raw sector followed by subchannel bytes.
fn frame(sector: &[u8]) -> Vec<u8> {
    let mut frame = sector.to_vec();
    frame.resize(UNIT, 0x5A);
    frame
}

/// Frames whose every byte records the sector index.
fn numbered_hunk(first_sector: u8, sectors: usize) -> Vec<u8> {
    (0..sectors)
        .flat_map(|i| frame(&vec![first_sector + i as u8; 2352]))
        .collect()
}

/// 2048-byte-unit container of zeroed hunks, optionally with a volume
/// descriptor signature at `pvd_sector`.
fn iso_image(sectors_per_hunk: usize, hunks: usize, pvd_sector: Option<usize>) -> Vec<u8> {
    let mut data = vec![0u8; sectors_per_hunk * hunks * 2048];
    if let Some(sector) = pvd_sector {
        data[sector * 2048..sector * 2048 + 6].copy_from_slice(&PVD_SIGNATURE);
    }
    let mut builder = ChdBuilder::v5((sectors_per_hunk * 2048) as u32, 2048);
    for hunk in data.chunks(sectors_per_hunk * 2048) {
        builder = builder.stored(hunk.to_vec());
    }
    builder.build()
}

fn open(image: Vec<u8>) -> Chd<Vec<u8>> {
    Chd::from_source(image).unwrap()
}

#[test]
fn raw_offsets_resolve_to_hunk_and_sector() {
    let chd = open(
        ChdBuilder::v5((UNIT * 8) as u32, UNIT as u32)
            .stored(numbered_hunk(0, 8))
            .stored(numbered_hunk(8, 8))
            .build(),
    );
    let reader = chd.raw_reader();
    assert_eq!(
        reader.locate(0),
        SectorLocation {
            hunk: 0,
            sector_in_hunk: 0,
            offset_in_sector: 0
        }
    );
    assert_eq!(
        reader.locate(2352 * 8),
        SectorLocation {
            hunk: 1,
            sector_in_hunk: 0,
            offset_in_sector: 0
        }
    );
    let frame_boundary = reader.locate((UNIT * 8) as u64);
    assert_eq!(frame_boundary.hunk, 1);
    assert_eq!(frame_boundary.sector_in_hunk, 0);
    assert_eq!(frame_boundary.offset_in_sector, 768);
}

#[test]
fn raw_view_skips_subchannel() {
    let chd = open(
        ChdBuilder::v5((UNIT * 8) as u32, UNIT as u32)
            .stored(numbered_hunk(0, 8))
            .stored(numbered_hunk(8, 8))
            .build(),
    );
    let reader = chd.raw_reader();
    assert!(reader.is_raw());
    assert_eq!(reader.len(), 16 * 2352);

    // Straddles sectors 7 and 8, which are in different hunks.
    let mut buf = vec![0u8; 2352];
    let n = reader.read_sectors_at(2352 * 8 - 4, &mut buf).unwrap();
    assert_eq!(n, 2352);
    assert_eq!(&buf[..4], &[7; 4]);
    assert!(buf[4..].iter().all(|&b| b == 8));

    let mut one = [0u8; 1];
    reader.read_sectors_at(2352 * 9 + 10, &mut one).unwrap();
    assert_eq!(one[0], 9);
}

#[test]
fn logical_view_strips_sector_headers() {
    let hunk: Vec<u8> = [
        frame(&raw_sector(1, 0xA1)),
        frame(&raw_sector(2, 0xB2)),
        frame(&vec![0xC3; 2352]),
    ]
    .concat();
    let chd = open(
        ChdBuilder::v5((UNIT * 3) as u32, UNIT as u32)
            .stored(hunk)
            .build(),
    );
    let reader = chd.logical_reader();
    assert!(!reader.is_raw());
    assert_eq!(reader.sector_size(), 2048);
    assert_eq!(reader.len(), 3 * 2048);

    let mut buf = vec![0u8; 3 * 2048];
    assert_eq!(reader.read_sectors_at(0, &mut buf).unwrap(), buf.len());
    assert!(buf[..2048].iter().all(|&b| b == 0xA1));
    assert!(buf[2048..4096].iter().all(|&b| b == 0xB2));
    assert!(buf[4096..].iter().all(|&b| b == 0xC3));

    let mut tail = [0u8; 8];
    reader.read_sectors_at(2048 + 2040, &mut tail).unwrap();
    assert_eq!(tail, [0xB2; 8]);
}

#[test]
fn every_offset_reads_to_the_end() {
    let builder = ChdBuilder::v5(8192, 2048)
        .stored((0..8192).map(|i| (i % 251) as u8).collect())
        .stored((0..8192).map(|i| (i % 241) as u8).collect());
    let expected = builder.logical_data();
    let chd = open(builder.build());
    let reader = chd.logical_reader();
    let total = expected.len() as u64;
    assert_eq!(reader.len(), total);

    for offset in [0u64, 1, 2047, 2048, 6000, 8191, 8192, 12000, 16383] {
        let mut buf = vec![0u8; 4096];
        let n = reader.read_sectors_at(offset, &mut buf).unwrap();
        let want = 4096.min(total - offset) as usize;
        assert_eq!(n, want, "offset {}", offset);
        assert_eq!(&buf[..n], &expected[offset as usize..offset as usize + n]);
    }
}

#[test]
fn reads_at_or_past_the_end_return_nothing() {
    let chd = open(iso_image(4, 1, None));
    let reader = chd.logical_reader();
    let mut buf = [0u8; 16];
    assert_eq!(reader.read_sectors_at(reader.len(), &mut buf).unwrap(), 0);
    assert_eq!(reader.read_sectors_at(reader.len() + 100, &mut buf).unwrap(), 0);
    assert!(reader.read_exact_at(reader.len() - 8, &mut buf).is_err());
}

#[test]
fn later_hunk_failure_gives_short_read() {
    let builder = ChdBuilder::v5(2048, 2048)
        .compressor(0, crate::CodecTag::ZLIB)
        .stored(vec![1; 2048])
        .stored(vec![2; 2048]);
    let mut image = builder.build();
    let second = open(image.clone()).hunks().entries()[1].offset as usize;
    image[second] ^= 0xFF;
    let chd = open(image);
    let reader = chd.logical_reader();

    let mut buf = vec![0u8; 4096];
    assert_eq!(reader.read_sectors_at(0, &mut buf).unwrap(), 2048);
    assert!(buf[..2048].iter().all(|&b| b == 1));

    // Failing on the first hunk of a call is an error.
    assert!(reader.read_sectors_at(2048, &mut buf).is_err());
}

#[test]
fn pvd_scan_finds_data_track() {
    let chd = open(iso_image(4, 8, Some(20)));
    assert_eq!(chd.data_track_start(), 4);
    assert_eq!(chd.data_track_reader().data_track_start(), 4);
    assert_eq!(chd.first_data_track_offset(), 4 * 2352);
}

#[test]
fn pvd_before_sector_sixteen_clamps_to_zero() {
    let chd = open(iso_image(4, 8, Some(10)));
    assert_eq!(chd.data_track_start(), 0);
}

#[test]
fn no_pvd_defaults_to_zero() {
    let chd = open(iso_image(4, 8, None));
    assert_eq!(chd.data_track_start(), 0);
}

#[test]
fn pvd_scan_is_bounded() {
    // 100 sectors at 1 sector per hunk: the signature at sector 120 is
    // beyond the scanned range.
    let chd = open(iso_image(1, 130, Some(120)));
    assert_eq!(chd.data_track_start(), 0);

    let wider = Chd::from_source_with_options(
        iso_image(1, 130, Some(120)),
        ChdOptions::default().pvd_search_sectors(200),
    )
    .unwrap();
    assert_eq!(wider.data_track_start(), 104);
}

#[test]
fn pvd_scan_can_be_disabled() {
    let chd = Chd::from_source_with_options(
        iso_image(4, 8, Some(20)),
        ChdOptions::default().pvd_search(false),
    )
    .unwrap();
    assert_eq!(chd.data_track_start(), 0);
}

#[test]
fn pvd_found_in_raw_mode2_sector() {
    let mut pvd = raw_sector(2, 0);
    pvd[24..30].copy_from_slice(&PVD_SIGNATURE);
    let mut hunks = Vec::new();
    for sector in 0..24u8 {
        if sector == 18 {
            hunks.extend(frame(&pvd));
        } else {
            hunks.extend(frame(&raw_sector(2, sector)));
        }
    }
    let mut builder = ChdBuilder::v5((UNIT * 4) as u32, UNIT as u32);
    for hunk in hunks.chunks(UNIT * 4) {
        builder = builder.stored(hunk.to_vec());
    }
    let chd = open(builder.build());
    assert_eq!(chd.data_track_start(), 2);

    let reader = chd.data_track_reader();
    let mut sig = [0u8; 6];
    reader.read_exact_at(16 * 2048, &mut sig).unwrap();
    assert_eq!(sig, PVD_SIGNATURE);
    let mut first = [0u8; 1];
    reader.read_exact_at(0, &mut first).unwrap();
    assert_eq!(first[0], 2);
}

#[test]
fn track_metadata_wins_over_scan() {
    let image = ChdBuilder::v5((UNIT * 4) as u32, UNIT as u32)
        .track(1, "AUDIO", 300, 0, "AUDIO")
        .track(2, "MODE1_RAW", 1000, 150, "VMODE1")
        .hunk(HunkSpec::Stored(vec![0; UNIT * 4]))
        .build();
    let chd = open(image);
    assert_eq!(chd.data_track_start(), 450);
    assert_eq!(chd.data_track_size(), 850 * 2048);
}

#[test]
fn data_track_at_frame_zero_falls_back_to_scan() {
    let mut builder = ChdBuilder::v5(4 * 2048, 2048).track(1, "MODE1", 32, 0, "MODE1");
    let mut data = vec![0u8; 32 * 2048];
    data[20 * 2048..20 * 2048 + 6].copy_from_slice(&PVD_SIGNATURE);
    for hunk in data.chunks(4 * 2048) {
        builder = builder.stored(hunk.to_vec());
    }
    let chd = open(builder.build());
    assert_eq!(chd.data_track_start(), 4);
    assert_eq!(chd.data_track_size(), 32 * 2048);
}

#[test]
fn data_track_size_without_tracks_is_view_length() {
    let chd = open(iso_image(4, 8, Some(20)));
    assert_eq!(chd.data_track_size(), (32 - 4) * 2048);
}

#[test]
fn readers_are_independent() {
    let chd = open(iso_image(4, 2, None));
    let raw = chd.raw_reader();
    let logical = chd.logical_reader();
    let copy = logical;
    assert_eq!(raw.mode(), SectorMode::Raw);
    assert_eq!(copy.mode(), SectorMode::Logical);
    assert_eq!(raw.len() / 2352, logical.len() / 2048);
    assert!(!copy.is_empty());
}
