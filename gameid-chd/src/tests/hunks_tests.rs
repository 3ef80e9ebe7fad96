use super::*;
use crate::test_util::{ChdBuilder, HunkSpec, deflate};

fn directory(image: Vec<u8>) -> HunkDirectory<Vec<u8>> {
    directory_with(image, &ChdOptions::default())
}

fn directory_with(image: Vec<u8>, options: &ChdOptions) -> HunkDirectory<Vec<u8>> {
    let header = Header::parse(&image).unwrap();
    HunkDirectory::build(image, &header, options).unwrap()
}

fn pattern(hunk_bytes: usize, seed: u8) -> Vec<u8> {
    (0..hunk_bytes).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

fn zlib_hunk(data: Vec<u8>) -> HunkSpec {
    HunkSpec::Compressed {
        slot: 0,
        payload: deflate(&data).unwrap(),
        data,
    }
}

#[test]
fn v5_uncompressed_map() {
    let a = pattern(4096, 1);
    let b = pattern(4096, 2);
    let dir = directory(
        ChdBuilder::v5(4096, 2048)
            .stored(a.clone())
            .hunk(HunkSpec::Zero)
            .stored(b.clone())
            .build(),
    );
    assert_eq!(dir.num_hunks(), 3);
    assert_eq!(dir.hunk_bytes(), 4096);
    assert_eq!(dir.entries()[1].kind, HunkKind::Zero);
    assert_eq!(&dir.read_hunk(0).unwrap()[..], &a[..]);
    assert_eq!(&dir.read_hunk(1).unwrap()[..], &[0u8; 4096][..]);
    assert_eq!(&dir.read_hunk(2).unwrap()[..], &b[..]);
}

#[test]
fn v5_compressed_map_with_every_entry_kind() {
    let a = pattern(4096, 7);
    let b = pattern(4096, 9);
    let image = ChdBuilder::v5(4096, 2048)
        .compressor(0, CodecTag::ZLIB)
        .hunk(zlib_hunk(a.clone()))
        .stored(b.clone())
        .hunk(HunkSpec::SelfRef(0))
        .hunk(HunkSpec::Parent(4))
        .build();
    let dir = directory(image);

    let kinds: Vec<HunkKind> = dir.entries().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            HunkKind::Compressed { slot: 0 },
            HunkKind::Uncompressed,
            HunkKind::SelfRef,
            HunkKind::ParentRef,
        ]
    );
    assert_eq!(&dir.read_hunk(0).unwrap()[..], &a[..]);
    assert_eq!(&dir.read_hunk(1).unwrap()[..], &b[..]);
    assert_eq!(&dir.read_hunk(2).unwrap()[..], &a[..]);
    assert!(matches!(
        dir.read_hunk(3),
        Err(ChdError::ParentRequired { index: 3 })
    ));
}

#[test]
fn v5_map_run_lengths() {
    // A run of 40 takes the long repeat code, a run of 5 the short one.
    let data = pattern(2048, 3);
    let mut builder = ChdBuilder::v5(2048, 2048).compressor(0, CodecTag::ZLIB);
    for _ in 0..40 {
        builder = builder.hunk(zlib_hunk(data.clone()));
    }
    for _ in 0..5 {
        builder = builder.stored(pattern(2048, 4));
    }
    let dir = directory(builder.build());
    assert_eq!(dir.num_hunks(), 45);
    assert!(dir.entries()[..40]
        .iter()
        .all(|e| e.kind == HunkKind::Compressed { slot: 0 }));
    assert!(dir.entries()[40..]
        .iter()
        .all(|e| e.kind == HunkKind::Uncompressed));
    assert_eq!(&dir.read_hunk(39).unwrap()[..], &data[..]);
    assert_eq!(&dir.read_hunk(44).unwrap()[..], &pattern(2048, 4)[..]);
}

#[test]
fn v5_map_checksum_mismatch() {
    let mut image = ChdBuilder::v5(2048, 2048)
        .compressor(0, CodecTag::ZLIB)
        .stored(pattern(2048, 1))
        .build();
    let header = Header::parse(&image).unwrap();
    let crc_at = header.map_offset as usize + 10;
    image[crc_at] ^= 0xFF;
    let err = HunkDirectory::build(image, &header, &ChdOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, ChdError::InvalidMap(_)));
}

#[test]
fn corrupt_hunk_is_detected() {
    let mut image = ChdBuilder::v5(2048, 2048)
        .compressor(0, CodecTag::ZLIB)
        .stored(pattern(2048, 1))
        .build();
    let header = Header::parse(&image).unwrap();
    let dir = directory(image.clone());
    let at = dir.entries()[0].offset as usize;
    image[at] ^= 0xFF;

    let dir = HunkDirectory::build(image.clone(), &header, &ChdOptions::default()).unwrap();
    assert!(matches!(
        dir.read_hunk(0),
        Err(ChdError::CorruptHunk { index: 0, .. })
    ));

    let unchecked = directory_with(image, &ChdOptions::default().verify_hunk_crc(false));
    assert_eq!(unchecked.read_hunk(0).unwrap().len(), 2048);
}

#[test]
fn unregistered_codec_fails_per_hunk() {
    let image = ChdBuilder::v5(2048, 2048)
        .compressor(0, CodecTag::from_bytes(*b"zzzz"))
        .hunk(HunkSpec::Compressed {
            slot: 0,
            payload: vec![1, 2, 3],
            data: vec![0; 2048],
        })
        .stored(pattern(2048, 5))
        .build();
    let dir = directory(image);
    let err = dir.read_hunk(0).unwrap_err();
    assert!(err.to_string().contains("zzzz"));
    // The rest of the container is unaffected.
    assert_eq!(&dir.read_hunk(1).unwrap()[..], &pattern(2048, 5)[..]);
}

#[test]
fn out_of_range_index() {
    let dir = directory(ChdBuilder::v5(2048, 2048).stored(vec![0; 2048]).build());
    assert!(matches!(
        dir.read_hunk(1),
        Err(ChdError::HunkOutOfRange { index: 1, count: 1 })
    ));
    assert!(dir.read_hunk(u64::MAX).is_err());
}

#[test]
fn repeated_reads_are_identical() {
    let image = ChdBuilder::v5(4096, 2048)
        .compressor(0, CodecTag::ZLIB)
        .hunk(zlib_hunk(pattern(4096, 11)))
        .build();
    for cache in [0, 4] {
        let dir = directory_with(image.clone(), &ChdOptions::default().hunk_cache_size(cache));
        let first = dir.read_hunk(0).unwrap();
        let second = dir.read_hunk(0).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn cache_returns_shared_buffer() {
    let dir = directory(ChdBuilder::v5(2048, 2048).stored(pattern(2048, 1)).build());
    let first = dir.read_hunk(0).unwrap();
    let second = dir.read_hunk(0).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn v4_map_entry_kinds() {
    let a = pattern(4096, 21);
    let b = pattern(4096, 22);
    let image = ChdBuilder::new(4, 4096, 2448)
        .hunk(zlib_hunk(a.clone()))
        .stored(b.clone())
        .hunk(HunkSpec::Mini(0x0102_0304_0506_0708))
        .hunk(HunkSpec::SelfRef(1))
        .hunk(HunkSpec::Parent(0))
        .build();
    let dir = directory(image);

    assert_eq!(&dir.read_hunk(0).unwrap()[..], &a[..]);
    assert_eq!(&dir.read_hunk(1).unwrap()[..], &b[..]);
    let mini = dir.read_hunk(2).unwrap();
    assert_eq!(&mini[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&mini[4088..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&dir.read_hunk(3).unwrap()[..], &b[..]);
    assert!(matches!(
        dir.read_hunk(4),
        Err(ChdError::ParentRequired { index: 4 })
    ));
}

#[test]
fn v3_crc32_is_checked() {
    let mut image = ChdBuilder::new(3, 4096, 2448).stored(pattern(4096, 1)).build();
    let header = Header::parse(&image).unwrap();
    let last = image.len() - 1;
    image[last] ^= 0x55;
    let dir = HunkDirectory::build(image, &header, &ChdOptions::default()).unwrap();
    assert!(matches!(
        dir.read_hunk(0),
        Err(ChdError::CorruptHunk { index: 0, .. })
    ));
}

#[test]
fn forward_self_reference_is_rejected() {
    let image = ChdBuilder::new(4, 4096, 2448)
        .hunk(HunkSpec::SelfRef(1))
        .stored(vec![0; 4096])
        .build();
    let header = Header::parse(&image).unwrap();
    assert!(matches!(
        HunkDirectory::build(image, &header, &ChdOptions::default()),
        Err(ChdError::InvalidMap(_))
    ));
}

#[test]
fn long_self_reference_chain_collapses() {
    const CHAIN: u32 = 200_000;
    let data = pattern(64, 9);
    let mut builder = ChdBuilder::new(4, 64, 64).stored(data.clone());
    for target in 0..CHAIN {
        builder = builder.hunk(HunkSpec::SelfRef(target));
    }
    let dir = directory_with(builder.build(), &ChdOptions::default().hunk_cache_size(0));

    assert!(dir.entries()[1..]
        .iter()
        .all(|e| e.kind == HunkKind::SelfRef && e.offset == 0));
    assert_eq!(&dir.read_hunk(u64::from(CHAIN)).unwrap()[..], &data[..]);
}

/// CD codec that writes the frame count it was handed into the first bytes.
struct FrameCount;

impl crate::codec::Codec for FrameCount {
    fn decompress(&mut self, _src: &[u8], dst: &mut [u8]) -> Result<usize> {
        Ok(dst.len())
    }

    fn as_cd(&mut self) -> Option<&mut dyn crate::codec::CdCodec> {
        Some(self)
    }
}

impl crate::codec::CdCodec for FrameCount {
    fn decompress_cd(
        &mut self,
        _src: &[u8],
        dst: &mut [u8],
        _hunk_bytes: u32,
        frames: u32,
    ) -> Result<usize> {
        dst.fill(0);
        dst[..4].copy_from_slice(&frames.to_be_bytes());
        Ok(dst.len())
    }
}

#[test]
fn cd_codecs_receive_units_per_hunk() {
    // 2352-byte units carry no subchannel, so a hunk holds more of them
    // than it would hold 2448-byte frames.
    let tag = CodecTag::from_bytes(*b"tfrm");
    crate::codec::register_codec(tag, || Box::new(FrameCount));

    let hunk_bytes = 2352 * 8;
    let mut expected = vec![0u8; hunk_bytes];
    expected[..4].copy_from_slice(&8u32.to_be_bytes());
    let image = ChdBuilder::v5(hunk_bytes as u32, 2352)
        .compressor(0, tag)
        .hunk(HunkSpec::Compressed {
            slot: 0,
            payload: vec![0xAA; 16],
            data: expected.clone(),
        })
        .build();
    let dir = directory(image);
    assert_eq!(&dir.read_hunk(0).unwrap()[..], &expected[..]);
}

#[test]
fn unknown_v34_entry_type_fails_build() {
    let mut image = ChdBuilder::new(4, 4096, 2448).stored(vec![0; 4096]).build();
    let header = Header::parse(&image).unwrap();
    image[header.map_offset as usize + 15] = 0x0F;
    assert!(HunkDirectory::build(image, &header, &ChdOptions::default()).is_err());
}

#[test]
fn concurrent_reads_share_the_directory() {
    let image = ChdBuilder::v5(4096, 2048)
        .compressor(0, CodecTag::ZLIB)
        .hunk(zlib_hunk(pattern(4096, 1)))
        .hunk(zlib_hunk(pattern(4096, 2)))
        .build();
    let dir = directory_with(image, &ChdOptions::default().hunk_cache_size(1));
    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let dir = &dir;
            scope.spawn(move || {
                for i in 0..50u64 {
                    let index = (i + t) % 2;
                    let hunk = dir.read_hunk(index).unwrap();
                    assert_eq!(&hunk[..], &pattern(4096, index as u8 + 1)[..]);
                }
            });
        }
    });
}
