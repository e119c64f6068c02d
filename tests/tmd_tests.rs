mod common;
use common::{TEST_KEY, encrypt, pattern};

use std::io::Cursor;

use ctrkit::Error;
use ctrkit::formats::tmd::{
    BODY_SIZE, CONTENT_CHUNK_SIZE, ContentType, MAX_CONTENTS, SignatureType, TitleMetadata,
};
use ctrkit::pipeline::{CtrParams, QuickDecryptor};

const TITLE_ID: u64 = 0x0004_0000_0016_4800;

struct Chunk {
    id: u32,
    index: u16,
    flags: u16,
    size: u64,
}

/// Build a TMD signed with `sig_type`, returning the bytes and the body offset.
fn build_tmd(sig_type: u32, sig_size: usize, chunks: &[Chunk]) -> (Vec<u8>, usize) {
    let body = (4 + sig_size).div_ceil(0x40) * 0x40;
    let mut data = vec![0u8; body + BODY_SIZE + chunks.len() * CONTENT_CHUNK_SIZE];
    data[..4].copy_from_slice(&sig_type.to_be_bytes());
    data[4..4 + sig_size].fill(0xAA);

    let b = &mut data[body..];
    b[..4].copy_from_slice(b"Root");
    b[0x44..0x4C].copy_from_slice(&0x0000_0002_0000_0000u64.to_be_bytes());
    b[0x4C..0x54].copy_from_slice(&TITLE_ID.to_be_bytes());
    b[0x54..0x58].copy_from_slice(&0x40u32.to_be_bytes());
    b[0x9C..0x9E].copy_from_slice(&0x0410u16.to_be_bytes());
    b[0x9E..0xA0].copy_from_slice(&(chunks.len() as u16).to_be_bytes());
    b[0xC4..0xC6].copy_from_slice(&0u16.to_be_bytes());
    b[0xC6..0xC8].copy_from_slice(&(chunks.len() as u16).to_be_bytes());

    for (i, c) in chunks.iter().enumerate() {
        let o = body + BODY_SIZE + i * CONTENT_CHUNK_SIZE;
        data[o..o + 4].copy_from_slice(&c.id.to_be_bytes());
        data[o + 4..o + 6].copy_from_slice(&c.index.to_be_bytes());
        data[o + 6..o + 8].copy_from_slice(&c.flags.to_be_bytes());
        data[o + 8..o + 16].copy_from_slice(&c.size.to_be_bytes());
        data[o + 16..o + 48].fill(i as u8);
    }
    (data, body)
}

fn three_chunks() -> Vec<Chunk> {
    vec![
        Chunk {
            id: 0x0000_0000,
            index: 0,
            flags: ContentType::ENCRYPTED,
            size: 0x0123_4000,
        },
        Chunk {
            id: 0x0000_0001,
            index: 1,
            flags: ContentType::ENCRYPTED | ContentType::OPTIONAL,
            size: 0x8000,
        },
        Chunk {
            id: 0x0000_0005,
            index: 2,
            flags: ContentType::SHARED,
            size: 0x40,
        },
    ]
}

#[test]
fn parses_body_and_chunks() {
    let (data, _) = build_tmd(0x10004, 0x100, &three_chunks());
    let tmd = TitleMetadata::load(&data, 0).unwrap();

    assert_eq!(tmd.signature_type(), SignatureType::Rsa2048Sha256);
    assert_eq!(tmd.signature(), &[0xAAu8; 0x100][..]);
    assert_eq!(tmd.issuer(), "Root");
    assert_eq!(tmd.title_id(), TITLE_ID);
    assert_eq!(tmd.title_type(), 0x40);
    assert_eq!(tmd.title_version(), 0x0410);
    assert_eq!(tmd.system_version(), 0x0000_0002_0000_0000);
    assert_eq!(tmd.content_count(), 3);
    assert_eq!(tmd.content_infos()[0].command_count, 3);

    assert_eq!(tmd.boot_content_id().unwrap(), 0);
    assert_eq!(tmd.manual_content_id().unwrap(), 1);
    assert_eq!(tmd.dlp_content_id().unwrap(), 5);
    assert_eq!(tmd.content_size_by_index(0).unwrap(), 0x0123_4000);

    let t = tmd.content_type_by_index(1).unwrap();
    assert!(t.is_encrypted() && t.is_optional() && !t.is_shared());
    assert!(tmd.content_type_by_index(2).unwrap().is_shared());
    assert_eq!(tmd.content_chunk(2).unwrap().hash, [2u8; 0x20]);
}

#[test]
fn body_offset_follows_signature_size() {
    for (ty, size) in [
        (0x10000, 0x200),
        (0x10001, 0x100),
        (0x10002, 0x3C),
        (0x10003, 0x200),
        (0x10004, 0x100),
        (0x10005, 0x3C),
    ] {
        let (data, body) = build_tmd(ty, size, &three_chunks());
        let tmd = TitleMetadata::load(&data, 0).unwrap();
        assert_eq!(tmd.signature().len(), size);
        assert_eq!(tmd.signature_type().signature_size(), size);
        assert_eq!(tmd.title_id(), TITLE_ID, "signature type {ty:#x}, body {body:#x}");
    }
}

#[test]
fn loads_at_offset() {
    let (tmd_bytes, _) = build_tmd(0x10004, 0x100, &three_chunks());
    let mut data = vec![0xEE; 0x33];
    data.extend_from_slice(&tmd_bytes);
    let tmd = TitleMetadata::load(&data, 0x33).unwrap();
    assert_eq!(tmd.content_count(), 3);
}

#[test]
fn body_truncated_by_one_byte() {
    let (data, body) = build_tmd(0x10004, 0x100, &[]);
    let truncated = &data[..body + BODY_SIZE - 1];
    assert!(matches!(
        TitleMetadata::load(truncated, 0),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn chunks_truncated_by_one_byte() {
    let (data, _) = build_tmd(0x10004, 0x100, &three_chunks());
    assert!(matches!(
        TitleMetadata::load(&data[..data.len() - 1], 0),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn unknown_signature_type_is_rejected() {
    let (mut data, _) = build_tmd(0x10004, 0x100, &three_chunks());
    data[..4].copy_from_slice(&0x10006u32.to_be_bytes());
    assert!(matches!(
        TitleMetadata::load(&data, 0),
        Err(Error::UnsupportedSignature(0x10006))
    ));
}

#[test]
fn content_count_above_limit_is_rejected() {
    let (mut data, body) = build_tmd(0x10005, 0x3C, &[]);
    let count = (MAX_CONTENTS + 1) as u16;
    data[body + 0x9E..body + 0xA0].copy_from_slice(&count.to_be_bytes());
    data.resize(body + BODY_SIZE + (MAX_CONTENTS + 1) * CONTENT_CHUNK_SIZE, 0);
    assert!(matches!(TitleMetadata::load(&data, 0), Err(Error::Parse(_))));
}

#[test]
fn index_lookups_are_bounded() {
    let chunks = three_chunks();
    let (data, _) = build_tmd(0x10004, 0x100, &chunks[..1]);
    let tmd = TitleMetadata::load(&data, 0).unwrap();

    assert!(tmd.content_id_by_index(0).is_ok());
    assert!(matches!(
        tmd.content_id_by_index(1),
        Err(Error::IndexOutOfRange { index: 1, count: 1 })
    ));
    assert!(tmd.manual_content_id().is_err());
    assert!(tmd.dlp_content_id().is_err());
    assert!(tmd.content_size_by_index(64).is_err());
    assert!(tmd.content_ctr_by_index(usize::MAX).is_err());
}

#[test]
fn content_ctr_comes_from_content_index() {
    let mut chunks = three_chunks();
    chunks[2].index = 0x0102;
    let (data, _) = build_tmd(0x10004, 0x100, &chunks);
    let tmd = TitleMetadata::load(&data, 0).unwrap();

    let mut expected = [0u8; 16];
    expected[0] = 0x01;
    expected[1] = 0x02;
    assert_eq!(tmd.content_ctr_by_index(2).unwrap(), expected);
    assert_eq!(tmd.content_ctr_by_index(0).unwrap(), [0u8; 16]);
}

#[test]
fn content_ctr_drives_pipeline_decryption() {
    let mut chunks = three_chunks();
    chunks[1].size = 0x5000;
    let (data, _) = build_tmd(0x10004, 0x100, &chunks);
    let tmd = TitleMetadata::load(&data, 0).unwrap();
    tmd.log_summary();

    let size = tmd.content_size_by_index(1).unwrap();
    let ctr = tmd.content_ctr_by_index(1).unwrap();
    let plain = pattern(size as usize);
    let cipher = encrypt(&plain, &ctr);

    let qd = QuickDecryptor::new();
    qd.reset(size);
    let mut out = Vec::new();
    qd.decrypt_and_write_file(
        &mut Cursor::new(&cipher),
        size,
        &mut out,
        |_, _| {},
        Some(CtrParams::new(TEST_KEY, ctr)),
    )
    .unwrap();
    assert_eq!(out, plain);
}
