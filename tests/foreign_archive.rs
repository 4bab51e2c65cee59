//! Archives produced by other writers
//!
//! Hand-built ZIP files with layouts this crate would never write itself:
//! extra fields, unaligned entries and trailing comments.

use buddyzip::{ZipArchive, ZipError};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;

struct Member {
    name: &'static str,
    data: &'static [u8],
    extra: Vec<u8>,
    /// File comment in the directory record.
    comment: &'static [u8],
}

/// Lay members out back to back (stored), then the directory and trailer.
fn build_zip(members: &[Member], comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut positions = Vec::new();
    for m in members {
        positions.push(out.len() as u32);
        out.write_u32::<LittleEndian>(0x04034b50).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0x21).unwrap();
        out.write_u32::<LittleEndian>(crc32fast::hash(m.data)).unwrap();
        out.write_u32::<LittleEndian>(m.data.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(m.data.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(m.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(m.extra.len() as u16).unwrap();
        out.extend_from_slice(m.name.as_bytes());
        out.extend_from_slice(&m.extra);
        out.extend_from_slice(m.data);
    }

    let cd_offset = out.len() as u32;
    for (m, &position) in members.iter().zip(&positions) {
        out.write_u32::<LittleEndian>(0x02014b50).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0x21).unwrap();
        out.write_u32::<LittleEndian>(crc32fast::hash(m.data)).unwrap();
        out.write_u32::<LittleEndian>(m.data.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(m.data.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(m.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(m.comment.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(position).unwrap();
        out.extend_from_slice(m.name.as_bytes());
        out.extend_from_slice(m.comment);
    }
    let cd_size = out.len() as u32 - cd_offset;

    out.write_u32::<LittleEndian>(0x06054b50).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(members.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(members.len() as u16).unwrap();
    out.write_u32::<LittleEndian>(cd_size).unwrap();
    out.write_u32::<LittleEndian>(cd_offset).unwrap();
    out.write_u16::<LittleEndian>(comment.len() as u16).unwrap();
    out.extend_from_slice(comment);
    out
}

fn extra_length_at(bytes: &[u8], header: u64) -> u16 {
    let at = header as usize + 28;
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn two_members() -> Vec<Member> {
    vec![
        Member {
            name: "a.txt",
            data: b"0123456789",
            extra: vec![0xCA, 0xFE, 0x00, 0x00],
            comment: b"",
        },
        Member {
            name: "b.txt",
            data: b"abcdefghij",
            extra: Vec::new(),
            comment: b"",
        },
    ]
}

#[test]
fn test_read_only_open_leaves_foreign_layout_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.zip");
    let original = build_zip(&two_members(), b"");
    fs::write(&path, &original).unwrap();

    let mut archive = ZipArchive::open_read_only(&path).unwrap();
    assert_eq!(archive.len(), 2);
    assert_eq!(archive.get("b.txt").unwrap().header_position(), 49);
    // The directory does not know about the local extra field.
    let a = archive.get("a.txt").cloned().unwrap();
    assert!(archive.extract(&a).is_err());
    drop(archive);

    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn test_open_normalizes_and_relocates_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.zip");
    fs::write(&path, build_zip(&two_members(), b"")).unwrap();

    let mut archive = ZipArchive::open(&path).unwrap();
    let a = archive.get("a.txt").cloned().unwrap();
    let b = archive.get("b.txt").cloned().unwrap();

    // a.txt loses its extra field in place; b.txt moves to an aligned block.
    assert_eq!(a.header_position(), 0);
    assert_eq!(b.header_position(), 64);
    assert_eq!(archive.directory_start(), 64 + 45);
    assert_eq!(archive.extract(&a).unwrap(), b"0123456789");
    assert_eq!(archive.extract(&b).unwrap(), b"abcdefghij");
    archive.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(extra_length_at(&bytes, 0), 0);
    assert_eq!(extra_length_at(&bytes, 64), 0);
    assert_eq!(bytes.len() as u64, 109 + 2 * (46 + 5) + 22);

    ZipArchive::open(&path).unwrap().close().unwrap();
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_trailing_comment_is_dropped_on_repair() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commented.zip");
    let members = vec![Member {
        name: "only.txt",
        data: b"payload",
        extra: Vec::new(),
        comment: b"",
    }];
    let original = build_zip(&members, b"written elsewhere");
    fs::write(&path, &original).unwrap();

    let mut archive = ZipArchive::open(&path).unwrap();
    assert_eq!(archive.extract_named("only.txt").unwrap(), b"payload");
    archive.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), original.len() - b"written elsewhere".len());
    assert_eq!(&bytes[bytes.len() - 2..], b"\x00\x00");
}

#[test]
fn test_payload_past_end_of_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.zip");
    let mut bytes = build_zip(&two_members(), b"");
    // Claim a much larger payload for b.txt in its directory record.
    let cd_offset = u32::from_le_bytes(bytes[bytes.len() - 6..bytes.len() - 2].try_into().unwrap());
    let b_record = cd_offset as usize + 46 + 5;
    bytes[b_record + 20..b_record + 24].copy_from_slice(&10_000u32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let err = ZipArchive::open(&path).unwrap_err();
    assert!(matches!(err, ZipError::Format(_)));
}

#[test]
fn test_mismatched_local_name_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("renamed.zip");
    let mut bytes = build_zip(
        &[Member {
            name: "right",
            data: b"contents",
            extra: Vec::new(),
            comment: b"",
        }],
        b"",
    );
    bytes[30..35].copy_from_slice(b"wrong");
    fs::write(&path, &bytes).unwrap();

    let mut archive = ZipArchive::open(&path).unwrap();
    assert_eq!(archive.extract_named("right").unwrap(), b"contents");
    archive.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[30..35], b"right");
}

#[test]
fn test_directory_end_with_commented_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comments.zip");
    let members = vec![Member {
        name: "note.txt",
        data: b"note",
        extra: Vec::new(),
        comment: b"a comment on the record",
    }];
    let original = build_zip(&members, b"");
    fs::write(&path, &original).unwrap();
    let trailer = original.len() as u64 - 22;

    let mut archive = ZipArchive::open_read_only(&path).unwrap();
    assert_eq!(archive.directory_start(), 30 + 8 + 4);
    assert_eq!(archive.directory_end(), trailer);
    assert_eq!(archive.extract_named("note.txt").unwrap(), b"note");
    drop(archive);

    // Opening writable drops the record comment.
    let archive = ZipArchive::open(&path).unwrap();
    assert_eq!(archive.directory_end(), archive.directory_start() + 46 + 8);
    archive.close().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), (30 + 8 + 4) + (46 + 8) + 22);
}
