//! EXIF orientation lookup.
//!
//! Only tag 274 (`Orientation`) is read. Values outside 1–8 are treated as
//! absent, as are files with no EXIF block or a malformed one: a bad tag
//! should never make an otherwise readable image fail.

use exif::{In, Reader, Tag};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// Read the EXIF orientation code (1–8) from an image file.
pub fn read_orientation(path: &Path) -> Option<u8> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;
    orientation_from(&exif)
}

/// Same as [`read_orientation`], for in-memory bytes.
pub fn read_orientation_from_bytes(bytes: &[u8]) -> Option<u8> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    orientation_from(&exif)
}

fn orientation_from(exif: &exif::Exif) -> Option<u8> {
    let code = exif
        .get_field(Tag::Orientation, In::PRIMARY)?
        .value
        .get_uint(0)?;
    (1..=8).contains(&code).then_some(code as u8)
}
