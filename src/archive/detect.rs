//! Content signatures for archive containers.
//!
//! Each predicate reads from the stream's current position and may leave it
//! anywhere; the caller rewinds between probes.

use std::io::{self, SeekFrom};

use crate::stream::{ReadSeek, read_prefix};

/// Size of a tar header block.
pub(crate) const TAR_BLOCK: usize = 512;

const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

/// Local file header, empty archive or spanned archive marker.
pub(crate) fn is_zip(stream: &mut dyn ReadSeek) -> io::Result<bool> {
    let head = read_prefix(stream, 4)?;
    Ok(ZIP_SIGNATURES.iter().any(|sig| head == sig.as_slice()))
}

/// gzip member header.
pub(crate) fn is_gzip(stream: &mut dyn ReadSeek) -> io::Result<bool> {
    let head = read_prefix(stream, 2)?;
    Ok(head == GZIP_MAGIC)
}

/// First block is a tar header with a valid checksum.
pub(crate) fn is_tar(stream: &mut dyn ReadSeek) -> io::Result<bool> {
    stream.seek(SeekFrom::Start(0))?;
    let block = read_prefix(stream, TAR_BLOCK)?;
    Ok(is_tar_header(&block))
}

/// Validate a 512-byte tar header block.
///
/// The all-zero end-of-archive block is rejected so zero-filled input never
/// passes as an empty tar.
pub(crate) fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK || block.iter().all(|&b| b == 0) {
        return false;
    }
    let Some(stored) = parse_octal(&block[CHECKSUM_FIELD]) else {
        return false;
    };

    let computed: u64 = block[..TAR_BLOCK]
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if CHECKSUM_FIELD.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum();
    computed == stored
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: Vec<u8> = field
        .iter()
        .copied()
        .skip_while(|&b| b == b' ')
        .take_while(|&b| b != 0 && b != b' ')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, &b| match b {
        b'0'..=b'7' => Some(acc * 8 + u64::from(b - b'0')),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tar_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o644);
        builder.append_data(&mut header, "a.txt", &b"abc"[..]).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn zip_signatures() {
        assert!(is_zip(&mut Cursor::new(b"PK\x03\x04rest".to_vec())).unwrap());
        assert!(is_zip(&mut Cursor::new(b"PK\x05\x06".to_vec())).unwrap());
        assert!(!is_zip(&mut Cursor::new(b"PK".to_vec())).unwrap());
        assert!(!is_zip(&mut Cursor::new(b"MZ\x90\x00".to_vec())).unwrap());
    }

    #[test]
    fn gzip_magic() {
        assert!(is_gzip(&mut Cursor::new(vec![0x1f, 0x8b, 0x08])).unwrap());
        assert!(!is_gzip(&mut Cursor::new(vec![0x1f])).unwrap());
    }

    #[test]
    fn tar_header_checksum() {
        let data = tar_bytes();
        assert!(is_tar(&mut Cursor::new(data.clone())).unwrap());

        let mut corrupt = data;
        corrupt[0] ^= 0x55;
        assert!(!is_tar(&mut Cursor::new(corrupt)).unwrap());
    }

    #[test]
    fn zero_block_is_not_tar() {
        assert!(!is_tar(&mut Cursor::new(vec![0u8; 4096])).unwrap());
        assert!(!is_tar(&mut Cursor::new(vec![0u8; 10])).unwrap());
    }

    #[test]
    fn octal_field_parsing() {
        assert_eq!(parse_octal(b"0001234\0"), Some(0o1234));
        assert_eq!(parse_octal(b"  17 \0\0\0"), Some(0o17));
        assert_eq!(parse_octal(b"\0\0\0\0\0\0\0\0"), None);
        assert_eq!(parse_octal(b"0009\0"), None);
    }
}
