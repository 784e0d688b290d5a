//! ISO9660 (ECMA-119) images.
//!
//! Volume descriptors start at sector 16. A Joliet supplementary descriptor
//! is preferred over the primary one when present, since it carries the
//! long Unicode names. Directory records never cross a sector boundary;
//! a zero length byte pads to the next one.

use std::cell::RefCell;
use std::io;

use super::{DiscEntry, DiscFileSystem, EntryKind, Extent, ExtentReader, clean_identifier};
use crate::path::{self, PathStyle};
use crate::stream::{ReadSeek, SharedStream, read_at, read_prefix};
use crate::{FileStream, LocatorError};

const SECTOR: u64 = 2048;
const FIRST_DESCRIPTOR: u64 = 16;
const MAX_DESCRIPTORS: u64 = 64;
const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

const PRIMARY: u8 = 1;
const SUPPLEMENTARY: u8 = 2;
const TERMINATOR: u8 = 255;

const ROOT_RECORD_AT: usize = 156;
const MIN_RECORD_LEN: usize = 33;

const FLAG_DIRECTORY: u8 = 0x02;
const FLAG_ASSOCIATED: u8 = 0x04;
const FLAG_MULTI_EXTENT: u8 = 0x80;

/// Joliet UCS-2 levels 1 to 3.
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

/// The primary volume descriptor sits in sector 16.
pub(crate) fn is_iso9660(stream: &mut dyn ReadSeek) -> io::Result<bool> {
    let id = read_at(stream, FIRST_DESCRIPTOR * SECTOR + 1, STANDARD_IDENTIFIER.len())?;
    Ok(id == STANDARD_IDENTIFIER.as_slice())
}

fn codec(details: impl std::fmt::Display) -> LocatorError {
    LocatorError::codec("iso9660", String::new(), details)
}

fn invalid(details: impl Into<String>) -> LocatorError {
    LocatorError::InvalidData {
        path: "iso9660".to_string(),
        details: details.into(),
    }
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// A directory record, with the extents of a multi-extent file merged.
#[derive(Debug, Clone)]
struct Record {
    name: String,
    directory: bool,
    extents: Vec<Extent>,
    len: u64,
    continues: bool,
}

pub(crate) struct IsoFileSystem {
    stream: RefCell<SharedStream>,
    block_size: u64,
    image_len: u64,
    joliet: bool,
    root: Record,
}

impl IsoFileSystem {
    pub(crate) fn new(mut stream: SharedStream) -> Result<Self, LocatorError> {
        let image_len = stream.len().map_err(|e| LocatorError::io("open", "iso9660", e))?;
        let mut fs = Self {
            stream: RefCell::new(stream),
            block_size: SECTOR,
            image_len,
            joliet: false,
            root: Record {
                name: String::new(),
                directory: true,
                extents: Vec::new(),
                len: 0,
                continues: false,
            },
        };

        let mut primary: Option<Vec<u8>> = None;
        let mut joliet: Option<Vec<u8>> = None;
        for sector in FIRST_DESCRIPTOR..FIRST_DESCRIPTOR + MAX_DESCRIPTORS {
            let desc = fs.read_bytes(sector * SECTOR, SECTOR as usize)?;
            if &desc[1..6] != STANDARD_IDENTIFIER.as_slice() {
                return Err(codec(format!("bad volume descriptor in sector {sector}")));
            }
            match desc[0] {
                PRIMARY if primary.is_none() => primary = Some(desc),
                SUPPLEMENTARY if joliet.is_none() && is_joliet(&desc) => joliet = Some(desc),
                TERMINATOR => break,
                _ => {}
            }
        }

        let primary = primary.ok_or_else(|| codec("no primary volume descriptor"))?;
        fs.block_size = u64::from(u16_at(&primary, 128));
        if fs.block_size == 0 || fs.block_size > SECTOR {
            return Err(codec(format!("unsupported logical block size {}", fs.block_size)));
        }
        fs.joliet = joliet.is_some();
        let volume = joliet.as_ref().unwrap_or(&primary);
        fs.root = parse_record(&volume[ROOT_RECORD_AT..], fs.block_size, fs.joliet)?;
        fs.root.name = String::new();
        fs.root.directory = true;

        tracing::debug!(joliet = fs.joliet, block_size = fs.block_size, "parsed iso9660 volume");
        Ok(fs)
    }

    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>, LocatorError> {
        let mut stream = self.stream.borrow_mut();
        let buf = read_at(&mut *stream, offset, len)
            .map_err(|e| LocatorError::io("read", "iso9660", e))?;
        if buf.len() < len {
            return Err(codec(format!("image truncated at byte {offset}")));
        }
        Ok(buf)
    }

    fn reader(&self, record: &Record) -> ExtentReader {
        ExtentReader::new(self.stream.borrow().clone(), record.extents.clone(), record.len)
    }

    fn children(&self, dir: &Record) -> Result<Vec<Record>, LocatorError> {
        if !dir.directory {
            return Ok(Vec::new());
        }
        if dir.len > self.image_len {
            return Err(invalid(format!(
                "directory {:?} of {} bytes in an image of {}",
                dir.name, dir.len, self.image_len
            )));
        }
        let len = usize::try_from(dir.len).map_err(|_| invalid("directory too large"))?;
        let data = read_prefix(&mut self.reader(dir), len)
            .map_err(|e| LocatorError::io("read", "iso9660", e))?;
        parse_directory(&data, self.block_size, self.joliet)
    }

    /// Resolve `path` to its record and on-disc spelling.
    fn resolve(&self, path: &str) -> Result<Option<(String, Record)>, LocatorError> {
        let mut current = self.root.clone();
        let mut spelled = String::new();
        for segment in path::segments(path) {
            let Some(next) = self
                .children(&current)?
                .into_iter()
                .find(|child| path::paths_equal(&child.name, segment))
            else {
                return Ok(None);
            };
            spelled = path::join(&spelled, &next.name, PathStyle::Rooted);
            current = next;
        }
        Ok(Some((spelled, current)))
    }
}

impl DiscFileSystem for IsoFileSystem {
    fn lookup(&self, path: &str) -> Result<Option<DiscEntry>, LocatorError> {
        Ok(self.resolve(path)?.map(|(path, record)| DiscEntry {
            path,
            kind: kind(&record),
        }))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<DiscEntry>, LocatorError> {
        let Some((spelled, node)) = self.resolve(dir)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .children(&node)?
            .into_iter()
            .map(|child| DiscEntry {
                path: path::join(&spelled, &child.name, PathStyle::Rooted),
                kind: kind(&child),
            })
            .collect())
    }

    fn open_file(&self, path: &str) -> Result<FileStream, LocatorError> {
        match self.resolve(path)? {
            Some((_, record)) if !record.directory => Ok(Box::new(self.reader(&record))),
            _ => Err(LocatorError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

fn kind(record: &Record) -> EntryKind {
    if record.directory {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

fn is_joliet(desc: &[u8]) -> bool {
    JOLIET_ESCAPES
        .iter()
        .any(|escape| desc.get(88..91) == Some(escape.as_slice()))
}

fn decode_name(raw: &[u8], joliet: bool) -> String {
    let name = if joliet {
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        raw.iter().map(|&b| char::from(b)).collect()
    };
    clean_identifier(&name).to_string()
}

fn parse_record(rec: &[u8], block_size: u64, joliet: bool) -> Result<Record, LocatorError> {
    let len = usize::from(*rec.first().ok_or_else(|| codec("empty directory record"))?);
    if len < MIN_RECORD_LEN || rec.len() < len {
        return Err(codec(format!("directory record of {len} bytes")));
    }
    let ext_attr_blocks = u64::from(rec[1]);
    let block = u64::from(u32_at(rec, 2));
    let data_len = u64::from(u32_at(rec, 10));
    let flags = rec[25];
    let name_len = usize::from(rec[32]);
    let raw_name = rec
        .get(33..33 + name_len)
        .filter(|_| 33 + name_len <= len)
        .ok_or_else(|| codec("directory record name overflows the record"))?;

    Ok(Record {
        name: decode_name(raw_name, joliet),
        directory: flags & FLAG_DIRECTORY != 0,
        extents: vec![Extent {
            offset: Some((block + ext_attr_blocks) * block_size),
            len: data_len,
        }],
        len: data_len,
        continues: flags & FLAG_MULTI_EXTENT != 0,
    })
}

/// Parse the records of one directory, skipping `.`, `..` and associated
/// files.
fn parse_directory(data: &[u8], block_size: u64, joliet: bool) -> Result<Vec<Record>, LocatorError> {
    let sector = SECTOR as usize;
    let mut records: Vec<Record> = Vec::new();
    let mut at = 0;
    while at < data.len() {
        let len = usize::from(data[at]);
        if len == 0 {
            at = (at / sector + 1) * sector;
            continue;
        }
        let rec = &data[at..];
        let flags = rec.get(25).copied().unwrap_or(0);
        let name_len = rec.get(32).copied().unwrap_or(0);
        let self_or_parent = name_len == 1 && matches!(rec.get(33), Some(0 | 1));
        if !self_or_parent && flags & FLAG_ASSOCIATED == 0 {
            let record = parse_record(rec, block_size, joliet)?;
            match records.last_mut() {
                Some(last) if last.continues && last.name == record.name => {
                    last.extents.extend(record.extents);
                    last.len += record.len;
                    last.continues = record.continues;
                }
                _ => records.push(record),
            }
        }
        at += len;
    }
    Ok(records)
}
