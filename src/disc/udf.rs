//! UDF (ECMA-167) images.
//!
//! Covers what read-only file access needs: the volume recognition
//! sequence, anchor and main volume descriptor sequence, type 1 partition
//! maps, file set descriptor, (extended) file entries with short, long or
//! embedded allocation descriptors, and file identifier descriptors.
//! Sparable, virtual and metadata partitions are rejected as codec errors.

use std::cell::RefCell;
use std::io::{self, Cursor};

use super::{DiscEntry, DiscFileSystem, EntryKind, Extent, ExtentReader};
use crate::path::{self, PathStyle};
use crate::stream::{ReadSeek, SharedStream, read_at, read_prefix};
use crate::{FileStream, LocatorError};

const SECTOR: u64 = 2048;
const VRS_START: u64 = 16;
const VRS_MAX_DESCRIPTORS: u64 = 64;
const ANCHOR_SECTOR: u64 = 256;

const TAG_ANCHOR: u16 = 2;
const TAG_PARTITION: u16 = 5;
const TAG_LOGICAL_VOLUME: u16 = 6;
const TAG_TERMINATOR: u16 = 8;
const TAG_FILE_SET: u16 = 256;
const TAG_FILE_IDENTIFIER: u16 = 257;
const TAG_FILE_ENTRY: u16 = 261;
const TAG_EXTENDED_FILE_ENTRY: u16 = 266;

const FID_DIRECTORY: u8 = 0x02;
const FID_DELETED: u8 = 0x04;
const FID_PARENT: u8 = 0x08;

const FILE_TYPE_DIRECTORY: u8 = 4;

/// Volume recognition: `BEA01` followed by `NSR02` or `NSR03`.
pub(crate) fn is_udf(stream: &mut dyn ReadSeek) -> io::Result<bool> {
    let mut extended_area = false;
    for i in 0..VRS_MAX_DESCRIPTORS {
        let head = read_at(stream, (VRS_START + i) * SECTOR, 6)?;
        if head.len() < 6 {
            return Ok(false);
        }
        match &head[1..6] {
            b"BEA01" => extended_area = true,
            b"NSR02" | b"NSR03" if extended_area => return Ok(true),
            b"TEA01" => return Ok(false),
            b"CD001" | b"CDW02" | b"BOOT2" => {}
            _ => return Ok(false),
        }
    }
    Ok(false)
}

fn codec(details: impl std::fmt::Display) -> LocatorError {
    LocatorError::codec("udf", String::new(), details)
}

fn invalid(details: impl Into<String>) -> LocatorError {
    LocatorError::InvalidData {
        path: "udf".to_string(),
        details: details.into(),
    }
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Descriptor tag identifier, if the 16-byte tag checksum holds.
fn tag_id(buf: &[u8]) -> Option<u16> {
    if buf.len() < 16 {
        return None;
    }
    let sum = buf[..16]
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 4)
        .fold(0u8, |acc, (_, &b)| acc.wrapping_add(b));
    (sum == buf[4]).then(|| u16_at(buf, 0))
}

fn expect_tag(buf: &[u8], expected: u16, what: &str) -> Result<(), LocatorError> {
    match tag_id(buf) {
        Some(id) if id == expected => Ok(()),
        Some(id) => Err(codec(format!("expected {what} (tag {expected}), found tag {id}"))),
        None => Err(codec(format!("bad descriptor tag where {what} was expected"))),
    }
}

/// Decode an OSTA compressed unicode identifier.
fn decode_dstring(raw: &[u8]) -> String {
    match raw.split_first() {
        Some((8 | 254, rest)) => rest.iter().map(|&b| char::from(b)).collect(),
        Some((16 | 255, rest)) => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::new(),
    }
}

/// Address of an ICB or extent: logical block within a partition.
#[derive(Debug, Clone, Copy)]
struct LongAd {
    length: u32,
    block: u32,
    partition: u16,
}

impl LongAd {
    fn parse(buf: &[u8], at: usize) -> Self {
        Self {
            length: u32_at(buf, at),
            block: u32_at(buf, at + 4),
            partition: u16_at(buf, at + 8),
        }
    }
}

#[derive(Debug)]
enum FileData {
    Embedded(Vec<u8>),
    Extents(Vec<Extent>),
}

#[derive(Debug)]
struct FileEntry {
    file_type: u8,
    len: u64,
    data: FileData,
}

#[derive(Debug, Clone)]
struct Child {
    name: String,
    directory: bool,
    icb: LongAd,
}

pub(crate) struct UdfFileSystem {
    stream: RefCell<SharedStream>,
    /// Start sector of each partition, indexed by partition reference.
    partitions: Vec<u64>,
    block_size: u64,
    image_len: u64,
    root: LongAd,
}

impl UdfFileSystem {
    pub(crate) fn new(mut stream: SharedStream) -> Result<Self, LocatorError> {
        let image_len = stream.len().map_err(|e| LocatorError::io("open", "udf", e))?;
        let mut fs = Self {
            stream: RefCell::new(stream),
            partitions: Vec::new(),
            block_size: SECTOR,
            image_len,
            root: LongAd {
                length: 0,
                block: 0,
                partition: 0,
            },
        };

        let anchor = fs.read_sector(ANCHOR_SECTOR)?;
        expect_tag(&anchor, TAG_ANCHOR, "anchor volume descriptor pointer")?;
        let vds_len = u64::from(u32_at(&anchor, 16));
        let vds_start = u64::from(u32_at(&anchor, 20));

        let mut partition_starts: Vec<(u16, u64)> = Vec::new();
        let mut partition_map: Vec<u16> = Vec::new();
        let mut file_set: Option<LongAd> = None;

        for sector in vds_start..vds_start + vds_len.div_ceil(SECTOR) {
            let desc = fs.read_sector(sector)?;
            match tag_id(&desc) {
                Some(TAG_PARTITION) => {
                    partition_starts.push((u16_at(&desc, 22), u64::from(u32_at(&desc, 188))));
                }
                Some(TAG_LOGICAL_VOLUME) => {
                    fs.block_size = u64::from(u32_at(&desc, 212));
                    file_set = Some(LongAd::parse(&desc, 248));
                    partition_map = parse_partition_maps(&desc)?;
                }
                Some(TAG_TERMINATOR) => break,
                Some(_) => {}
                None => return Err(codec(format!("bad descriptor tag in sector {sector}"))),
            }
        }

        if fs.block_size != SECTOR {
            return Err(codec(format!("unsupported logical block size {}", fs.block_size)));
        }
        let file_set = file_set.ok_or_else(|| codec("no logical volume descriptor"))?;
        fs.partitions = partition_map
            .iter()
            .map(|number| {
                partition_starts
                    .iter()
                    .find(|(n, _)| n == number)
                    .map(|&(_, start)| start)
                    .ok_or_else(|| codec(format!("partition {number} is not described")))
            })
            .collect::<Result<_, _>>()?;

        let fsd = fs.read_block(file_set)?;
        expect_tag(&fsd, TAG_FILE_SET, "file set descriptor")?;
        fs.root = LongAd::parse(&fsd, 400);

        tracing::debug!(partitions = fs.partitions.len(), "parsed udf volume");
        Ok(fs)
    }

    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>, LocatorError> {
        let mut stream = self.stream.borrow_mut();
        let buf = read_at(&mut *stream, offset, len).map_err(|e| LocatorError::io("read", "udf", e))?;
        if buf.len() < len {
            return Err(codec(format!("image truncated at byte {offset}")));
        }
        Ok(buf)
    }

    fn read_sector(&self, sector: u64) -> Result<Vec<u8>, LocatorError> {
        self.read_bytes(sector * SECTOR, SECTOR as usize)
    }

    fn block_offset(&self, partition: u16, block: u32) -> Result<u64, LocatorError> {
        let start = self
            .partitions
            .get(usize::from(partition))
            .ok_or_else(|| codec(format!("unknown partition reference {partition}")))?;
        Ok((start + u64::from(block)) * self.block_size)
    }

    fn read_block(&self, ad: LongAd) -> Result<Vec<u8>, LocatorError> {
        let offset = self.block_offset(ad.partition, ad.block)?;
        self.read_bytes(offset, self.block_size as usize)
    }

    fn file_entry(&self, icb: LongAd) -> Result<FileEntry, LocatorError> {
        let buf = self.read_block(icb)?;
        let (ea_len_at, base) = match tag_id(&buf) {
            Some(TAG_FILE_ENTRY) => (168, 176),
            Some(TAG_EXTENDED_FILE_ENTRY) => (208, 216),
            Some(id) => return Err(codec(format!("expected file entry, found tag {id}"))),
            None => return Err(codec("bad file entry tag")),
        };
        let file_type = buf[27];
        let flags = u16_at(&buf, 34);
        let len = u64_at(&buf, 56);
        let ea_len = u32_at(&buf, ea_len_at) as usize;
        let ad_len = u32_at(&buf, ea_len_at + 4) as usize;
        let start = base + ea_len;
        let ads = buf
            .get(start..start + ad_len)
            .ok_or_else(|| codec("allocation descriptors overflow the file entry"))?;

        let data = match flags & 0x7 {
            0 => FileData::Extents(self.extents(ads, 8, icb.partition)?),
            1 => FileData::Extents(self.extents(ads, 16, icb.partition)?),
            3 => FileData::Embedded(ads.to_vec()),
            other => return Err(codec(format!("unsupported allocation descriptor type {other}"))),
        };
        Ok(FileEntry {
            file_type,
            len,
            data,
        })
    }

    /// Decode short (8-byte) or long (16-byte) allocation descriptors.
    fn extents(&self, ads: &[u8], size: usize, partition: u16) -> Result<Vec<Extent>, LocatorError> {
        let mut extents = Vec::new();
        for ad in ads.chunks_exact(size) {
            let raw_len = u32_at(ad, 0);
            let len = u64::from(raw_len & 0x3fff_ffff);
            if len == 0 {
                break;
            }
            let block = u32_at(ad, 4);
            let partition = if size == 16 { u16_at(ad, 8) } else { partition };
            let offset = match raw_len >> 30 {
                0 => {
                    let offset = self.block_offset(partition, block)?;
                    if offset + len > self.image_len {
                        return Err(invalid(format!("extent at byte {offset} runs past the image")));
                    }
                    Some(offset)
                }
                1 | 2 => None,
                _ => return Err(codec("allocation descriptor continuation is not supported")),
            };
            extents.push(Extent { offset, len });
        }
        Ok(extents)
    }

    fn contents(&self, entry: &FileEntry) -> Result<Vec<u8>, LocatorError> {
        if entry.len > self.image_len {
            return Err(invalid(format!(
                "directory of {} bytes in an image of {}",
                entry.len, self.image_len
            )));
        }
        let len = usize::try_from(entry.len).map_err(|_| invalid("directory too large"))?;
        let mut reader = self.reader(entry)?;
        read_prefix(&mut reader, len).map_err(|e| LocatorError::io("read", "udf", e))
    }

    fn reader(&self, entry: &FileEntry) -> Result<FileStream, LocatorError> {
        Ok(match &entry.data {
            FileData::Embedded(data) => {
                let len = usize::try_from(entry.len).unwrap_or(usize::MAX).min(data.len());
                Box::new(Cursor::new(data[..len].to_vec()))
            }
            FileData::Extents(extents) => Box::new(ExtentReader::new(
                self.stream.borrow().clone(),
                extents.clone(),
                entry.len,
            )),
        })
    }

    fn children(&self, icb: LongAd) -> Result<Vec<Child>, LocatorError> {
        let entry = self.file_entry(icb)?;
        if entry.file_type != FILE_TYPE_DIRECTORY {
            return Ok(Vec::new());
        }
        parse_identifiers(&self.contents(&entry)?)
    }

    /// Resolve `path` to its ICB and on-disc spelling.
    fn resolve(&self, path: &str) -> Result<Option<(String, Child)>, LocatorError> {
        let mut current = Child {
            name: String::new(),
            directory: true,
            icb: self.root,
        };
        let mut spelled = String::new();
        for segment in path::segments(path) {
            if !current.directory {
                return Ok(None);
            }
            let Some(next) = self
                .children(current.icb)?
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

impl DiscFileSystem for UdfFileSystem {
    fn lookup(&self, path: &str) -> Result<Option<DiscEntry>, LocatorError> {
        Ok(self.resolve(path)?.map(|(path, child)| DiscEntry {
            path,
            kind: if child.directory {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
        }))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<DiscEntry>, LocatorError> {
        let Some((spelled, node)) = self.resolve(dir)? else {
            return Ok(Vec::new());
        };
        if !node.directory {
            return Ok(Vec::new());
        }
        Ok(self
            .children(node.icb)?
            .into_iter()
            .map(|child| DiscEntry {
                path: path::join(&spelled, &child.name, PathStyle::Rooted),
                kind: if child.directory {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            })
            .collect())
    }

    fn open_file(&self, path: &str) -> Result<FileStream, LocatorError> {
        match self.resolve(path)? {
            Some((_, child)) if !child.directory && !child.name.is_empty() => {
                let entry = self.file_entry(child.icb)?;
                self.reader(&entry)
            }
            _ => Err(LocatorError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

/// Partition numbers referenced by a logical volume descriptor's maps.
fn parse_partition_maps(lvd: &[u8]) -> Result<Vec<u16>, LocatorError> {
    let count = u32_at(lvd, 268);
    let mut at = 440;
    let mut numbers = Vec::new();
    for _ in 0..count {
        let (kind, len) = match lvd.get(at..at + 2) {
            Some(&[kind, len]) => (kind, usize::from(len)),
            _ => return Err(invalid("partition map table overflows its descriptor")),
        };
        if kind != 1 || len < 6 {
            return Err(codec(format!("unsupported partition map type {kind}")));
        }
        let map = lvd
            .get(at..at + len)
            .ok_or_else(|| invalid(format!("partition map at byte {at} overflows its descriptor")))?;
        numbers.push(u16_at(map, 4));
        at += len;
    }
    Ok(numbers)
}

/// Walk the file identifier descriptors of a directory.
fn parse_identifiers(data: &[u8]) -> Result<Vec<Child>, LocatorError> {
    let mut children = Vec::new();
    let mut at = 0;
    while at + 38 <= data.len() {
        let fid = &data[at..];
        match tag_id(fid) {
            Some(TAG_FILE_IDENTIFIER) => {}
            _ => return Err(codec(format!("bad file identifier descriptor at byte {at}"))),
        }
        let characteristics = fid[18];
        let name_len = usize::from(fid[19]);
        let icb = LongAd::parse(fid, 20);
        let impl_len = usize::from(u16_at(fid, 36));
        let name_at = 38 + impl_len;
        let raw_name = fid
            .get(name_at..name_at + name_len)
            .ok_or_else(|| codec("file identifier overflows its directory"))?;

        if characteristics & (FID_PARENT | FID_DELETED) == 0 && name_len > 0 {
            children.push(Child {
                name: decode_dstring(raw_name),
                directory: characteristics & FID_DIRECTORY != 0,
                icb,
            });
        }
        at += (name_at + name_len).next_multiple_of(4);
    }
    Ok(children)
}
