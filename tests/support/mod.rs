//! Shared fixtures for integration tests: minimal disc image builders and a
//! parent locator whose streams report when they are dropped.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

use anyfs_locator::path::PathStyle;
use anyfs_locator::{FileIter, FileLocator, FileStream, LocatorError, MemoryLocator};

pub const SECTOR: usize = 2048;

// =============================================================================
// Directory tree shared by both image builders
// =============================================================================

#[derive(Default)]
struct Tree {
    files: Vec<(String, Vec<u8>)>,
    dirs: BTreeMap<String, Tree>,
}

impl Tree {
    fn from_files(files: &[(&str, &[u8])]) -> Self {
        let mut root = Tree::default();
        for (path, data) in files {
            let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            let name = parts.pop().expect("file name");
            let mut node = &mut root;
            for part in parts {
                node = node.dirs.entry(part.to_string()).or_default();
            }
            node.files.push((name.to_string(), data.to_vec()));
        }
        root
    }
}

fn sectors(len: usize) -> u32 {
    len.div_ceil(SECTOR).max(1) as u32
}

fn put(image: &mut Vec<u8>, sector: u32, data: &[u8]) {
    let at = sector as usize * SECTOR;
    if image.len() < at + data.len() {
        image.resize((at + data.len()).next_multiple_of(SECTOR), 0);
    }
    image[at..at + data.len()].copy_from_slice(data);
}

// =============================================================================
// ISO9660
// =============================================================================

struct IsoDir {
    sector: u32,
    files: Vec<(String, u32, Vec<u8>)>,
    dirs: Vec<(String, IsoDir)>,
}

fn iso_place(tree: &Tree, next: &mut u32) -> IsoDir {
    let sector = *next;
    *next += 1;
    let files = tree
        .files
        .iter()
        .map(|(name, data)| {
            let at = *next;
            *next += sectors(data.len());
            (name.clone(), at, data.clone())
        })
        .collect();
    let dirs = tree
        .dirs
        .iter()
        .map(|(name, sub)| (name.clone(), iso_place(sub, next)))
        .collect();
    IsoDir {
        sector,
        files,
        dirs,
    }
}

fn iso_record(name: &[u8], sector: u32, len: u32, flags: u8) -> Vec<u8> {
    let total = (33 + name.len()).next_multiple_of(2);
    let mut rec = vec![0u8; total];
    rec[0] = total as u8;
    rec[2..6].copy_from_slice(&sector.to_le_bytes());
    rec[6..10].copy_from_slice(&sector.to_be_bytes());
    rec[10..14].copy_from_slice(&len.to_le_bytes());
    rec[14..18].copy_from_slice(&len.to_be_bytes());
    rec[25] = flags;
    rec[28..30].copy_from_slice(&1u16.to_le_bytes());
    rec[30..32].copy_from_slice(&1u16.to_be_bytes());
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);
    rec
}

fn iso_write_dir(image: &mut Vec<u8>, dir: &IsoDir, parent: u32) {
    let mut data = Vec::new();
    data.extend(iso_record(&[0], dir.sector, SECTOR as u32, 0x02));
    data.extend(iso_record(&[1], parent, SECTOR as u32, 0x02));
    for (name, sector, bytes) in &dir.files {
        let id = format!("{};1", name.to_uppercase());
        data.extend(iso_record(id.as_bytes(), *sector, bytes.len() as u32, 0));
        put(image, *sector, bytes);
    }
    for (name, sub) in &dir.dirs {
        data.extend(iso_record(name.to_uppercase().as_bytes(), sub.sector, SECTOR as u32, 0x02));
        iso_write_dir(image, sub, dir.sector);
    }
    assert!(data.len() <= SECTOR, "test directory too large");
    put(image, dir.sector, &data);
}

/// Build an ISO9660 image. Identifiers are upper-cased and files get a
/// `;1` version suffix, as mastering tools do.
pub fn iso_image(files: &[(&str, &[u8])]) -> Vec<u8> {
    let tree = Tree::from_files(files);
    let mut next = 18;
    let root = iso_place(&tree, &mut next);
    let mut image = vec![0u8; next as usize * SECTOR];

    let mut pvd = vec![0u8; SECTOR];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    pvd[128..130].copy_from_slice(&(SECTOR as u16).to_le_bytes());
    pvd[130..132].copy_from_slice(&(SECTOR as u16).to_be_bytes());
    let root_record = iso_record(&[0], root.sector, SECTOR as u32, 0x02);
    pvd[156..156 + root_record.len()].copy_from_slice(&root_record);
    put(&mut image, 16, &pvd);

    let mut terminator = vec![0u8; SECTOR];
    terminator[0] = 255;
    terminator[1..6].copy_from_slice(b"CD001");
    terminator[6] = 1;
    put(&mut image, 17, &terminator);

    iso_write_dir(&mut image, &root, root.sector);
    image
}

// =============================================================================
// UDF
// =============================================================================

const PARTITION_START: u32 = 260;

fn udf_tag(buf: &mut [u8], id: u16) {
    buf[0..2].copy_from_slice(&id.to_le_bytes());
    buf[2..4].copy_from_slice(&2u16.to_le_bytes());
    buf[4] = 0;
    let sum = buf[..16]
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 4)
        .fold(0u8, |acc, (_, &b)| acc.wrapping_add(b));
    buf[4] = sum;
}

fn long_ad(buf: &mut [u8], at: usize, len: u32, block: u32) {
    buf[at..at + 4].copy_from_slice(&len.to_le_bytes());
    buf[at + 4..at + 8].copy_from_slice(&block.to_le_bytes());
    buf[at + 8..at + 10].copy_from_slice(&0u16.to_le_bytes());
}

fn udf_fid(name: &str, characteristics: u8, icb: u32) -> Vec<u8> {
    let mut raw = Vec::new();
    if !name.is_empty() {
        raw.push(8);
        raw.extend_from_slice(name.as_bytes());
    }
    let mut fid = vec![0u8; (38 + raw.len()).next_multiple_of(4)];
    fid[16..18].copy_from_slice(&1u16.to_le_bytes());
    fid[18] = characteristics;
    fid[19] = raw.len() as u8;
    long_ad(&mut fid, 20, SECTOR as u32, icb);
    fid[38..38 + raw.len()].copy_from_slice(&raw);
    udf_tag(&mut fid, 257);
    fid
}

fn udf_file_entry(file_type: u8, len: u64, ad_type: u16, ads: &[u8]) -> Vec<u8> {
    let mut fe = vec![0u8; SECTOR];
    fe[27] = file_type;
    fe[34..36].copy_from_slice(&ad_type.to_le_bytes());
    fe[56..64].copy_from_slice(&len.to_le_bytes());
    fe[172..176].copy_from_slice(&(ads.len() as u32).to_le_bytes());
    fe[176..176 + ads.len()].copy_from_slice(ads);
    udf_tag(&mut fe, 261);
    fe
}

struct UdfDir {
    icb: u32,
    files: Vec<(String, u32, u32, Vec<u8>)>,
    dirs: Vec<(String, UdfDir)>,
}

fn udf_place(tree: &Tree, next: &mut u32) -> UdfDir {
    let icb = *next;
    *next += 1;
    let files = tree
        .files
        .iter()
        .map(|(name, data)| {
            let icb = *next;
            let block = *next + 1;
            *next += 1 + sectors(data.len());
            (name.clone(), icb, block, data.clone())
        })
        .collect();
    let dirs = tree
        .dirs
        .iter()
        .map(|(name, sub)| (name.clone(), udf_place(sub, next)))
        .collect();
    UdfDir { icb, files, dirs }
}

fn udf_write_dir(image: &mut Vec<u8>, dir: &UdfDir, parent: u32) {
    let mut fids = udf_fid("", 0x0A, parent);
    for (name, icb, block, data) in &dir.files {
        fids.extend(udf_fid(name, 0, *icb));
        let mut short_ad = Vec::new();
        if !data.is_empty() {
            short_ad.extend_from_slice(&(data.len() as u32).to_le_bytes());
            short_ad.extend_from_slice(&block.to_le_bytes());
        }
        let fe = udf_file_entry(5, data.len() as u64, 0, &short_ad);
        put(image, PARTITION_START + icb, &fe);
        put(image, PARTITION_START + block, data);
    }
    for (name, sub) in &dir.dirs {
        fids.extend(udf_fid(name, 0x02, sub.icb));
        udf_write_dir(image, sub, dir.icb);
    }
    assert!(176 + fids.len() <= SECTOR, "test directory too large");
    let fe = udf_file_entry(4, fids.len() as u64, 3, &fids);
    put(image, PARTITION_START + dir.icb, &fe);
}

/// Build a UDF image with one type 1 partition. Directories embed their
/// identifiers in the file entry; files use short allocation descriptors.
pub fn udf_image(files: &[(&str, &[u8])]) -> Vec<u8> {
    let tree = Tree::from_files(files);
    let mut next = 1;
    let root = udf_place(&tree, &mut next);
    let mut image = vec![0u8; (PARTITION_START + next) as usize * SECTOR];

    for (i, id) in [b"BEA01", b"NSR02", b"TEA01"].iter().enumerate() {
        let mut vsd = vec![0u8; SECTOR];
        vsd[1..6].copy_from_slice(*id);
        vsd[6] = 1;
        put(&mut image, 16 + i as u32, &vsd);
    }

    let mut anchor = vec![0u8; SECTOR];
    anchor[16..20].copy_from_slice(&(4 * SECTOR as u32).to_le_bytes());
    anchor[20..24].copy_from_slice(&32u32.to_le_bytes());
    udf_tag(&mut anchor, 2);
    put(&mut image, 256, &anchor);

    let mut pd = vec![0u8; SECTOR];
    pd[22..24].copy_from_slice(&0u16.to_le_bytes());
    pd[188..192].copy_from_slice(&PARTITION_START.to_le_bytes());
    pd[192..196].copy_from_slice(&next.to_le_bytes());
    udf_tag(&mut pd, 5);
    put(&mut image, 32, &pd);

    let mut lvd = vec![0u8; SECTOR];
    lvd[212..216].copy_from_slice(&(SECTOR as u32).to_le_bytes());
    long_ad(&mut lvd, 248, SECTOR as u32, 0);
    lvd[264..268].copy_from_slice(&6u32.to_le_bytes());
    lvd[268..272].copy_from_slice(&1u32.to_le_bytes());
    lvd[440] = 1;
    lvd[441] = 6;
    lvd[442..444].copy_from_slice(&1u16.to_le_bytes());
    lvd[444..446].copy_from_slice(&0u16.to_le_bytes());
    udf_tag(&mut lvd, 6);
    put(&mut image, 33, &lvd);

    let mut terminator = vec![0u8; SECTOR];
    udf_tag(&mut terminator, 8);
    put(&mut image, 34, &terminator);

    let mut fsd = vec![0u8; SECTOR];
    long_ad(&mut fsd, 400, SECTOR as u32, root.icb);
    udf_tag(&mut fsd, 256);
    put(&mut image, PARTITION_START, &fsd);

    udf_write_dir(&mut image, &root, root.icb);
    image
}

// =============================================================================
// Drop-recording parent
// =============================================================================

/// Stream that counts its own drops.
pub struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    dropped: Rc<Cell<usize>>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for TrackedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.set(self.dropped.get() + 1);
    }
}

/// Memory-backed parent whose opened streams report their release.
pub struct TrackingLocator {
    pub inner: MemoryLocator,
    pub opened: Cell<usize>,
    pub dropped: Rc<Cell<usize>>,
}

impl TrackingLocator {
    pub fn new(inner: MemoryLocator) -> Self {
        Self {
            inner,
            opened: Cell::new(0),
            dropped: Rc::new(Cell::new(0)),
        }
    }

    /// Streams opened and not yet dropped.
    pub fn live(&self) -> usize {
        self.opened.get() - self.dropped.get()
    }
}

impl FileLocator for TrackingLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        self.inner.exists(path)
    }

    fn open(&self, path: &str) -> Result<FileStream, LocatorError> {
        let mut data = Vec::new();
        self.inner.open(path)?.read_to_end(&mut data)?;
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(TrackedStream {
            inner: Cursor::new(data),
            dropped: Rc::clone(&self.dropped),
        }))
    }

    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError> {
        self.inner.enumerate_files_in(root)
    }

    fn path_style(&self) -> PathStyle {
        self.inner.path_style()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
