//! # Disc Images
//!
//! Read-only access to optical-disc filesystem images through
//! [`DiscLocator`].
//!
//! | Format | Reader | Detection |
//! |--------|--------|-----------|
//! | ISO9660 | built-in ECMA-119 reader, Joliet names preferred | `CD001` standard identifier in sector 16 |
//! | UDF | built-in ECMA-167 reader | `BEA01` then `NSR02`/`NSR03` in the volume recognition sequence |
//!
//! Both readers sit behind the same internal filesystem trait, so the
//! locator's walk, lookup and lifecycle logic is shared. Paths use
//! [`PathStyle::Rooted`] and compare case-insensitively.

pub(crate) mod iso;
pub(crate) mod udf;

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};

use crate::path::{self, PathStyle};
use crate::stream::{SharedStream, resolve_seek};
use crate::factory::first_match;
use crate::{DetectFn, DiscFormat, FileIter, FileLocator, FileStream, LocatorError};

/// Kind of a node in a disc directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
}

/// A node found on the disc, with its path spelled as the disc spells it.
#[derive(Debug, Clone)]
pub(crate) struct DiscEntry {
    pub(crate) path: String,
    pub(crate) kind: EntryKind,
}

/// Directory-tree access shared by the ISO9660 and UDF readers.
///
/// Paths are rooted virtual paths; lookups ignore case.
pub(crate) trait DiscFileSystem {
    /// Find the node at `path`. The empty path names the root directory.
    fn lookup(&self, path: &str) -> Result<Option<DiscEntry>, LocatorError>;

    /// Children of the directory at `path`, in disc order.
    fn read_dir(&self, path: &str) -> Result<Vec<DiscEntry>, LocatorError>;

    /// Open the regular file at `path`.
    fn open_file(&self, path: &str) -> Result<FileStream, LocatorError>;
}

/// A run of file bytes on the image, or a hole that reads as zeros.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Extent {
    pub(crate) offset: Option<u64>,
    pub(crate) len: u64,
}

/// Lazy reader over a file's extents, clamped to the file length.
pub(crate) struct ExtentReader {
    stream: SharedStream,
    extents: Vec<Extent>,
    len: u64,
    pos: u64,
}

impl ExtentReader {
    pub(crate) fn new(stream: SharedStream, extents: Vec<Extent>, len: u64) -> Self {
        let recorded: u64 = extents.iter().map(|e| e.len).sum();
        Self {
            stream,
            extents,
            len: len.min(recorded),
            pos: 0,
        }
    }
}

impl Read for ExtentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let mut base = 0;
        for extent in &self.extents {
            if self.pos < base + extent.len {
                let within = self.pos - base;
                let available = (extent.len - within).min(self.len - self.pos);
                let want = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
                let read = match extent.offset {
                    Some(offset) => {
                        self.stream.seek(SeekFrom::Start(offset + within))?;
                        self.stream.read(&mut buf[..want])?
                    }
                    None => {
                        buf[..want].fill(0);
                        want
                    }
                };
                self.pos += read as u64;
                return Ok(read);
            }
            base += extent.len;
        }
        Ok(0)
    }
}

impl Seek for ExtentReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.len)?;
        Ok(self.pos)
    }
}

/// Read-only locator over an ISO9660 or UDF image.
///
/// Owns its image stream; closing releases it (and, for a layered locator,
/// the stream borrowed from the parent).
pub struct DiscLocator {
    format: DiscFormat,
    fs: Option<Box<dyn DiscFileSystem>>,
    stream: SharedStream,
}

impl DiscLocator {
    /// Open `stream` as an image of the given format.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Codec`] if the image cannot be parsed
    /// - [`LocatorError::InvalidData`] if a descriptor overruns its bounds
    pub fn with_format(stream: FileStream, format: DiscFormat) -> Result<Self, LocatorError> {
        let mut shared = SharedStream::new(stream);
        shared
            .seek(SeekFrom::Start(0))
            .map_err(|e| LocatorError::io("open", String::new(), e))?;

        let fs: Box<dyn DiscFileSystem> = match format {
            DiscFormat::Iso9660 => Box::new(iso::IsoFileSystem::new(shared.clone())?),
            DiscFormat::Udf => Box::new(udf::UdfFileSystem::new(shared.clone())?),
        };
        tracing::debug!(format = ?format, "opened disc locator");
        Ok(Self {
            format,
            fs: Some(fs),
            stream: shared,
        })
    }

    /// Sniff `stream` (ISO9660 first, then UDF) and open it.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnsupportedFormat`] if neither signature matches
    /// - [`LocatorError::Codec`] if the image cannot be parsed
    pub fn new(mut stream: FileStream) -> Result<Self, LocatorError> {
        let format = sniff(stream.as_mut())
            .map_err(|e| LocatorError::io("detect", String::new(), e))?
            .ok_or_else(|| LocatorError::unsupported("no disc filesystem signature"))?;
        Self::with_format(stream, format)
    }

    /// Filesystem of the image.
    pub fn format(&self) -> DiscFormat {
        self.format
    }

    fn fs(&self) -> Result<&dyn DiscFileSystem, LocatorError> {
        self.fs.as_deref().ok_or(LocatorError::Closed)
    }
}

impl FileLocator for DiscLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        let fs = self.fs()?;
        if path::segments(path).next().is_none() {
            return Ok(false);
        }
        Ok(matches!(
            fs.lookup(&path::normalize(path, PathStyle::Rooted))?,
            Some(DiscEntry {
                kind: EntryKind::File,
                ..
            })
        ))
    }

    fn open(&self, path: &str) -> Result<FileStream, LocatorError> {
        let fs = self.fs()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        fs.open_file(&path::normalize(path, PathStyle::Rooted))
    }

    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError> {
        let fs = self.fs()?;
        let start = match fs.lookup(&path::normalize(root, PathStyle::Rooted))? {
            None => return Ok(FileIter::empty()),
            Some(entry) => entry,
        };
        Ok(FileIter::new(DiscWalk::new(fs, start)))
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Rooted
    }

    fn close(&mut self) {
        if self.fs.take().is_some() {
            self.stream.release();
            tracing::debug!(format = ?self.format, "closed disc locator");
        }
    }
}

impl Drop for DiscLocator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DiscLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscLocator")
            .field("format", &self.format)
            .field("closed", &self.fs.is_none())
            .finish()
    }
}

/// Depth-first walk that reads one directory per step.
struct DiscWalk<'a> {
    fs: &'a dyn DiscFileSystem,
    pending: Vec<String>,
    ready: VecDeque<String>,
}

impl<'a> DiscWalk<'a> {
    fn new(fs: &'a dyn DiscFileSystem, start: DiscEntry) -> Self {
        let mut walk = Self {
            fs,
            pending: Vec::new(),
            ready: VecDeque::new(),
        };
        match start.kind {
            EntryKind::File => walk.ready.push_back(start.path),
            EntryKind::Directory => walk.pending.push(start.path),
        }
        walk
    }
}

impl Iterator for DiscWalk<'_> {
    type Item = Result<String, LocatorError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.ready.pop_front() {
                return Some(Ok(path));
            }
            let dir = self.pending.pop()?;
            let children = match self.fs.read_dir(&dir) {
                Ok(children) => children,
                Err(err) => return Some(Err(err)),
            };
            let mut subdirs = Vec::new();
            for child in children {
                match child.kind {
                    EntryKind::File => self.ready.push_back(child.path),
                    EntryKind::Directory => subdirs.push(child.path),
                }
            }
            self.pending.extend(subdirs.into_iter().rev());
        }
    }
}

/// Disc signatures in detection order. [`crate::Detector::discs`] is built
/// from this table.
pub(crate) const SIGNATURES: [(&str, DetectFn, DiscFormat); 2] = [
    ("iso9660", iso::is_iso9660, DiscFormat::Iso9660),
    ("udf", udf::is_udf, DiscFormat::Udf),
];

/// Detect the disc format of `stream`. The stream is left at its start.
pub(crate) fn sniff(stream: &mut dyn crate::ReadSeek) -> io::Result<Option<DiscFormat>> {
    first_match(stream, SIGNATURES)
}

/// Clean a disc identifier for comparison and display: strip an ISO9660
/// `;version` suffix and the trailing dot of extension-less names.
pub(crate) fn clean_identifier(raw: &str) -> &str {
    let name = match raw.rfind(';') {
        Some(idx) if raw[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &raw[..idx],
        _ => raw,
    };
    match name.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}
