//! # Archive Containers
//!
//! Read access to zip, tar, tar.gz and single-entry gzip files through
//! [`ArchiveLocator`], and sequential writing through [`ArchiveWriter`].
//!
//! | Format | Entries | Entry streams |
//! |--------|---------|---------------|
//! | zip | regular entries, directories skipped | decompressed into memory on open |
//! | tar | regular files only | lazy windows over the archive stream |
//! | tar.gz | regular files only | windows over the decompressed archive |
//! | gzip | one entry, named from the header or the origin | decompressed on open |
//!
//! Entry paths use [`PathStyle::Relative`].

pub(crate) mod detect;
mod writer;

pub use writer::ArchiveWriter;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::path::{self, PathStyle};
use crate::stream::{SharedStream, SliceReader, read_prefix};
use crate::factory::first_match;
use crate::{ArchiveFormat, DetectFn, FileIter, FileLocator, FileStream, LocatorError};

const GZIP_FALLBACK_NAME: &str = "data";

enum Codec {
    Zip(RefCell<ZipArchive<SharedStream>>),
    /// Stream the tar windows read from: the source itself, or the
    /// decompressed payload of a tar.gz.
    Tar(SharedStream),
    GZip,
}

#[derive(Debug, Clone, Copy)]
enum EntryData {
    ZipIndex(usize),
    Window { start: u64, len: u64 },
    Whole,
}

#[derive(Debug)]
struct ArchiveEntry {
    path: String,
    data: EntryData,
}

/// Read-only locator over an archive container.
///
/// Owns its source stream. When the stream came from a parent locator,
/// closing the archive releases that stream and nothing else.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use anyfs_locator::{ArchiveFormat, ArchiveLocator, FileLocator, LocatorExt};
///
/// let mut data = Vec::new();
/// {
///     let mut zip = zip::ZipWriter::new(Cursor::new(&mut data));
///     zip.start_file("hello.txt", zip::write::SimpleFileOptions::default()).unwrap();
///     std::io::Write::write_all(&mut zip, b"hi").unwrap();
///     zip.finish().unwrap();
/// }
///
/// let archive = ArchiveLocator::new(Box::new(Cursor::new(data)), "hello.zip").unwrap();
/// assert_eq!(archive.format(), ArchiveFormat::Zip);
/// assert_eq!(archive.read("/hello.txt").unwrap(), b"hi");
/// ```
pub struct ArchiveLocator {
    format: ArchiveFormat,
    origin: String,
    source: SharedStream,
    codec: Option<Codec>,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl ArchiveLocator {
    /// Sniff the format of `stream` and index its entries.
    ///
    /// `origin` names the stream in errors and supplies the entry name of a
    /// gzip file whose header carries none.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnsupportedFormat`] if no archive signature matches
    /// - [`LocatorError::Codec`] if the archive is corrupt
    pub fn new(mut stream: FileStream, origin: impl Into<String>) -> Result<Self, LocatorError> {
        let origin = origin.into();
        let format = sniff(stream.as_mut())
            .map_err(|e| LocatorError::io("detect", origin.clone(), e))?
            .ok_or_else(|| LocatorError::unsupported(format!("no archive signature in {origin:?}")))?;
        Self::with_format(stream, format, origin)
    }

    /// Index `stream` as an archive of the given format without sniffing.
    ///
    /// [`ArchiveFormat::GZip`] is promoted to [`ArchiveFormat::TarGz`] when the
    /// decompressed payload starts with a tar header.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Codec`] if the archive is corrupt
    pub fn with_format(
        stream: FileStream,
        format: ArchiveFormat,
        origin: impl Into<String>,
    ) -> Result<Self, LocatorError> {
        let origin = origin.into();
        let mut source = SharedStream::new(stream);
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| LocatorError::io("open", origin.clone(), e))?;

        let mut locator = Self {
            format,
            origin,
            source,
            codec: None,
            entries: Vec::new(),
            index: HashMap::new(),
        };

        match format {
            ArchiveFormat::Zip => locator.index_zip()?,
            ArchiveFormat::Tar => {
                let tar = locator.source.clone();
                locator.index_tar(tar)?;
            }
            ArchiveFormat::GZip | ArchiveFormat::TarGz => locator.index_gzip()?,
        }

        tracing::debug!(
            format = ?locator.format,
            origin = %locator.origin,
            entries = locator.entries.len(),
            "opened archive locator"
        );
        Ok(locator)
    }

    /// Detected container format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Name of the stream this archive was opened from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive holds no file entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: &str, data: EntryData) {
        let path = path::normalize(name, PathStyle::Relative);
        if path.is_empty() {
            return;
        }
        let key = path::key(&path);
        if self.index.contains_key(&key) {
            tracing::debug!(path = %path, origin = %self.origin, "ignoring repeated archive entry");
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(ArchiveEntry { path, data });
    }

    fn index_zip(&mut self) -> Result<(), LocatorError> {
        let zip_err = |origin: &str, e: zip::result::ZipError| LocatorError::codec("zip", origin, e);

        let mut archive =
            ZipArchive::new(self.source.clone()).map_err(|e| zip_err(&self.origin, e))?;
        for i in 0..archive.len() {
            let (name, is_dir) = {
                let file = archive.by_index_raw(i).map_err(|e| zip_err(&self.origin, e))?;
                (file.name().to_string(), file.is_dir())
            };
            if !is_dir {
                self.push(&name, EntryData::ZipIndex(i));
            }
        }
        self.codec = Some(Codec::Zip(RefCell::new(archive)));
        Ok(())
    }

    fn index_tar(&mut self, mut stream: SharedStream) -> Result<(), LocatorError> {
        let tar_err = |origin: &str, e: std::io::Error| LocatorError::codec("tar", origin, e);

        stream
            .seek(SeekFrom::Start(0))
            .map_err(|e| tar_err(&self.origin, e))?;
        let mut found = Vec::new();
        {
            let mut archive = tar::Archive::new(stream.clone());
            for entry in archive.entries().map_err(|e| tar_err(&self.origin, e))? {
                let entry = entry.map_err(|e| tar_err(&self.origin, e))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                found.push((
                    name,
                    EntryData::Window {
                        start: entry.raw_file_position(),
                        len: entry.size(),
                    },
                ));
            }
        }
        for (name, data) in found {
            self.push(&name, data);
        }
        self.codec = Some(Codec::Tar(stream));
        Ok(())
    }

    fn index_gzip(&mut self) -> Result<(), LocatorError> {
        let gz_err = |origin: &str, e: std::io::Error| LocatorError::codec("gzip", origin, e);

        let mut decoder = GzDecoder::new(self.source.clone());
        let head = read_prefix(&mut decoder, detect::TAR_BLOCK)
            .map_err(|e| gz_err(&self.origin, e))?;

        if detect::is_tar_header(&head) {
            let mut payload = head;
            decoder
                .read_to_end(&mut payload)
                .map_err(|e| gz_err(&self.origin, e))?;
            self.format = ArchiveFormat::TarGz;
            let tar = SharedStream::new(Box::new(Cursor::new(payload)));
            return self.index_tar(tar);
        }

        let name = decoder
            .header()
            .and_then(|header| header.filename())
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .and_then(|raw| path::segments(&raw).last().map(str::to_string))
            .unwrap_or_else(|| gzip_entry_name(&self.origin));

        self.format = ArchiveFormat::GZip;
        self.push(&name, EntryData::Whole);
        self.codec = Some(Codec::GZip);
        Ok(())
    }

    fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.index.get(&path::key(path)).map(|&i| &self.entries[i])
    }

    fn codec(&self) -> Result<&Codec, LocatorError> {
        self.codec.as_ref().ok_or(LocatorError::Closed)
    }
}

impl FileLocator for ArchiveLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        self.codec()?;
        Ok(self.entry(path).is_some())
    }

    fn open(&self, path: &str) -> Result<FileStream, LocatorError> {
        let codec = self.codec()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        let entry = self.entry(path).ok_or_else(|| LocatorError::NotFound {
            path: path::normalize(path, PathStyle::Relative),
        })?;

        match (codec, entry.data) {
            (Codec::Zip(archive), EntryData::ZipIndex(i)) => {
                let mut archive = archive.borrow_mut();
                let mut file = archive
                    .by_index(i)
                    .map_err(|e| LocatorError::codec("zip", &entry.path, e))?;
                let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
                file.read_to_end(&mut data)
                    .map_err(|e| LocatorError::io("open", &entry.path, e))?;
                Ok(Box::new(Cursor::new(data)))
            }
            (Codec::Tar(stream), EntryData::Window { start, len }) => {
                Ok(Box::new(SliceReader::new(stream.clone(), start, len)))
            }
            (Codec::GZip, EntryData::Whole) => {
                let mut source = self.source.clone();
                source
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| LocatorError::io("open", &entry.path, e))?;
                let mut data = Vec::new();
                GzDecoder::new(source)
                    .read_to_end(&mut data)
                    .map_err(|e| LocatorError::codec("gzip", &entry.path, e))?;
                Ok(Box::new(Cursor::new(data)))
            }
            _ => Err(LocatorError::codec(
                "archive",
                &entry.path,
                "entry does not belong to this codec",
            )),
        }
    }

    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError> {
        self.codec()?;
        let root = root.to_string();
        Ok(FileIter::new(
            self.entries
                .iter()
                .filter(move |entry| path::starts_with(&entry.path, &root))
                .map(|entry| Ok(entry.path.clone())),
        ))
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Relative
    }

    fn close(&mut self) {
        if let Some(codec) = self.codec.take() {
            if let Codec::Tar(stream) = &codec {
                stream.release();
            }
            drop(codec);
            self.entries.clear();
            self.index.clear();
            self.source.release();
            tracing::debug!(origin = %self.origin, "closed archive locator");
        }
    }
}

impl Drop for ArchiveLocator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ArchiveLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveLocator")
            .field("format", &self.format)
            .field("origin", &self.origin)
            .field("entries", &self.entries.len())
            .field("closed", &self.codec.is_none())
            .finish()
    }
}

/// Archive signatures in detection order. [`crate::Detector::archives`] is
/// built from this table.
pub(crate) const SIGNATURES: [(&str, DetectFn, ArchiveFormat); 3] = [
    ("zip", detect::is_zip, ArchiveFormat::Zip),
    ("gzip", detect::is_gzip, ArchiveFormat::GZip),
    ("tar", detect::is_tar, ArchiveFormat::Tar),
];

/// Detect the archive format of `stream`. The stream is left at its start.
pub(crate) fn sniff(stream: &mut dyn crate::ReadSeek) -> std::io::Result<Option<ArchiveFormat>> {
    first_match(stream, SIGNATURES)
}

/// Entry name for a gzip file without a stored name: the origin's file name
/// minus its `.gz` suffix.
fn gzip_entry_name(origin: &str) -> String {
    let file_name = path::segments(origin).last().unwrap_or_default();
    let lower = file_name.to_ascii_lowercase();
    let stem = if lower.ends_with(".gz") && file_name.len() > 3 {
        &file_name[..file_name.len() - 3]
    } else {
        file_name
    };
    if stem.is_empty() {
        GZIP_FALLBACK_NAME.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocatorExt;
    use flate2::Compression;
    use std::io::Write;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut data));
            zip.add_directory("dir/", zip::write::SimpleFileOptions::default())
                .unwrap();
            for (name, content) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        data
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder.append_data(&mut dir, "dir/", std::io::empty()).unwrap();
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8], name: Option<&str>) -> Vec<u8> {
        let mut builder = flate2::GzBuilder::new();
        if let Some(name) = name {
            builder = builder.filename(name);
        }
        let mut encoder = builder.write(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn open(data: Vec<u8>, origin: &str) -> ArchiveLocator {
        ArchiveLocator::new(Box::new(Cursor::new(data)), origin).unwrap()
    }

    #[test]
    fn zip_entries_skip_directories() {
        let archive = open(zip_bytes(&[("dir/a.txt", b"a"), ("b.txt", b"bb")]), "t.zip");
        assert_eq!(archive.format(), ArchiveFormat::Zip);
        let paths = archive.enumerate_files().unwrap().collect_all().unwrap();
        assert_eq!(paths, ["dir/a.txt", "b.txt"]);
        assert!(!archive.exists("dir").unwrap());
        assert!(matches!(archive.open("dir/"), Err(LocatorError::NotFound { .. })));
        assert_eq!(archive.read("/DIR/A.TXT").unwrap(), b"a");
    }

    #[test]
    fn tar_entries_are_lazy_windows() {
        let archive = open(tar_bytes(&[("x/one", b"111"), ("two", b"2")]), "t.tar");
        assert_eq!(archive.format(), ArchiveFormat::Tar);
        assert_eq!(archive.len(), 2);

        let mut one = archive.open("x/one").unwrap();
        let mut two = archive.open("two").unwrap();
        let mut buf = String::new();
        two.read_to_string(&mut buf).unwrap();
        one.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "2111");
    }

    #[test]
    fn tar_gz_is_promoted() {
        let data = gzip(&tar_bytes(&[("inner.txt", b"inside")]), None);
        let archive = open(data, "bundle.tgz");
        assert_eq!(archive.format(), ArchiveFormat::TarGz);
        assert_eq!(archive.read("inner.txt").unwrap(), b"inside");
    }

    #[test]
    fn gzip_entry_uses_header_name() {
        let archive = open(gzip(b"payload", Some("dir/report.csv")), "x.gz");
        assert_eq!(archive.format(), ArchiveFormat::GZip);
        let paths = archive.enumerate_files().unwrap().collect_all().unwrap();
        assert_eq!(paths, ["report.csv"]);
        assert_eq!(archive.read("report.csv").unwrap(), b"payload");
    }

    #[test]
    fn gzip_entry_falls_back_to_origin_stem() {
        let archive = open(gzip(b"payload", None), "/data/notes.TXT.gz");
        assert_eq!(archive.enumerate_files().unwrap().collect_all().unwrap(), ["notes.TXT"]);
        let archive = open(gzip(b"payload", None), "");
        assert_eq!(archive.enumerate_files().unwrap().collect_all().unwrap(), ["data"]);
    }

    #[test]
    fn garbage_is_unsupported() {
        let result = ArchiveLocator::new(Box::new(Cursor::new(vec![0u8; 2048])), "zeros");
        assert!(matches!(result, Err(LocatorError::UnsupportedFormat { .. })));
    }

    #[test]
    fn corrupt_zip_is_codec_error() {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        let result = ArchiveLocator::new(Box::new(Cursor::new(data)), "bad.zip");
        assert!(matches!(result, Err(LocatorError::Codec { format: "zip", .. })));
    }

    #[test]
    fn close_releases_outstanding_streams() {
        let mut archive = open(tar_bytes(&[("a", b"abc")]), "t.tar");
        let mut stream = archive.open("a").unwrap();
        archive.close();
        archive.close();
        assert!(matches!(archive.exists("a"), Err(LocatorError::Closed)));
        assert!(stream.read(&mut [0u8; 3]).is_err());
    }

    #[test]
    fn sniff_rewinds() {
        let mut cursor = Cursor::new(zip_bytes(&[("a", b"a")]));
        cursor.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(sniff(&mut cursor).unwrap(), Some(ArchiveFormat::Zip));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn gzip_names() {
        assert_eq!(gzip_entry_name("a/b/c.txt.gz"), "c.txt");
        assert_eq!(gzip_entry_name("plain"), "plain");
        assert_eq!(gzip_entry_name(".gz"), ".gz");
        assert_eq!(gzip_entry_name(""), "data");
    }
}
