//! Sequential archive writer.

use std::collections::BTreeSet;
use std::io::{self, Read, Write};

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::path::{self, PathStyle};
use crate::stream::WriteSeek;
use crate::{
    ArchiveType, CompressionLevel, CompressionType, LocatorError, WritableFileLocator,
    WriterOptions,
};

/// Payload stored for [`create`](WritableFileLocator::create)d entries.
const PLACEHOLDER: [u8; 1] = [0];

type Sink = Box<dyn WriteSeek>;

enum Output {
    Zip(ZipWriter<Sink>),
    Tar(tar::Builder<Sink>),
    TarGz(tar::Builder<GzEncoder<Sink>>),
    GZip(GzipOutput),
}

/// A gzip file holds one member; the encoder is built when its entry arrives
/// so the header can carry the entry name.
struct GzipOutput {
    sink: Option<Sink>,
    written: bool,
}

/// Write-only locator producing a zip, tar, tar.gz or gzip archive.
///
/// Entries are appended in call order. Codec output is sealed by
/// [`finish`](WritableFileLocator::finish), which `close` and `Drop` run
/// implicitly; call `finish` yourself to observe its error.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use anyfs_locator::{ArchiveType, ArchiveWriter, WritableFileLocator, WriterOptions};
///
/// let mut writer = ArchiveWriter::new(
///     Box::new(Cursor::new(Vec::new())),
///     WriterOptions::new(ArchiveType::Zip),
/// )?;
/// writer.write("docs/readme.md", &mut &b"# hi"[..])?;
/// writer.create("docs/.keep")?;
/// assert!(writer.create("DOCS/.KEEP").is_err());
/// writer.finish()?;
/// # Ok::<(), anyfs_locator::LocatorError>(())
/// ```
pub struct ArchiveWriter {
    options: WriterOptions,
    output: Option<Output>,
    keys: BTreeSet<String>,
}

impl ArchiveWriter {
    /// Start an archive on `sink`.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnsupportedFormat`] if no writer exists for `options`
    pub fn new(sink: Box<dyn WriteSeek>, options: WriterOptions) -> Result<Self, LocatorError> {
        options.validate()?;
        let output = match (options.archive_type, options.compression) {
            (ArchiveType::Zip, _) => Output::Zip(ZipWriter::new(sink)),
            (ArchiveType::Tar, CompressionType::GZip) => {
                let encoder = GzEncoder::new(sink, flate2_level(options.level));
                Output::TarGz(tar::Builder::new(encoder))
            }
            (ArchiveType::Tar, _) => Output::Tar(tar::Builder::new(sink)),
            (ArchiveType::GZip, _) => Output::GZip(GzipOutput {
                sink: Some(sink),
                written: false,
            }),
        };
        tracing::debug!(
            archive_type = ?options.archive_type,
            compression = ?options.compression,
            level = ?options.level,
            "opened archive writer"
        );
        Ok(Self {
            options,
            output: Some(output),
            keys: BTreeSet::new(),
        })
    }

    /// Options this writer was created with.
    pub fn options(&self) -> WriterOptions {
        self.options
    }

    /// Check `path` is unclaimed, returning its normalized form. The key is
    /// recorded only after the entry has been appended.
    fn claim(&self, operation: &'static str, path: &str) -> Result<String, LocatorError> {
        if self.output.is_none() {
            return Err(LocatorError::Closed);
        }
        let normalized = path::normalize(path, PathStyle::Relative);
        if normalized.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        if self.keys.contains(&path::key(&normalized)) {
            return Err(LocatorError::duplicate(operation, normalized));
        }
        Ok(normalized)
    }

    fn append(&mut self, path: &str, data: &mut dyn Read) -> Result<(), LocatorError> {
        let level = self.options.level;
        let compression = self.options.compression;
        let output = self.output.as_mut().ok_or(LocatorError::Closed)?;
        let io_err = |e: io::Error| LocatorError::io("write", path, e);

        match output {
            Output::Zip(zip) => {
                zip.start_file(path, zip_options(compression, level))
                    .map_err(|e| LocatorError::codec("zip", path, e))?;
                io::copy(data, zip).map_err(io_err)?;
            }
            Output::Tar(builder) => append_tar(builder, path, data).map_err(io_err)?,
            Output::TarGz(builder) => append_tar(builder, path, data).map_err(io_err)?,
            Output::GZip(gzip) => {
                if gzip.written {
                    return Err(LocatorError::unsupported(format!(
                        "gzip holds a single entry, cannot add {path}"
                    )));
                }
                let sink = gzip.sink.take().ok_or(LocatorError::Closed)?;
                let mut encoder = GzBuilder::new()
                    .filename(path)
                    .write(sink, gzip_level(compression, level));
                io::copy(data, &mut encoder).map_err(io_err)?;
                gzip.sink = Some(encoder.finish().map_err(io_err)?);
                gzip.written = true;
            }
        }
        tracing::trace!(path = %path, "appended archive entry");
        Ok(())
    }

    fn seal(output: Output, level: CompressionLevel) -> Result<(), LocatorError> {
        let io_err = |e: io::Error| LocatorError::io("finish", String::new(), e);
        let mut sink = match output {
            Output::Zip(zip) => zip
                .finish()
                .map_err(|e| LocatorError::codec("zip", String::new(), e))?,
            Output::Tar(builder) => builder.into_inner().map_err(io_err)?,
            Output::TarGz(builder) => builder
                .into_inner()
                .and_then(GzEncoder::finish)
                .map_err(io_err)?,
            Output::GZip(GzipOutput {
                sink: Some(sink),
                written: false,
            }) => GzEncoder::new(sink, flate2_level(level))
                .finish()
                .map_err(io_err)?,
            Output::GZip(GzipOutput {
                sink: Some(sink), ..
            }) => sink,
            Output::GZip(GzipOutput { sink: None, .. }) => return Ok(()),
        };
        sink.flush().map_err(io_err)
    }
}

impl WritableFileLocator for ArchiveWriter {
    fn create(&mut self, path: &str) -> Result<(), LocatorError> {
        let normalized = self.claim("create", path)?;
        self.append(&normalized, &mut &PLACEHOLDER[..])?;
        self.keys.insert(path::key(&normalized));
        Ok(())
    }

    fn write(&mut self, path: &str, data: &mut dyn Read) -> Result<(), LocatorError> {
        let normalized = self.claim("write", path)?;
        self.append(&normalized, data)?;
        self.keys.insert(path::key(&normalized));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), LocatorError> {
        match self.output.take() {
            Some(output) => {
                let result = Self::seal(output, self.options.level);
                tracing::debug!(entries = self.keys.len(), ok = result.is_ok(), "finished archive");
                result
            }
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Err(err) = self.finish() {
            tracing::warn!(error = %err, "archive finalization failed during close");
        }
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("options", &self.options)
            .field("entries", &self.keys.len())
            .field("finished", &self.output.is_none())
            .finish()
    }
}

/// tar needs the size up front, so the entry is buffered.
fn append_tar<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    data: &mut dyn Read,
) -> io::Result<()> {
    let mut buf = Vec::new();
    data.read_to_end(&mut buf)?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(buf.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, path, buf.as_slice())
}

fn zip_options(compression: CompressionType, level: CompressionLevel) -> SimpleFileOptions {
    let (method, level) = match compression {
        CompressionType::None => (CompressionMethod::Stored, None),
        CompressionType::BZip2 => (
            CompressionMethod::Bzip2,
            level.numeric().map(|n| i64::from(n.max(1))),
        ),
        CompressionType::Zstd => (CompressionMethod::Zstd, level.numeric().map(i64::from)),
        _ => (CompressionMethod::Deflated, level.numeric().map(i64::from)),
    };
    SimpleFileOptions::default()
        .compression_method(method)
        .compression_level(level)
}

fn gzip_level(compression: CompressionType, level: CompressionLevel) -> Compression {
    match compression {
        CompressionType::None => Compression::none(),
        _ => flate2_level(level),
    }
}

fn flate2_level(level: CompressionLevel) -> Compression {
    level.numeric().map_or_else(Compression::default, Compression::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveFormat, ArchiveLocator, FileLocator, LocatorExt};
    use std::cell::RefCell;
    use std::io::{Cursor, Seek, SeekFrom};
    use std::rc::Rc;

    /// Sink whose bytes stay reachable after the writer is dropped.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Cursor<Vec<u8>>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedBuf {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.borrow_mut().seek(pos)
        }
    }

    impl SharedBuf {
        fn bytes(&self) -> Vec<u8> {
            self.0.borrow().get_ref().clone()
        }
    }

    fn write_entries(options: WriterOptions, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let buf = SharedBuf::default();
        let mut writer = ArchiveWriter::new(Box::new(buf.clone()), options).unwrap();
        for (path, data) in entries {
            writer.write(path, &mut &data[..]).unwrap();
        }
        writer.finish().unwrap();
        buf.bytes()
    }

    fn reopen(bytes: Vec<u8>) -> ArchiveLocator {
        ArchiveLocator::new(Box::new(Cursor::new(bytes)), "out").unwrap()
    }

    #[test]
    fn zip_roundtrip_with_each_method() {
        for compression in [
            CompressionType::None,
            CompressionType::Deflate,
            CompressionType::BZip2,
            CompressionType::Zstd,
        ] {
            let options = WriterOptions::new(ArchiveType::Zip)
                .compression(compression)
                .level(CompressionLevel::Best);
            let bytes = write_entries(options, &[("a.txt", b"alpha"), ("d/b.txt", b"beta")]);
            let archive = reopen(bytes);
            assert_eq!(archive.format(), ArchiveFormat::Zip, "{compression:?}");
            assert_eq!(archive.read("d/b.txt").unwrap(), b"beta");
        }
    }

    #[test]
    fn tar_and_tar_gz_roundtrip() {
        let plain = reopen(write_entries(
            WriterOptions::new(ArchiveType::Tar),
            &[("x", b"1"), ("y/z", b"22")],
        ));
        assert_eq!(plain.format(), ArchiveFormat::Tar);
        assert_eq!(plain.read("y/z").unwrap(), b"22");

        let gz = reopen(write_entries(
            WriterOptions::new(ArchiveType::Tar).compression(CompressionType::GZip),
            &[("x", b"1")],
        ));
        assert_eq!(gz.format(), ArchiveFormat::TarGz);
        assert_eq!(gz.read("x").unwrap(), b"1");
    }

    #[test]
    fn gzip_keeps_entry_name_and_rejects_second_entry() {
        let buf = SharedBuf::default();
        let mut writer =
            ArchiveWriter::new(Box::new(buf.clone()), WriterOptions::new(ArchiveType::GZip))
                .unwrap();
        writer.write("report.csv", &mut &b"a,b"[..]).unwrap();
        let err = writer.write("other.csv", &mut &b"c"[..]).unwrap_err();
        assert!(matches!(err, LocatorError::UnsupportedFormat { .. }));
        writer.finish().unwrap();

        let archive = reopen(buf.bytes());
        assert_eq!(archive.format(), ArchiveFormat::GZip);
        assert_eq!(archive.read("report.csv").unwrap(), b"a,b");
    }

    #[test]
    fn empty_gzip_is_still_valid() {
        let buf = SharedBuf::default();
        drop(ArchiveWriter::new(Box::new(buf.clone()), WriterOptions::new(ArchiveType::GZip)).unwrap());
        let archive = reopen(buf.bytes());
        assert_eq!(archive.format(), ArchiveFormat::GZip);
        assert_eq!(archive.read("out").unwrap(), b"");
    }

    #[test]
    fn created_entries_hold_placeholder_byte() {
        let buf = SharedBuf::default();
        let mut writer =
            ArchiveWriter::new(Box::new(buf.clone()), WriterOptions::new(ArchiveType::Zip))
                .unwrap();
        writer.create("empty").unwrap();
        writer.close();
        assert_eq!(reopen(buf.bytes()).read("empty").unwrap(), [0u8]);
    }

    #[test]
    fn duplicates_are_rejected_after_normalization() {
        let mut writer = ArchiveWriter::new(
            Box::new(Cursor::new(Vec::new())),
            WriterOptions::new(ArchiveType::Tar),
        )
        .unwrap();
        writer.write("dir/a", &mut &b"x"[..]).unwrap();
        let err = writer.create("\\DIR\\A").unwrap_err();
        assert!(matches!(err, LocatorError::DuplicateEntry { operation: "create", .. }));
    }

    /// Reader whose every read fails.
    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("source went away"))
        }
    }

    #[test]
    fn failed_write_does_not_claim_the_path() {
        let buf = SharedBuf::default();
        let mut writer =
            ArchiveWriter::new(Box::new(buf.clone()), WriterOptions::new(ArchiveType::Tar))
                .unwrap();
        let err = writer.write("a.txt", &mut BrokenReader).unwrap_err();
        assert!(matches!(err, LocatorError::Io { .. }));

        writer.write("a.txt", &mut &b"retried"[..]).unwrap();
        writer.finish().unwrap();
        let archive = reopen(buf.bytes());
        assert_eq!(archive.enumerate_files().unwrap().collect_all().unwrap(), ["a.txt"]);
        assert_eq!(archive.read("a.txt").unwrap(), b"retried");
    }

    #[test]
    fn finish_is_idempotent_and_seals() {
        let mut writer = ArchiveWriter::new(
            Box::new(Cursor::new(Vec::new())),
            WriterOptions::new(ArchiveType::Zip),
        )
        .unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.create("late"), Err(LocatorError::Closed)));
    }

    #[test]
    fn unsupported_options_are_rejected() {
        let result = ArchiveWriter::new(
            Box::new(Cursor::new(Vec::new())),
            WriterOptions::new(ArchiveType::Zip).compression(CompressionType::Lzma),
        );
        assert!(matches!(result, Err(LocatorError::UnsupportedFormat { .. })));
    }

    #[test]
    fn empty_path_is_invalid() {
        let mut writer = ArchiveWriter::new(
            Box::new(Cursor::new(Vec::new())),
            WriterOptions::new(ArchiveType::Zip),
        )
        .unwrap();
        assert!(matches!(writer.create("/"), Err(LocatorError::InvalidArgument { .. })));
    }

    #[test]
    fn written_entries_list_in_order() {
        let archive = reopen(write_entries(
            WriterOptions::new(ArchiveType::Zip),
            &[("b", b"1"), ("a", b"2")],
        ));
        let paths = archive.enumerate_files().unwrap().collect_all().unwrap();
        assert_eq!(paths, ["b", "a"]);
    }
}
