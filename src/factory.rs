//! # Read-side Factories
//!
//! Entry points that pick a backing store from a host path, a stream, or a
//! path inside an existing locator.
//!
//! Detection looks at content, never at extensions. A [`Detector`] is an
//! ordered list of [`FormatProbe`]s; the first probe whose predicate matches
//! builds the locator. The stream is rewound before each probe and before it
//! is handed over, so probes may read freely.
//!
//! | Detector | Probes, in order |
//! |----------|------------------|
//! | [`Detector::archives`] | zip, gzip (including tar.gz), tar |
//! | [`Detector::discs`] | iso9660, udf |
//!
//! A stream that matches nothing is dropped before
//! [`LocatorError::UnsupportedFormat`] is returned.

use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::archive::{self, ArchiveLocator};
use crate::disc::{self, DiscLocator};
use crate::{
    ArchiveFormat, DiscFormat, FileLocator, FileStream, LocatorError, ReadSeek, SystemLocator,
};

/// Signature test run against a rewound stream.
pub type DetectFn = fn(&mut dyn ReadSeek) -> io::Result<bool>;

/// Builds a locator over a stream that passed the matching [`DetectFn`].
/// The second argument names the stream's origin.
pub type OpenFn = fn(FileStream, &str) -> Result<Box<dyn FileLocator>, LocatorError>;

/// One format a [`Detector`] can recognize.
#[derive(Debug, Clone, Copy)]
pub struct FormatProbe {
    /// Short name used in logs.
    pub name: &'static str,
    /// Signature test.
    pub detect: DetectFn,
    /// Locator constructor.
    pub open: OpenFn,
}

/// Ordered list of format probes.
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{Detector, LocatorError};
/// use std::io::Cursor;
///
/// let err = Detector::archives()
///     .open_stream(Box::new(Cursor::new(vec![0u8; 4096])), "zeros")
///     .err()
///     .unwrap();
/// assert!(matches!(err, LocatorError::UnsupportedFormat { .. }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Detector {
    probes: Vec<FormatProbe>,
}

impl Detector {
    /// A detector with no probes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive containers: zip, then gzip, then tar.
    pub fn archives() -> Self {
        archive::SIGNATURES
            .into_iter()
            .fold(Self::new(), |detector, (name, detect, format)| {
                detector.with(FormatProbe {
                    name,
                    detect,
                    open: archive_opener(format),
                })
            })
    }

    /// Disc images: ISO9660, then UDF.
    pub fn discs() -> Self {
        disc::SIGNATURES
            .into_iter()
            .fold(Self::new(), |detector, (name, detect, format)| {
                detector.with(FormatProbe {
                    name,
                    detect,
                    open: disc_opener(format),
                })
            })
    }

    /// Append a probe; it runs after every probe already registered.
    #[must_use]
    pub fn with(mut self, probe: FormatProbe) -> Self {
        self.probes.push(probe);
        self
    }

    /// Registered probes in priority order.
    pub fn probes(&self) -> &[FormatProbe] {
        &self.probes
    }

    /// First probe matching `stream`. The stream is left at its start.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from seeking or reading the stream.
    pub fn detect(&self, stream: &mut dyn ReadSeek) -> io::Result<Option<&FormatProbe>> {
        first_match(stream, self.probes.iter().map(|probe| (probe.name, probe.detect, probe)))
    }

    /// Detect the format of `stream` and build its locator.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnsupportedFormat`] if no probe matches
    /// - whatever the matching constructor fails with
    pub fn open_stream(
        &self,
        mut stream: FileStream,
        origin: &str,
    ) -> Result<Box<dyn FileLocator>, LocatorError> {
        let probe = self
            .detect(stream.as_mut())
            .map_err(|e| LocatorError::io("detect", origin, e))?
            .copied();
        match probe {
            Some(probe) => {
                tracing::debug!(probe = probe.name, origin = %origin, "detected format");
                (probe.open)(stream, origin)
            }
            None => {
                let names: Vec<_> = self.probes.iter().map(|p| p.name).collect();
                Err(LocatorError::unsupported(format!(
                    "{origin:?} matched none of: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

/// Run `candidates` in order against `stream` and return the payload of the
/// first whose test passes. The stream is rewound before each test and is
/// left at its start.
pub(crate) fn first_match<T>(
    stream: &mut dyn ReadSeek,
    candidates: impl IntoIterator<Item = (&'static str, DetectFn, T)>,
) -> io::Result<Option<T>> {
    for (name, detect, payload) in candidates {
        stream.seek(SeekFrom::Start(0))?;
        let matched = detect(stream)?;
        tracing::debug!(probe = name, matched, "format probe");
        if matched {
            stream.seek(SeekFrom::Start(0))?;
            return Ok(Some(payload));
        }
    }
    stream.seek(SeekFrom::Start(0))?;
    Ok(None)
}

fn archive_opener(format: ArchiveFormat) -> OpenFn {
    match format {
        ArchiveFormat::Zip => open_zip,
        ArchiveFormat::GZip | ArchiveFormat::TarGz => open_gzip,
        ArchiveFormat::Tar => open_tar,
    }
}

fn disc_opener(format: DiscFormat) -> OpenFn {
    match format {
        DiscFormat::Iso9660 => open_iso,
        DiscFormat::Udf => open_udf,
    }
}

fn open_zip(stream: FileStream, origin: &str) -> Result<Box<dyn FileLocator>, LocatorError> {
    Ok(Box::new(ArchiveLocator::with_format(stream, ArchiveFormat::Zip, origin)?))
}

fn open_gzip(stream: FileStream, origin: &str) -> Result<Box<dyn FileLocator>, LocatorError> {
    Ok(Box::new(ArchiveLocator::with_format(stream, ArchiveFormat::GZip, origin)?))
}

fn open_tar(stream: FileStream, origin: &str) -> Result<Box<dyn FileLocator>, LocatorError> {
    Ok(Box::new(ArchiveLocator::with_format(stream, ArchiveFormat::Tar, origin)?))
}

fn open_iso(stream: FileStream, _origin: &str) -> Result<Box<dyn FileLocator>, LocatorError> {
    Ok(Box::new(DiscLocator::with_format(stream, DiscFormat::Iso9660)?))
}

fn open_udf(stream: FileStream, _origin: &str) -> Result<Box<dyn FileLocator>, LocatorError> {
    Ok(Box::new(DiscLocator::with_format(stream, DiscFormat::Udf)?))
}

fn open_host_file(path: &Path) -> Result<FileStream, LocatorError> {
    let file = File::open(path).map_err(|e| LocatorError::io("open", path.display().to_string(), e))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Open a host path: a directory becomes a [`SystemLocator`], a file is
/// sniffed as an archive.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::NotFound`] if nothing exists at `path`
/// - [`LocatorError::UnsupportedFormat`] if a file is no known archive
pub fn create_read_locator(path: impl AsRef<Path>) -> Result<Box<dyn FileLocator>, LocatorError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LocatorError::missing("path"));
    }
    if path.is_dir() {
        tracing::debug!(path = %path.display(), "host directory");
        return Ok(Box::new(SystemLocator::new(path)?));
    }
    if !path.is_file() {
        return Err(LocatorError::NotFound {
            path: path.display().to_string(),
        });
    }
    let stream = open_host_file(path)?;
    Detector::archives().open_stream(stream, &path.display().to_string())
}

/// Open `path` inside `parent`.
///
/// A file is opened through `parent` and sniffed as an archive; the child
/// owns that stream and releases it on close. A path with files beneath it
/// becomes a read-only [`SystemLocator::layered`] view. `parent` is only
/// borrowed and stays usable after the child is closed.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::NotFound`] if `parent` has neither a file nor files under `path`
/// - [`LocatorError::UnsupportedFormat`] if the file is no known archive
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{create_read_locator_in, FileLocator, MemoryLocator, WritableFileLocator};
///
/// let mut memory = MemoryLocator::new();
/// memory.write("docs/a.txt", &mut &b"a"[..]).unwrap();
///
/// let docs = create_read_locator_in(&memory, "docs").unwrap();
/// assert!(docs.exists("/a.txt").unwrap());
/// ```
pub fn create_read_locator_in<'a>(
    parent: &'a dyn FileLocator,
    path: &str,
) -> Result<Box<dyn FileLocator + 'a>, LocatorError> {
    if path.is_empty() {
        return Err(LocatorError::missing("path"));
    }
    if parent.exists(path)? {
        let stream = parent.open(path)?;
        return Ok(Detector::archives().open_stream(stream, path)?);
    }
    match parent.enumerate_files_in(path)?.next() {
        Some(Ok(_)) => {
            tracing::debug!(path = %path, "layered directory view");
            Ok(Box::new(SystemLocator::layered(parent, path)?))
        }
        Some(Err(err)) => Err(err),
        None => Err(LocatorError::NotFound {
            path: path.to_string(),
        }),
    }
}

/// Sniff `stream` as an archive.
///
/// # Errors
///
/// - [`LocatorError::UnsupportedFormat`] if no archive signature matches
pub fn create_read_locator_from_stream(stream: FileStream) -> Result<Box<dyn FileLocator>, LocatorError> {
    Detector::archives().open_stream(stream, "")
}

/// Open a disc image on the host.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::NotFound`] if `path` is not a file
/// - [`LocatorError::UnsupportedFormat`] if it is neither ISO9660 nor UDF
pub fn create_disc_locator(path: impl AsRef<Path>) -> Result<Box<dyn FileLocator>, LocatorError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LocatorError::missing("path"));
    }
    if !path.is_file() {
        return Err(LocatorError::NotFound {
            path: path.display().to_string(),
        });
    }
    let stream = open_host_file(path)?;
    Detector::discs().open_stream(stream, &path.display().to_string())
}

/// Open the disc image at `path` inside `parent`. The child owns the
/// stream it opened and releases it on close.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::NotFound`] if `parent` has no file at `path`
/// - [`LocatorError::UnsupportedFormat`] if it is neither ISO9660 nor UDF
pub fn create_disc_locator_in(
    parent: &dyn FileLocator,
    path: &str,
) -> Result<Box<dyn FileLocator>, LocatorError> {
    if path.is_empty() {
        return Err(LocatorError::missing("path"));
    }
    let stream = parent.open(path)?;
    Detector::discs().open_stream(stream, path)
}

/// Sniff `stream` as a disc image.
///
/// # Errors
///
/// - [`LocatorError::UnsupportedFormat`] if it is neither ISO9660 nor UDF
pub fn create_disc_locator_from_stream(stream: FileStream) -> Result<Box<dyn FileLocator>, LocatorError> {
    Detector::discs().open_stream(stream, "")
}
