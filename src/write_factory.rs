//! # Write-side Factories
//!
//! New archives have no content to sniff, so writers are chosen by file
//! extension or by explicit [`WriterOptions`].
//!
//! | Extension | Writer |
//! |-----------|--------|
//! | `.zip` | [`ArchiveWriter`], zip, Deflate at [`CompressionLevel::Best`] |
//! | `.gz` | [`ArchiveWriter`], gzip, default level |
//! | none | [`SystemLocator`] over the existing directory |
//! | anything else | [`LocatorError::UnsupportedFormat`] |
//!
//! Opening a writer over an existing, non-empty archive rewrites it in
//! place: the old entries are staged into a [`MemoryLocator`], the file is
//! truncated, and the staged entries are written back before the writer is
//! returned. New writes then land next to the old entries. Staged entries
//! are checked against the new writer before anything is truncated, and a
//! `.gz` file holding a tar.gz is reopened as tar.gz.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::{
    ArchiveFormat, ArchiveLocator, ArchiveType, ArchiveWriter, CompressionLevel, CompressionType,
    FileLocator, LocatorError, MemoryLocator, SystemLocator, WritableFileLocator, WriteSeek,
    WriterOptions,
};

/// Entries of an existing archive, held while its file is rewritten.
struct Staged {
    format: ArchiveFormat,
    entries: MemoryLocator,
}

/// Pick a writer for `path` by its extension.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::UnsupportedFormat`] for an unmapped extension
/// - [`LocatorError::NotFound`] if an extension-less `path` is not an existing directory
/// - staging failures, see [`create_archive_writer`]
///
/// # Example
///
/// ```rust,no_run
/// use anyfs_locator::{create_write_locator, WritableFileLocator};
///
/// let mut out = create_write_locator("/tmp/bundle.zip")?;
/// out.write("readme.txt", &mut &b"hello"[..])?;
/// out.finish()?;
/// # Ok::<(), anyfs_locator::LocatorError>(())
/// ```
pub fn create_write_locator(
    path: impl AsRef<Path>,
) -> Result<Box<dyn WritableFileLocator>, LocatorError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LocatorError::missing("path"));
    }
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        None => Ok(Box::new(SystemLocator::new(path)?)),
        Some("zip") => {
            let options = WriterOptions::new(ArchiveType::Zip)
                .compression(CompressionType::Deflate)
                .level(CompressionLevel::Best);
            Ok(Box::new(create_archive_writer(path, options)?))
        }
        Some("gz") => {
            let staged = stage_existing(path)?;
            let options = match staged.as_ref().map(|staged| staged.format) {
                Some(ArchiveFormat::TarGz) => {
                    WriterOptions::new(ArchiveType::Tar).compression(CompressionType::GZip)
                }
                _ => WriterOptions::new(ArchiveType::GZip),
            }
            .level(CompressionLevel::Default);
            Ok(Box::new(rewrite(path, options, staged)?))
        }
        Some(other) => Err(LocatorError::unsupported(format!(
            "no writer for extension {other:?}"
        ))),
    }
}

/// Open an archive writer over a host file, keeping any entries the file
/// already holds.
///
/// # Errors
///
/// - [`LocatorError::InvalidArgument`] if `path` is empty
/// - [`LocatorError::UnsupportedFormat`] if `options` name an unsupported
///   pair, the existing file is no known archive, or it holds more entries
///   than the chosen writer can take; the file is left untouched
/// - propagated I/O and codec failures from staging or truncating
pub fn create_archive_writer(
    path: impl AsRef<Path>,
    options: WriterOptions,
) -> Result<ArchiveWriter, LocatorError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LocatorError::missing("path"));
    }
    options.validate()?;
    let staged = stage_existing(path)?;
    rewrite(path, options, staged)
}

/// Truncate `path` and start a writer over it, replaying `staged` first.
fn rewrite(
    path: &Path,
    options: WriterOptions,
    staged: Option<Staged>,
) -> Result<ArchiveWriter, LocatorError> {
    options.validate()?;
    if let (Some(staged), Some(max)) = (&staged, options.max_entries()) {
        if staged.entries.len() > max {
            return Err(LocatorError::unsupported(format!(
                "{} holds {} entries, a {:?} writer takes at most {max}",
                path.display(),
                staged.entries.len(),
                options.archive_type
            )));
        }
    }

    let file = File::create(path)
        .map_err(|e| LocatorError::io("create", path.display().to_string(), e))?;
    let mut writer = ArchiveWriter::new(Box::new(BufWriter::new(file)), options)?;
    if let Some(staged) = staged {
        writer.write_all(&staged.entries)?;
    }
    Ok(writer)
}

/// Open an archive writer over a caller-provided sink. Nothing is staged.
///
/// # Errors
///
/// - [`LocatorError::UnsupportedFormat`] if `options` name an unsupported pair
pub fn create_archive_writer_to_stream(
    sink: Box<dyn WriteSeek>,
    options: WriterOptions,
) -> Result<ArchiveWriter, LocatorError> {
    ArchiveWriter::new(sink, options)
}

/// Read every entry of a non-empty archive at `path` into memory. The
/// reader is closed before returning so the file can be truncated.
fn stage_existing(path: &Path) -> Result<Option<Staged>, LocatorError> {
    let len = match path.metadata() {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Ok(None),
    };
    if len == 0 {
        return Ok(None);
    }

    let origin = path.display().to_string();
    let file = File::open(path).map_err(|e| LocatorError::io("open", origin.clone(), e))?;
    let mut reader = ArchiveLocator::new(Box::new(BufReader::new(file)), origin)?;
    let mut entries = MemoryLocator::new();
    entries.write_all(&reader)?;
    let format = reader.format();
    reader.close();
    tracing::debug!(
        path = %path.display(),
        bytes = len,
        format = ?format,
        entries = entries.len(),
        "staged existing archive for rewrite"
    );
    Ok(Some(Staged { format, entries }))
}
