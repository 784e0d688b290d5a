//! Core types: archive/disc kinds and writer configuration.

use crate::LocatorError;

/// Archive container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ArchiveType {
    /// PKZIP archive.
    Zip,
    /// POSIX tar archive, optionally gzip-compressed.
    Tar,
    /// Single-entry gzip stream.
    GZip,
}

/// Compression algorithm applied by an archive writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompressionType {
    /// Store entries uncompressed.
    None,
    /// DEFLATE.
    Deflate,
    /// gzip framing around DEFLATE.
    GZip,
    /// bzip2.
    BZip2,
    /// LZMA. Readable inside zip archives, no writer is available.
    Lzma,
    /// Zstandard.
    Zstd,
}

/// Compression effort, mapped onto each codec's own scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompressionLevel {
    /// Level 0.
    None,
    /// Fastest compression.
    Fastest,
    /// The codec's default level.
    #[default]
    Default,
    /// Best compression.
    Best,
    /// Explicit level on the 0..=9 scale.
    Level(u8),
}

impl CompressionLevel {
    /// The level on the 0..=9 scale, or `None` for the codec default.
    pub fn numeric(self) -> Option<u32> {
        match self {
            CompressionLevel::None => Some(0),
            CompressionLevel::Fastest => Some(1),
            CompressionLevel::Default => None,
            CompressionLevel::Best => Some(9),
            CompressionLevel::Level(level) => Some(u32::from(level.min(9))),
        }
    }
}

/// Writer selection for an archive locator.
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{ArchiveType, CompressionLevel, CompressionType, WriterOptions};
///
/// let options = WriterOptions::new(ArchiveType::Zip).level(CompressionLevel::Best);
/// assert_eq!(options.compression, CompressionType::Deflate);
///
/// let tgz = WriterOptions::new(ArchiveType::Tar).compression(CompressionType::GZip);
/// assert!(tgz.validate().is_ok());
///
/// let bad = WriterOptions::new(ArchiveType::Zip).compression(CompressionType::Lzma);
/// assert!(bad.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriterOptions {
    /// Container kind.
    pub archive_type: ArchiveType,
    /// Compression algorithm.
    pub compression: CompressionType,
    /// Compression effort.
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: CompressionLevel,
}

impl WriterOptions {
    /// Options for `archive_type` with its default compression.
    pub fn new(archive_type: ArchiveType) -> Self {
        let compression = match archive_type {
            ArchiveType::Zip => CompressionType::Deflate,
            ArchiveType::Tar => CompressionType::None,
            ArchiveType::GZip => CompressionType::GZip,
        };
        Self {
            archive_type,
            compression,
            level: CompressionLevel::Default,
        }
    }

    /// Replace the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Replace the compression level.
    pub fn level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// Check that a writer exists for this archive/compression pair.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnsupportedFormat`] for pairs without a writer
    pub fn validate(&self) -> Result<(), LocatorError> {
        use CompressionType as C;

        let supported = match self.archive_type {
            ArchiveType::Zip => matches!(self.compression, C::None | C::Deflate | C::BZip2 | C::Zstd),
            ArchiveType::Tar => matches!(self.compression, C::None | C::GZip),
            ArchiveType::GZip => matches!(self.compression, C::None | C::Deflate | C::GZip),
        };

        if supported {
            Ok(())
        } else {
            Err(LocatorError::unsupported(format!(
                "no {:?} writer with {:?} compression",
                self.archive_type, self.compression
            )))
        }
    }

    /// Most entries a writer with these options can hold, if bounded. A
    /// gzip file holds a single member.
    pub fn max_entries(&self) -> Option<usize> {
        match self.archive_type {
            ArchiveType::GZip => Some(1),
            ArchiveType::Zip | ArchiveType::Tar => None,
        }
    }
}

/// Archive format recognized by content detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// PKZIP.
    Zip,
    /// Uncompressed tar.
    Tar,
    /// Single-entry gzip.
    GZip,
    /// gzip-compressed tar.
    TarGz,
}

/// Disc filesystem recognized by content detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscFormat {
    /// ECMA-119 / ISO9660.
    Iso9660,
    /// ECMA-167 / UDF.
    Udf,
}
