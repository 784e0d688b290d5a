//! # anyfs-locator
//!
//! Stackable **file locators**: one read/write API over host directories,
//! in-memory trees, archives and disc images, with content-based format
//! detection and locators layered inside other locators.
//!
//! ---
//!
//! ## Quick Start
//!
//! Most callers only need the factories and [`FileLocator`]:
//!
//! ```rust,no_run
//! use anyfs_locator::{create_read_locator, create_read_locator_in, LocatorExt};
//!
//! // A directory, or a zip/tar/tar.gz/gzip file sniffed by content
//! let bundle = create_read_locator("/data/bundle.zip")?;
//! for path in bundle.enumerate_files_in("configs")? {
//!     let path = path?;
//!     println!("{path}: {} bytes", bundle.read(&path)?.len());
//! }
//!
//! // An archive stored inside the archive
//! let nested = create_read_locator_in(bundle.as_ref(), "inner/assets.tar")?;
//! println!("{} files", nested.file_count("")?);
//! # Ok::<(), anyfs_locator::LocatorError>(())
//! ```
//!
//! ---
//!
//! ## Backing Stores
//!
//! | Type | Backing | Read | Write | Path style |
//! |------|---------|------|-------|------------|
//! | [`SystemLocator`] | host directory, or a subtree of a parent locator | yes | host mode | `/a/b` |
//! | [`MemoryLocator`] | path → bytes map | yes | yes | `a/b` |
//! | [`ArchiveLocator`] | zip, tar, tar.gz, gzip stream | yes | no | `a/b` |
//! | [`ArchiveWriter`] | zip, tar, tar.gz, gzip sink | no | yes | `a/b` |
//! | [`DiscLocator`] | ISO9660 or UDF image | yes | no | `/a/b` |
//!
//! Path comparison ignores case and separator style everywhere; see
//! [`path`].
//!
//! ---
//!
//! ## Factories
//!
//! | Function | Picks by |
//! |----------|----------|
//! | [`create_read_locator`] | directory, else archive content |
//! | [`create_read_locator_in`] | file in parent → archive content, else layered directory view |
//! | [`create_read_locator_from_stream`] | archive content |
//! | [`create_disc_locator`], [`create_disc_locator_in`], [`create_disc_locator_from_stream`] | ISO9660, then UDF |
//! | [`create_write_locator`] | extension: `.zip`, `.gz`, or none for a directory |
//! | [`create_archive_writer`], [`create_archive_writer_to_stream`] | explicit [`WriterOptions`] |
//!
//! Detection is an ordered list of probes held by a [`Detector`]; register
//! extra formats with [`Detector::with`].
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, LocatorError>`. Errors carry the path
//! and operation involved:
//!
//! ```rust
//! use anyfs_locator::LocatorError;
//!
//! let err = LocatorError::NotFound { path: "/missing.txt".into() };
//! assert_eq!(err.to_string(), "not found: /missing.txt");
//! ```
//!
//! ---
//!
//! ## Lifecycle
//!
//! Locators are single-threaded. `close` is idempotent and infallible, and
//! `Drop` calls it. A locator opened inside a parent owns the stream it got
//! from the parent and releases it on close; the parent itself is only
//! borrowed and stays usable.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialize [`WriterOptions`] and friends; enables [`LocatorExtJson`] |

// Private modules
mod archive;
mod disc;
mod error;
mod ext;
mod factory;
mod memory;
mod stream;
mod system;
mod traits;
mod types;
mod write_factory;

pub mod path;

// Public re-exports - error types
pub use error::LocatorError;

// Public re-exports - configuration and format types
pub use types::{
    ArchiveFormat, ArchiveType, CompressionLevel, CompressionType, DiscFormat, WriterOptions,
};

// Public re-exports - capability traits
pub use traits::{FileIter, FileLocator, WritableFileLocator};

// Public re-exports - streams
pub use stream::{FileStream, ReadSeek, SharedStream, SliceReader, WriteSeek};

// Public re-exports - backing stores
pub use archive::{ArchiveLocator, ArchiveWriter};
pub use disc::DiscLocator;
pub use memory::MemoryLocator;
pub use system::SystemLocator;

// Public re-exports - factories
pub use factory::{
    DetectFn, Detector, FormatProbe, OpenFn, create_disc_locator, create_disc_locator_from_stream,
    create_disc_locator_in, create_read_locator, create_read_locator_from_stream,
    create_read_locator_in,
};
pub use write_factory::{create_archive_writer, create_archive_writer_to_stream, create_write_locator};

// Public re-exports - infrastructure
pub use ext::LocatorExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::LocatorExtJson;
