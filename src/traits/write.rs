//! Write capability for locators.

use std::io::Read;

use crate::{FileLocator, LocatorError};

/// Write access to a backing store.
///
/// A path may be created or written at most once per locator lifetime;
/// the second attempt on the same normalized path fails with
/// [`LocatorError::DuplicateEntry`] and leaves the first content untouched.
///
/// Writes reach the backing store immediately, except where the codec
/// buffers output until [`finish`](Self::finish).
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn WritableFileLocator`.
pub trait WritableFileLocator {
    /// Create an empty file at `path`.
    ///
    /// Archive writers store a single `0x00` byte because some formats cannot
    /// represent zero-length entries; such an entry reads back as one byte.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::InvalidArgument`] if `path` is empty
    /// - [`LocatorError::DuplicateEntry`] if `path` was already created or written
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    fn create(&mut self, path: &str) -> Result<(), LocatorError>;

    /// Write the full contents of `data` to `path`.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::InvalidArgument`] if `path` is empty
    /// - [`LocatorError::DuplicateEntry`] if `path` was already created or written
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    /// - propagated I/O failures from reading `data` or writing the store
    fn write(&mut self, path: &str, data: &mut dyn Read) -> Result<(), LocatorError>;

    /// Copy every file of `source` into this locator.
    ///
    /// # Errors
    ///
    /// Stops at the first failure. Entries written before it stay written.
    fn write_all(&mut self, source: &dyn FileLocator) -> Result<(), LocatorError> {
        self.write_all_in(source, "")
    }

    /// Copy every file of `source` under `root` into this locator, keeping
    /// each path as `source` reports it.
    ///
    /// # Errors
    ///
    /// Stops at the first failure. Entries written before it stay written.
    fn write_all_in(&mut self, source: &dyn FileLocator, root: &str) -> Result<(), LocatorError> {
        for path in source.enumerate_files_in(root)? {
            let path = path?;
            let mut stream = source.open(&path)?;
            tracing::trace!(path = %path, "copying entry");
            self.write(&path, &mut stream)?;
        }
        Ok(())
    }

    /// Finalize buffered codec output and report its failure.
    ///
    /// Idempotent. Writing after `finish` fails with
    /// [`LocatorError::Closed`] for writers whose output is sealed.
    fn finish(&mut self) -> Result<(), LocatorError>;

    /// Release every resource the locator holds.
    ///
    /// Runs [`finish`](Self::finish) first where needed; a failure there is
    /// logged, not returned. Idempotent and infallible.
    fn close(&mut self);
}
