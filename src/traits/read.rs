//! Read capability for locators.

use crate::path::PathStyle;
use crate::{FileStream, LocatorError};

/// Read access to a backing store.
///
/// Paths are virtual paths (see [`crate::path`]); each method normalizes its
/// input in the locator's [`PathStyle`] before looking it up.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FileLocator`.
pub trait FileLocator {
    /// Check whether `path` names a file.
    ///
    /// Directories are not files: `exists` returns `Ok(false)` for them.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    /// - propagated I/O or codec failures
    fn exists(&self, path: &str) -> Result<bool, LocatorError>;

    /// Open the file at `path` for reading.
    ///
    /// The returned stream is owned by the caller and positioned at the start.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::InvalidArgument`] if `path` is empty
    /// - [`LocatorError::NotFound`] if the path is absent or names a directory
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    fn open(&self, path: &str) -> Result<FileStream, LocatorError>;

    /// Lazily enumerate every file in the locator.
    ///
    /// Each call starts a fresh walk.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    fn enumerate_files(&self) -> Result<FileIter<'_>, LocatorError> {
        self.enumerate_files_in("")
    }

    /// Lazily enumerate the files under `root`.
    ///
    /// Yields exactly the paths `p` of [`enumerate_files`](Self::enumerate_files)
    /// for which [`path::starts_with(p, root)`](crate::path::starts_with) holds.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Closed`] after [`close`](Self::close)
    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError>;

    /// Normalization flavor of the paths this locator yields.
    fn path_style(&self) -> PathStyle;

    /// Release every resource the locator holds.
    ///
    /// Idempotent and infallible. A locator opened through a parent releases
    /// the stream it obtained from that parent, never the parent itself.
    fn close(&mut self);
}

/// Lazy sequence of virtual paths produced by enumeration.
///
/// - Outer `Result` (from [`FileLocator::enumerate_files_in`]) = "can the
///   walk start?"
/// - Inner `Result` (per item) = "could this entry be read?"
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{FileLocator, LocatorError};
///
/// fn text_files(locator: &dyn FileLocator) -> Result<Vec<String>, LocatorError> {
///     let mut names = Vec::new();
///     for path in locator.enumerate_files()? {
///         let path = path?;
///         if path.ends_with(".txt") {
///             names.push(path);
///         }
///     }
///     Ok(names)
/// }
/// ```
pub struct FileIter<'a>(Box<dyn Iterator<Item = Result<String, LocatorError>> + 'a>);

impl<'a> FileIter<'a> {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<String, LocatorError>> + 'a,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(paths: Vec<Result<String, LocatorError>>) -> Self {
        Self(Box::new(paths.into_iter()))
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Self(Box::new(std::iter::empty()))
    }

    /// Collect all paths, short-circuiting on the first error.
    pub fn collect_all(self) -> Result<Vec<String>, LocatorError> {
        self.collect()
    }
}

impl Iterator for FileIter<'_> {
    type Item = Result<String, LocatorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl std::fmt::Debug for FileIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIter").finish_non_exhaustive()
    }
}
