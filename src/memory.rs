//! In-memory locator.
//!
//! A mapping from normalized path to an owned byte buffer. Never produced by
//! detection; callers construct it directly, typically as a staging area.

use std::io::{Cursor, Read};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::path::{self, PathStyle};
use crate::{FileIter, FileLocator, FileStream, LocatorError, WritableFileLocator};

#[derive(Debug, Clone)]
struct MemoryFile {
    path: String,
    data: Arc<[u8]>,
}

/// Readable and writable locator backed by memory.
///
/// Paths use [`PathStyle::Relative`]. Enumeration yields files in the order
/// they were created or written. Opened streams share the buffer with the
/// locator and stay readable after it is closed.
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{FileLocator, MemoryLocator, WritableFileLocator};
///
/// let mut memory = MemoryLocator::new();
/// memory.create("test1").unwrap();
/// memory.write("/test2", &mut &b"payload"[..]).unwrap();
///
/// let paths = memory.enumerate_files().unwrap().collect_all().unwrap();
/// assert_eq!(paths, ["test1", "test2"]);
/// assert!(memory.create("TEST1").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryLocator {
    files: IndexMap<String, MemoryFile>,
    closed: bool,
}

impl MemoryLocator {
    /// Create an empty locator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files held.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file has been created or written.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop every file. Paths may be written again afterwards.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    fn ensure_open(&self) -> Result<(), LocatorError> {
        if self.closed {
            Err(LocatorError::Closed)
        } else {
            Ok(())
        }
    }

    fn insert(
        &mut self,
        operation: &'static str,
        path: &str,
        data: Arc<[u8]>,
    ) -> Result<(), LocatorError> {
        let normalized = path::normalize(path, PathStyle::Relative);
        match self.files.entry(path::key(&normalized)) {
            indexmap::map::Entry::Occupied(_) => Err(LocatorError::duplicate(operation, normalized)),
            indexmap::map::Entry::Vacant(slot) => {
                tracing::trace!(path = %normalized, len = data.len(), operation, "memory entry stored");
                slot.insert(MemoryFile {
                    path: normalized,
                    data,
                });
                Ok(())
            }
        }
    }
}

impl FileLocator for MemoryLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        self.ensure_open()?;
        Ok(self.files.contains_key(&path::key(path)))
    }

    fn open(&self, path: &str) -> Result<FileStream, LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        let file = self
            .files
            .get(&path::key(path))
            .ok_or_else(|| LocatorError::NotFound {
                path: path::normalize(path, PathStyle::Relative),
            })?;
        Ok(Box::new(Cursor::new(Arc::clone(&file.data))))
    }

    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError> {
        self.ensure_open()?;
        let root = root.to_string();
        Ok(FileIter::new(
            self.files
                .values()
                .filter(move |file| path::starts_with(&file.path, &root))
                .map(|file| Ok(file.path.clone())),
        ))
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Relative
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.files.clear();
        }
    }
}

impl WritableFileLocator for MemoryLocator {
    fn create(&mut self, path: &str) -> Result<(), LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        self.insert("create", path, Arc::from(Vec::new()))
    }

    fn write(&mut self, path: &str, data: &mut dyn Read) -> Result<(), LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        if self.files.contains_key(&path::key(path)) {
            return Err(LocatorError::duplicate(
                "write",
                path::normalize(path, PathStyle::Relative),
            ));
        }
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)
            .map_err(|e| LocatorError::io("write", path, e))?;
        self.insert("write", path, Arc::from(buf))
    }

    fn finish(&mut self) -> Result<(), LocatorError> {
        Ok(())
    }

    fn close(&mut self) {
        FileLocator::close(self);
    }
}

impl Drop for MemoryLocator {
    fn drop(&mut self) {
        FileLocator::close(self);
    }
}
