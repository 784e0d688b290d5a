//! # Extension Traits
//!
//! Convenience methods for any locator.
//!
//! ## Overview
//!
//! [`LocatorExt`] provides commonly-needed helpers that aren't part of the
//! capability traits. They are default methods with a blanket
//! implementation, so every [`FileLocator`] (including `dyn FileLocator`)
//! gets them for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`read`](LocatorExt::read) | Read a whole file into memory |
//! | [`read_to_string`](LocatorExt::read_to_string) | Read a whole file as UTF-8 |
//! | [`file_count`](LocatorExt::file_count) | Count the files under a root |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, [`LocatorExtJson::read_json`] reads and
//! deserializes a JSON file.
//!
//! Enable with:
//! ```toml
//! [dependencies]
//! anyfs-locator = { version = "0.1", features = ["serde"] }
//! ```

use std::io::Read;

use crate::{FileLocator, LocatorError};

/// Extension methods for any locator.
///
/// # Example
///
/// ```rust
/// use anyfs_locator::{LocatorExt, MemoryLocator, WritableFileLocator};
///
/// let mut memory = MemoryLocator::new();
/// memory.write("notes/todo.txt", &mut &b"ship it"[..]).unwrap();
///
/// assert_eq!(memory.read_to_string("notes/todo.txt").unwrap(), "ship it");
/// assert_eq!(memory.file_count("notes").unwrap(), 1);
/// ```
pub trait LocatorExt: FileLocator {
    /// Read the entire file into a byte vector.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::NotFound`] if the path is absent
    /// - propagated I/O failures while reading
    fn read(&self, path: &str) -> Result<Vec<u8>, LocatorError> {
        let mut stream = self.open(path)?;
        let mut data = Vec::new();
        stream
            .read_to_end(&mut data)
            .map_err(|e| LocatorError::io("read", path, e))?;
        Ok(data)
    }

    /// Read the entire file as UTF-8.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::NotFound`] if the path is absent
    /// - [`LocatorError::InvalidData`] if the content is not valid UTF-8
    fn read_to_string(&self, path: &str) -> Result<String, LocatorError> {
        let data = self.read(path)?;
        String::from_utf8(data).map_err(|e| LocatorError::InvalidData {
            path: path.to_string(),
            details: e.to_string(),
        })
    }

    /// Count the files under `root` (`""` for all of them).
    ///
    /// # Errors
    ///
    /// Propagates the first enumeration failure.
    fn file_count(&self, root: &str) -> Result<usize, LocatorError> {
        let mut count = 0;
        for path in self.enumerate_files_in(root)? {
            path?;
            count += 1;
        }
        Ok(count)
    }
}

// Blanket implementation - any locator gets LocatorExt for free
impl<L: FileLocator + ?Sized> LocatorExt for L {}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::de::DeserializeOwned;

    /// JSON deserialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait LocatorExtJson: FileLocator {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - `LocatorError::NotFound`: file doesn't exist
        /// - `LocatorError::InvalidData`: file isn't valid UTF-8
        /// - `LocatorError::Deserialization`: JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LocatorError> {
            let data = self.read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| LocatorError::Deserialization(e.to_string()))
        }
    }

    // Blanket implementation
    impl<L: FileLocator + ?Sized> LocatorExtJson for L {}
}

#[cfg(feature = "serde")]
pub use json::LocatorExtJson;
