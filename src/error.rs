//! Error types for the locator abstraction.

/// Locator error type with contextual variants.
///
/// Variants carry the path (virtual or host) and the operation that failed
/// where that context exists. Uses `#[non_exhaustive]` for forward
/// compatibility.
///
/// # Examples
///
/// ```rust
/// use anyfs_locator::LocatorError;
///
/// let err = LocatorError::NotFound { path: "/missing.txt".into() };
/// assert_eq!(err.to_string(), "not found: /missing.txt");
///
/// let err = LocatorError::DuplicateEntry {
///     path: "a/b.txt".into(),
///     operation: "write",
/// };
/// assert_eq!(err.to_string(), "write: duplicate entry: a/b.txt");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    // Argument errors
    /// A required argument was missing or empty.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// Why the argument was rejected.
        reason: &'static str,
    },

    // Path/File errors
    /// Path does not exist, or names a directory where a file is required.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: String,
    },

    /// A writable locator was asked to create or write the same path twice.
    #[error("{operation}: duplicate entry: {path}")]
    DuplicateEntry {
        /// The normalized path that was already written.
        path: String,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Data could not be interpreted (e.g. invalid UTF-8).
    #[error("invalid data: {path} ({details})")]
    InvalidData {
        /// The path with invalid data.
        path: String,
        /// Details about the invalid data.
        details: String,
    },

    // Format errors
    /// No detection probe matched, or no writer exists for the requested
    /// extension or archive/compression combination.
    #[error("unsupported format: {details}")]
    UnsupportedFormat {
        /// What was probed or requested.
        details: String,
    },

    /// An archive or disc codec rejected its input.
    #[error("{format} error in {path}: {details}")]
    Codec {
        /// The codec that failed (`zip`, `tar`, `iso9660`, ...).
        format: &'static str,
        /// The path involved, if any.
        path: String,
        /// The codec's message.
        details: String,
    },

    // Lifecycle errors
    /// The locator only supports reading.
    #[error("read-only locator: {operation}")]
    ReadOnly {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The locator has been closed.
    #[error("locator is closed")]
    Closed,

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl LocatorError {
    /// Wrap an I/O error with the operation and path it occurred on.
    ///
    /// `NotFound` I/O errors become [`LocatorError::NotFound`] so callers can
    /// match on a single variant regardless of the backing store.
    pub fn io(operation: &'static str, path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return LocatorError::NotFound { path };
        }
        LocatorError::Io {
            operation,
            path,
            source,
        }
    }

    pub(crate) fn missing(name: &'static str) -> Self {
        LocatorError::InvalidArgument {
            name,
            reason: "must not be empty",
        }
    }

    pub(crate) fn duplicate(operation: &'static str, path: impl Into<String>) -> Self {
        LocatorError::DuplicateEntry {
            path: path.into(),
            operation,
        }
    }

    pub(crate) fn unsupported(details: impl Into<String>) -> Self {
        LocatorError::UnsupportedFormat {
            details: details.into(),
        }
    }

    pub(crate) fn codec(
        format: &'static str,
        path: impl Into<String>,
        details: impl std::fmt::Display,
    ) -> Self {
        LocatorError::Codec {
            format,
            path: path.into(),
            details: details.to_string(),
        }
    }
}

impl From<std::io::Error> for LocatorError {
    fn from(error: std::io::Error) -> Self {
        LocatorError::io("io", String::new(), error)
    }
}

impl From<zip::result::ZipError> for LocatorError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(source) => LocatorError::io("zip", String::new(), source),
            zip::result::ZipError::FileNotFound => LocatorError::NotFound {
                path: String::new(),
            },
            other => LocatorError::codec("zip", String::new(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = LocatorError::NotFound {
            path: "/missing".into(),
        };
        assert_eq!(err.to_string(), "not found: /missing");
    }

    #[test]
    fn duplicate_entry_display() {
        let err = LocatorError::duplicate("create", "a/b");
        assert_eq!(err.to_string(), "create: duplicate entry: a/b");
    }

    #[test]
    fn invalid_argument_display() {
        let err = LocatorError::missing("path");
        assert_eq!(err.to_string(), "invalid argument `path`: must not be empty");
    }

    #[test]
    fn io_not_found_becomes_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = LocatorError::io("open", "/x", io_err);
        assert!(matches!(err, LocatorError::NotFound { ref path } if path == "/x"));
    }

    #[test]
    fn io_other_keeps_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = LocatorError::io("read", "/x", io_err);
        assert!(matches!(err, LocatorError::Io { .. }));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn from_io_permission_denied_is_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        let err = LocatorError::from(io_err);
        assert!(matches!(err, LocatorError::Io { .. }));
    }

    #[test]
    fn zip_invalid_archive_is_codec() {
        let err = LocatorError::from(zip::result::ZipError::InvalidArchive("bad".into()));
        assert!(matches!(err, LocatorError::Codec { format: "zip", .. }));
    }
}
