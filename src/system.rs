//! System-directory locator.
//!
//! Two backings share one type:
//!
//! | Mode | Constructed by | Reads from | Writable |
//! |------|----------------|------------|----------|
//! | host | [`SystemLocator::new`] | a directory on the host filesystem | yes |
//! | layered | [`SystemLocator::layered`] | a subtree of a parent locator | no |
//!
//! Paths use [`PathStyle::Rooted`] (`/dir/file`). Virtual paths containing
//! `..` segments are rejected so a locator never reaches outside its root.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::path::{self, PathStyle};
use crate::{FileIter, FileLocator, FileStream, LocatorError, WritableFileLocator};

enum Backing<'a> {
    Host(PathBuf),
    Parent {
        locator: &'a dyn FileLocator,
        root: String,
    },
}

/// Locator over a directory tree.
///
/// Existence and open are delegated to the host filesystem, so a host-mode
/// locator is exactly as case-sensitive as the host.
///
/// # Example
///
/// ```rust,no_run
/// use anyfs_locator::{FileLocator, SystemLocator, WritableFileLocator};
///
/// let mut dir = SystemLocator::new("/srv/data")?;
/// dir.write("/reports/q1.csv", &mut &b"a,b\n"[..])?;
/// assert!(dir.exists("/reports/q1.csv")?);
/// # Ok::<(), anyfs_locator::LocatorError>(())
/// ```
pub struct SystemLocator<'a> {
    backing: Backing<'a>,
    written: HashSet<String>,
    closed: bool,
}

impl SystemLocator<'static> {
    /// Open a host directory.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::InvalidArgument`] if `root` is empty
    /// - [`LocatorError::NotFound`] if `root` is not an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LocatorError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(LocatorError::missing("root"));
        }
        if !root.is_dir() {
            return Err(LocatorError::NotFound {
                path: root.display().to_string(),
            });
        }
        tracing::debug!(root = %root.display(), "opened system directory locator");
        Ok(Self {
            backing: Backing::Host(root.to_path_buf()),
            written: HashSet::new(),
            closed: false,
        })
    }
}

impl<'a> SystemLocator<'a> {
    /// View the subtree `root` of `parent` as a directory.
    ///
    /// The view is read-only and borrows `parent`; closing it leaves `parent`
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::InvalidArgument`] if `root` is empty or contains `..`
    pub fn layered(parent: &'a dyn FileLocator, root: &str) -> Result<Self, LocatorError> {
        if root.is_empty() {
            return Err(LocatorError::missing("root"));
        }
        reject_parent_segments(root)?;
        let root = path::normalize(root, parent.path_style());
        tracing::debug!(root = %root, "opened layered directory locator");
        Ok(Self {
            backing: Backing::Parent {
                locator: parent,
                root,
            },
            written: HashSet::new(),
            closed: false,
        })
    }

    /// Host directory behind a host-mode locator.
    pub fn root_dir(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Host(root) => Some(root),
            Backing::Parent { .. } => None,
        }
    }

    /// Whether this locator reads through a parent locator.
    pub fn is_layered(&self) -> bool {
        matches!(self.backing, Backing::Parent { .. })
    }

    fn ensure_open(&self) -> Result<(), LocatorError> {
        if self.closed {
            Err(LocatorError::Closed)
        } else {
            Ok(())
        }
    }

    fn host_root(&self, operation: &'static str) -> Result<&Path, LocatorError> {
        match &self.backing {
            Backing::Host(root) => Ok(root),
            Backing::Parent { .. } => Err(LocatorError::ReadOnly { operation }),
        }
    }

    /// Check `path` is writable and unclaimed, returning its host path and
    /// key. The key is recorded by the caller once the file exists.
    fn claim(&self, operation: &'static str, path: &str) -> Result<(PathBuf, String), LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        let target = resolve(self.host_root(operation)?, path)?;
        let key = path::key(path);
        if self.written.contains(&key) {
            return Err(LocatorError::duplicate(
                operation,
                path::normalize(path, PathStyle::Rooted),
            ));
        }
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|e| LocatorError::io(operation, dir.display().to_string(), e))?;
        }
        Ok((target, key))
    }

    fn create_new(operation: &'static str, path: &str, target: &Path) -> Result<File, LocatorError> {
        File::options()
            .write(true)
            .create_new(true)
            .open(target)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => {
                    LocatorError::duplicate(operation, path::normalize(path, PathStyle::Rooted))
                }
                _ => LocatorError::io(operation, target.display().to_string(), e),
            })
    }
}

impl FileLocator for SystemLocator<'_> {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Ok(false);
        }
        match &self.backing {
            Backing::Host(root) => Ok(resolve(root, path)?.is_file()),
            Backing::Parent { locator, root } => {
                reject_parent_segments(path)?;
                locator.exists(&path::join(root, path, locator.path_style()))
            }
        }
    }

    fn open(&self, path: &str) -> Result<FileStream, LocatorError> {
        self.ensure_open()?;
        if path.is_empty() {
            return Err(LocatorError::missing("path"));
        }
        match &self.backing {
            Backing::Host(root) => {
                let target = resolve(root, path)?;
                if !target.is_file() {
                    return Err(LocatorError::NotFound {
                        path: path::normalize(path, PathStyle::Rooted),
                    });
                }
                let file = File::open(&target).map_err(|e| LocatorError::io("open", path, e))?;
                Ok(Box::new(file))
            }
            Backing::Parent { locator, root } => {
                reject_parent_segments(path)?;
                locator.open(&path::join(root, path, locator.path_style()))
            }
        }
    }

    fn enumerate_files_in(&self, root: &str) -> Result<FileIter<'_>, LocatorError> {
        self.ensure_open()?;
        match &self.backing {
            Backing::Host(base) => {
                let scoped = resolve(base, root)?;
                // Walking the subtree directly is only exact when the host
                // spelling matches; otherwise fall back to filtering the whole tree.
                let start = if scoped.is_dir() { scoped } else { base.clone() };
                let base = base.clone();
                let root = root.to_string();
                let walk = WalkDir::new(start)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(move |entry| match entry {
                        Ok(entry) if entry.file_type().is_file() => {
                            Some(Ok(to_virtual(&base, entry.path())))
                        }
                        Ok(_) => None,
                        Err(err) => {
                            let at = err
                                .path()
                                .map(|p| p.display().to_string())
                                .unwrap_or_default();
                            Some(Err(LocatorError::io("enumerate", at, io::Error::from(err))))
                        }
                    })
                    .filter(move |item| match item {
                        Ok(path) => path::starts_with(path, &root),
                        Err(_) => true,
                    });
                Ok(FileIter::new(walk))
            }
            Backing::Parent { locator, root: base } => {
                reject_parent_segments(root)?;
                let skip = path::segments(base).count();
                let scoped = path::join(base, root, locator.path_style());
                let inner = locator.enumerate_files_in(&scoped)?;
                Ok(FileIter::new(inner.map(move |item| {
                    item.map(|p| path::strip_segments(&p, skip, PathStyle::Rooted))
                })))
            }
        }
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Rooted
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.written.clear();
        }
    }
}

impl WritableFileLocator for SystemLocator<'_> {
    fn create(&mut self, path: &str) -> Result<(), LocatorError> {
        let (target, key) = self.claim("create", path)?;
        Self::create_new("create", path, &target)?;
        self.written.insert(key);
        tracing::trace!(path = %target.display(), "created empty file");
        Ok(())
    }

    fn write(&mut self, path: &str, data: &mut dyn Read) -> Result<(), LocatorError> {
        let (target, key) = self.claim("write", path)?;
        let mut file = Self::create_new("write", path, &target)?;
        let copied = match io::copy(data, &mut file) {
            Ok(copied) => copied,
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&target) {
                    tracing::warn!(path = %target.display(), error = %cleanup, "could not remove partial file");
                }
                return Err(LocatorError::io("write", target.display().to_string(), e));
            }
        };
        self.written.insert(key);
        tracing::trace!(path = %target.display(), bytes = copied, "wrote file");
        Ok(())
    }

    fn finish(&mut self) -> Result<(), LocatorError> {
        self.ensure_open()
    }

    fn close(&mut self) {
        FileLocator::close(self);
    }
}

impl Drop for SystemLocator<'_> {
    fn drop(&mut self) {
        FileLocator::close(self);
    }
}

impl std::fmt::Debug for SystemLocator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SystemLocator");
        match &self.backing {
            Backing::Host(root) => s.field("root", root),
            Backing::Parent { root, .. } => s.field("parent_root", root),
        };
        s.field("closed", &self.closed).finish()
    }
}

fn reject_parent_segments(path: &str) -> Result<(), LocatorError> {
    if path::segments(path).any(|segment| segment == "..") {
        return Err(LocatorError::InvalidArgument {
            name: "path",
            reason: "must not contain `..` segments",
        });
    }
    Ok(())
}

/// Map a virtual path onto the host below `root`.
fn resolve(root: &Path, path: &str) -> Result<PathBuf, LocatorError> {
    reject_parent_segments(path)?;
    let mut target = root.to_path_buf();
    target.extend(path::segments(path));
    Ok(target)
}

fn to_virtual(base: &Path, host: &Path) -> String {
    let relative = host.strip_prefix(base).unwrap_or(host);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    path::normalize(&parts.join("/"), PathStyle::Rooted)
}
