//! # Locator Traits
//!
//! The capability interfaces every backing store implements.
//!
//! ## Capabilities
//!
//! | Trait | Operations | Implemented by |
//! |-------|------------|----------------|
//! | [`FileLocator`] | `exists`, `open`, `enumerate_files`, `enumerate_files_in`, `close` | every locator |
//! | [`WritableFileLocator`] | `create`, `write`, `write_all`, `write_all_in`, `finish`, `close` | system directory, memory, archive writer |
//!
//! The two capabilities are disjoint: a locator opened over a disc image is
//! readable only, an archive writer is writable only, and the system and
//! memory locators implement both.
//!
//! ## Lifecycle
//!
//! `close` is idempotent and never fails. Concrete locators call it from
//! `Drop`, so dropping a locator (or the `Box` holding it) releases its
//! resources on every exit path. Operations after `close` fail with
//! [`LocatorError::Closed`](crate::LocatorError::Closed).
//!
//! ## Threading
//!
//! Locators are single-threaded values. They use `RefCell`/`Rc` internally
//! and are neither `Send` nor `Sync`; callers serialize access.
//!
//! ## Object Safety
//!
//! Both traits are object-safe. Factories return `Box<dyn FileLocator>`:
//!
//! ```rust
//! use anyfs_locator::{FileLocator, LocatorError};
//!
//! fn list(locator: &dyn FileLocator) -> Result<Vec<String>, LocatorError> {
//!     locator.enumerate_files()?.collect_all()
//! }
//! ```

mod read;
mod write;

pub use read::{FileIter, FileLocator};
pub use write::WritableFileLocator;
