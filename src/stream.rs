//! Byte stream types shared by every backing store.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// A readable, seekable byte stream.
///
/// Blanket-implemented for every `Read + Seek` type.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A writable, seekable byte sink.
///
/// Blanket-implemented for every `Write + Seek` type.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// An owned stream returned by [`FileLocator::open`](crate::FileLocator::open).
pub type FileStream = Box<dyn ReadSeek>;

/// A backing stream shared between a locator, its codec and the entry
/// readers it hands out.
///
/// [`release`](SharedStream::release) drops the underlying stream for every
/// clone at once; reads and seeks afterwards fail with
/// [`io::ErrorKind::NotConnected`].
#[derive(Clone)]
pub struct SharedStream(Rc<RefCell<Option<FileStream>>>);

impl SharedStream {
    /// Take ownership of `stream`.
    pub fn new(stream: FileStream) -> Self {
        Self(Rc::new(RefCell::new(Some(stream))))
    }

    /// Drop the underlying stream. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        self.0.borrow_mut().take().is_some()
    }

    /// Whether [`release`](SharedStream::release) has run.
    pub fn is_released(&self) -> bool {
        self.0.borrow().is_none()
    }

    /// Total length of the stream. Leaves the position at the start.
    pub fn len(&mut self) -> io::Result<u64> {
        let len = self.seek(SeekFrom::End(0))?;
        self.rewind()?;
        Ok(len)
    }

    fn with<T>(&self, f: impl FnOnce(&mut dyn ReadSeek) -> io::Result<T>) -> io::Result<T> {
        let mut slot = self.0.borrow_mut();
        match slot.as_mut() {
            Some(stream) => f(stream.as_mut()),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "backing stream has been released",
            )),
        }
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with(|stream| stream.read(buf))
    }
}

impl Seek for SharedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with(|stream| stream.seek(pos))
    }
}

impl std::fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStream")
            .field("released", &self.is_released())
            .finish()
    }
}

/// A read-only window `[start, start + len)` over a [`SharedStream`].
///
/// Each read repositions the shared stream, so several windows over the same
/// stream can be read in any interleaving.
#[derive(Debug, Clone)]
pub struct SliceReader {
    stream: SharedStream,
    start: u64,
    len: u64,
    pos: u64,
}

impl SliceReader {
    /// Window of `len` bytes starting at `start`.
    pub fn new(stream: SharedStream, start: u64, len: u64) -> Self {
        Self {
            stream,
            start,
            len,
            pos: 0,
        }
    }
}

impl Read for SliceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        self.stream.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = self.stream.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for SliceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.len)?;
        Ok(self.pos)
    }
}

/// Apply a [`SeekFrom`] to a cursor of `len` bytes at `current`.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
    };
    target.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

/// Read up to `len` bytes from the current position.
///
/// Short streams return fewer bytes instead of failing, so detection probes
/// can treat truncated input as "no match". `len` may come from untrusted
/// headers, so the buffer grows with what is actually read.
pub(crate) fn read_prefix<R: Read + ?Sized>(stream: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read up to `len` bytes starting at absolute `offset`.
pub(crate) fn read_at(stream: &mut dyn ReadSeek, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(offset))?;
    read_prefix(stream, len)
}
