//! Byte sources the tokenizer reads from.
//!
//! A [`ByteSource`] is a single-owner cursor with one byte of pushback.
//! Random-access sources additionally support absolute seeks, which is what
//! lets the stream extractor trust declared lengths and hand out zero-copy
//! ranges.
//!
//! Several cursors may share one open file through [`SharedFile`]; every
//! positioned read takes the file's lock, so a seek and the read that follows
//! it are atomic with respect to other cursors.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Size of the read-ahead window used by [`FileSource`].
const FILE_WINDOW: usize = 8 * 1024;

/// A cursor over the bytes of one logical input.
pub trait ByteSource {
    /// Read the next byte, or `None` at end of input.
    fn next_byte(&mut self) -> Result<Option<u8>>;

    /// Push back the byte most recently read.
    fn unread(&mut self, byte: u8);

    /// Look at the next byte without consuming it.
    fn peek_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.next_byte()?;
        if let Some(b) = byte {
            self.unread(b);
        }
        Ok(byte)
    }

    /// Absolute offset of the next byte to be read.
    fn position(&self) -> u64;

    /// Move the cursor to an absolute offset.
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::Unsupported("seek on a sequential source".to_string()))
    }

    /// Whether [`seek`](ByteSource::seek) is supported.
    fn is_random_access(&self) -> bool {
        false
    }

    /// Total input length, when known.
    fn total_len(&self) -> Option<u64> {
        None
    }

    /// Handle for building zero-copy byte ranges over this input.
    fn handle(&self) -> Option<SourceHandle> {
        None
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        (**self).next_byte()
    }

    fn unread(&mut self, byte: u8) {
        (**self).unread(byte)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        (**self).peek_byte()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn is_random_access(&self) -> bool {
        (**self).is_random_access()
    }

    fn total_len(&self) -> Option<u64> {
        (**self).total_len()
    }

    fn handle(&self) -> Option<SourceHandle> {
        (**self).handle()
    }
}

/// The random-access input behind a document.
#[derive(Debug, Clone)]
pub enum SourceHandle {
    /// Whole input held in memory
    Memory(Bytes),
    /// Open file shared between cursors
    File(Arc<SharedFile>),
}

impl SourceHandle {
    /// A fresh cursor positioned at `offset`.
    pub fn cursor_at(&self, offset: u64) -> Box<dyn ByteSource + Send> {
        match self {
            SourceHandle::Memory(data) => Box::new(SliceSource::at(data.clone(), offset)),
            SourceHandle::File(file) => Box::new(FileSource::at(file.clone(), offset)),
        }
    }

    /// Total input length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            SourceHandle::Memory(data) => data.len() as u64,
            SourceHandle::File(file) => file.len(),
        }
    }

    /// Whether the input is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `len` bytes at `offset` (clamped to the end of input).
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        match self {
            SourceHandle::Memory(data) => {
                let total = data.len() as u64;
                let start = offset.min(total) as usize;
                let end = offset.saturating_add(len).min(total) as usize;
                Ok(data.slice(start..end))
            },
            SourceHandle::File(file) => file.read_range(offset, len),
        }
    }
}

/// In-memory source over a shared byte buffer.
#[derive(Debug, Clone)]
pub struct SliceSource {
    data: Bytes,
    pos: usize,
}

impl SliceSource {
    /// Cursor at the start of `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Cursor at `offset` into `data`.
    pub fn at(data: Bytes, offset: u64) -> Self {
        let pos = (offset as usize).min(data.len());
        Self { data, pos }
    }
}

impl ByteSource for SliceSource {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn unread(&mut self, _byte: u8) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.data.get(self.pos).copied())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.pos = (offset as usize).min(self.data.len());
        Ok(())
    }

    fn is_random_access(&self) -> bool {
        true
    }

    fn total_len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn handle(&self) -> Option<SourceHandle> {
        Some(SourceHandle::Memory(self.data.clone()))
    }
}

/// An open file whose positioned reads are serialized by a lock.
#[derive(Debug)]
pub struct SharedFile {
    file: Mutex<File>,
    len: u64,
}

impl SharedFile {
    /// Open a file for shared positioned reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already open file.
    pub fn from_file(file: File) -> Result<Arc<Self>> {
        let len = file.metadata()?.len();
        Ok(Arc::new(Self {
            file: Mutex::new(file),
            len,
        }))
    }

    /// File length at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fill `buf` from `offset`; returns the number of bytes read, which is
    /// short only at end of file.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file.lock().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "shared file lock poisoned",
            ))
        })?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Read `len` bytes at `offset` (clamped to the end of file).
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        let end = offset.saturating_add(len).min(self.len);
        let len = end.saturating_sub(offset) as usize;
        let mut buf = vec![0u8; len];
        let n = self.read_at(offset, &mut buf)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }
}

/// Buffered cursor over a [`SharedFile`].
#[derive(Debug)]
pub struct FileSource {
    file: Arc<SharedFile>,
    pos: u64,
    window: Vec<u8>,
    window_start: u64,
}

impl FileSource {
    /// Cursor at the start of the file.
    pub fn new(file: Arc<SharedFile>) -> Self {
        Self::at(file, 0)
    }

    /// Cursor at `offset`.
    pub fn at(file: Arc<SharedFile>, offset: u64) -> Self {
        Self {
            file,
            pos: offset,
            window: Vec::new(),
            window_start: 0,
        }
    }

    fn in_window(&self, offset: u64) -> bool {
        offset >= self.window_start && offset < self.window_start + self.window.len() as u64
    }

    fn fill(&mut self) -> Result<()> {
        self.window.resize(FILE_WINDOW, 0);
        let n = self.file.read_at(self.pos, &mut self.window)?;
        self.window.truncate(n);
        self.window_start = self.pos;
        Ok(())
    }
}

impl ByteSource for FileSource {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.pos >= self.file.len() {
            return Ok(None);
        }
        if !self.in_window(self.pos) {
            self.fill()?;
            if self.window.is_empty() {
                return Ok(None);
            }
        }
        let byte = self.window[(self.pos - self.window_start) as usize];
        self.pos += 1;
        Ok(Some(byte))
    }

    fn unread(&mut self, _byte: u8) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.pos = offset.min(self.file.len());
        Ok(())
    }

    fn is_random_access(&self) -> bool {
        true
    }

    fn total_len(&self) -> Option<u64> {
        Some(self.file.len())
    }

    fn handle(&self) -> Option<SourceHandle> {
        Some(SourceHandle::File(self.file.clone()))
    }
}

/// Sequential source over any reader. Cannot seek, so stream lengths are
/// never trusted when reading from it.
#[derive(Debug)]
pub struct ReaderSource<R: Read> {
    reader: std::io::BufReader<R>,
    pushback: Vec<u8>,
    consumed: u64,
}

impl<R: Read> ReaderSource<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: std::io::BufReader::new(reader),
            pushback: Vec::new(),
            consumed: 0,
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pushback.pop() {
            self.consumed += 1;
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.consumed += 1;
                    return Ok(Some(buf[0]));
                },
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn unread(&mut self, byte: u8) {
        self.pushback.push(byte);
        self.consumed = self.consumed.saturating_sub(1);
    }

    fn position(&self) -> u64 {
        self.consumed
    }
}
