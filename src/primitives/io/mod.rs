#![allow(unsafe_code)]

use std::{
    fs::{File, OpenOptions},
    path::Path,
};

use memmap2::MmapMut;

use crate::types::{Result, TierHashError};

#[cfg(test)]
macro_rules! io_test_log {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(test))]
macro_rules! io_test_log {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

/// A contiguous, growable byte region holding the whole table.
///
/// The table addresses every field by absolute offset into `bytes()`, so a
/// region is the only storage seam: a memory-mapped file in production and a
/// heap buffer in tests.
pub trait Region: Send + 'static {
    /// Read access to the full region.
    fn bytes(&self) -> &[u8];
    /// Write access to the full region.
    fn bytes_mut(&mut self) -> &mut [u8];
    /// Current length of the region in bytes.
    fn len(&self) -> usize {
        self.bytes().len()
    }
    /// Returns true if the region holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Extends the region to `new_len` bytes; new bytes read as zero.
    fn grow(&mut self, new_len: usize) -> Result<()>;
    /// Makes all writes durable.
    fn flush(&mut self) -> Result<()>;
}

/// Region backed by a read-write memory map of a file.
pub struct MappedRegion {
    file: File,
    map: MmapMut,
}

impl MappedRegion {
    /// Creates (or truncates) `path` to `len` zero bytes and maps it.
    pub fn create(path: impl AsRef<Path>, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(TierHashError::Invalid("mapped region length is zero"));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        Self::map(file)
    }

    /// Maps an existing table file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(TierHashError::Corruption("table file is empty"));
        }
        Self::map(file)
    }

    fn map(file: File) -> Result<Self> {
        // SAFETY: the table requires exclusive access to its file; no other
        // process or mapping truncates it while this map is alive.
        let map = unsafe { MmapMut::map_mut(&file)? };
        io_test_log!("[io.map] mapped len={}", map.len());
        Ok(Self { file, map })
    }
}

impl Region for MappedRegion {
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        if new_len <= self.map.len() {
            return Ok(());
        }
        io_test_log!("[io.grow] from={} to={}", self.map.len(), new_len);
        self.map.flush()?;
        self.file.set_len(new_len as u64)?;
        // SAFETY: see `map`; the old mapping is dropped on assignment.
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        self.file.sync_all().map_err(TierHashError::from)
    }
}

/// Region backed by a heap buffer; nothing survives the process.
#[derive(Clone, Debug, Default)]
pub struct HeapRegion {
    buf: Vec<u8>,
}

impl HeapRegion {
    /// Allocates `len` zero bytes.
    pub fn new(len: usize) -> Self {
        Self { buf: vec![0; len] }
    }

    /// Wraps an existing image, e.g. a copy of a crashed table.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Returns the underlying image.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Region for HeapRegion {
    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.buf.len() {
            self.buf.resize(new_len, 0);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
