//! Read-only memory-mapped [`IoManager`].
//!
//! Mapping a zero-length file is an error on every Unix we care about, so an
//! empty file is represented as "no map": `size()` is 0 and every read
//! reports [`Error::Eof`].  The map is never remapped — a file is only
//! handed to `MmapIo` once it has stopped growing (startup replay, retired
//! segments).

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::Mmap;

use super::IoManager;
use crate::errors::{Error, Result};

pub struct MmapIo {
    map: Option<Mmap>,
}

impl MmapIo {
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map })
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let map = self.map.as_ref().ok_or(Error::Eof)?;
        let offset = offset as usize;
        if offset >= map.len() {
            return Err(Error::Eof);
        }
        let n = buf.len().min(map.len() - offset);
        buf[..n].copy_from_slice(&map[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Unsupported)
    }

    fn sync(&self) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn size(&self) -> u64 {
        self.map.as_ref().map(|m| m.len() as u64).unwrap_or(0)
    }
}
