//! Module `iohandler` implement serialized random-access IO over a file.

use fs2::FileExt;

use std::{
    ffi, fs,
    io::{self, Read, Seek, Write},
    sync::Mutex,
};

use crate::{err_at, util, Result};

/// IO handler, a mutex protected wrapper around a random-access file.
///
/// `write` with no offset appends at end-of-file and returns the chosen
/// offset. When a `page_size` is configured every write must supply
/// exactly one page and every read must request exactly one page,
/// mismatches fail with `InvalidWriteRequest`. Short reads and short
/// writes fail likewise. Durability is the caller's concern, the handler
/// does not fsync.
///
/// Handlers can be shared between collaborators; operations serialize on
/// the handler's own mutex and never hold more than one handler at a
/// time.
pub struct IoHandler {
    loc: ffi::OsString,
    fd: Mutex<fs::File>,
    page_size: Option<usize>,
}

impl Drop for IoHandler {
    fn drop(&mut self) {
        if let Ok(fd) = self.fd.lock() {
            fd.unlock().ok();
        }
    }
}

impl IoHandler {
    /// Create a new file at `loc`, truncating any existing file. The
    /// file is locked exclusive for the lifetime of this value.
    pub fn create(loc: &ffi::OsStr) -> Result<IoHandler> {
        let fd = util::create_file_rw(loc)?;
        err_at!(IOError, fd.lock_exclusive(), "fail lock for {:?}", loc)?;

        let val = IoHandler {
            loc: loc.to_os_string(),
            fd: Mutex::new(fd),
            page_size: None,
        };

        Ok(val)
    }

    /// Open an existing file at `loc` in read-write mode.
    pub fn open(loc: &ffi::OsStr) -> Result<IoHandler> {
        let fd = util::open_file_rw(loc)?;
        err_at!(IOError, fd.lock_exclusive(), "fail lock for {:?}", loc)?;

        let val = IoHandler {
            loc: loc.to_os_string(),
            fd: Mutex::new(fd),
            page_size: None,
        };

        Ok(val)
    }

    /// Enforce a fixed page size on all subsequent reads and writes.
    pub fn set_page_size(&mut self, page_size: usize) -> &mut Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn to_location(&self) -> ffi::OsString {
        self.loc.clone()
    }

    pub fn to_page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Write `data` at `offset`, appending at end-of-file when `offset`
    /// is None. Return the offset at which `data` was written.
    pub fn write(&self, offset: Option<u64>, data: &[u8]) -> Result<u64> {
        match self.page_size {
            Some(ps) if data.len() != ps => {
                return err_at!(
                    InvalidWriteRequest, msg: "write {}b to {:?}, page size {}",
                    data.len(), self.loc, ps
                );
            }
            _ => (),
        }

        let mut fd = match self.fd.lock() {
            Ok(fd) => fd,
            Err(_) => return err_at!(Fatal, msg: "poisoned lock for {:?}", self.loc),
        };

        let offset = match offset {
            Some(offset) => {
                err_at!(IOError, fd.seek(io::SeekFrom::Start(offset)))?;
                offset
            }
            None => err_at!(IOError, fd.seek(io::SeekFrom::End(0)))?,
        };

        let n = err_at!(IOError, fd.write(data), "writing {:?}", self.loc)?;
        if n != data.len() {
            err_at!(
                InvalidWriteRequest, msg: "partial write {}/{} to {:?}", n, data.len(),
                self.loc
            )
        } else {
            Ok(offset)
        }
    }

    /// Read `size` bytes from `offset`.
    pub fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        match self.page_size {
            Some(ps) if size != ps => {
                return err_at!(
                    InvalidWriteRequest, msg: "read {}b from {:?}, page size {}",
                    size, self.loc, ps
                );
            }
            _ => (),
        }

        let mut fd = match self.fd.lock() {
            Ok(fd) => fd,
            Err(_) => return err_at!(Fatal, msg: "poisoned lock for {:?}", self.loc),
        };

        err_at!(IOError, fd.seek(io::SeekFrom::Start(offset)))?;
        let mut buf = vec![0; size];
        let n = err_at!(IOError, fd.read(&mut buf), "reading {:?}", self.loc)?;
        if n != size {
            err_at!(
                InvalidWriteRequest, msg: "short read {}/{} at {} from {:?}", n, size,
                offset, self.loc
            )
        } else {
            Ok(buf)
        }
    }

    /// Return the current end-of-file offset.
    pub fn to_size(&self) -> Result<u64> {
        let mut fd = match self.fd.lock() {
            Ok(fd) => fd,
            Err(_) => return err_at!(Fatal, msg: "poisoned lock for {:?}", self.loc),
        };
        err_at!(IOError, fd.seek(io::SeekFrom::End(0)))
    }
}

#[cfg(test)]
#[path = "iohandler_test.rs"]
mod iohandler_test;
