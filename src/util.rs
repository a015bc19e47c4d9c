//! Module `util` implement file-system helpers used across the package.

use std::{ffi, fs, path};

use crate::{err_at, Result};

// create a file in read-write mode, truncating any existing file.
pub fn create_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = {
        let os_file = path::Path::new(file);
        fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.
        os_file
    };

    {
        let parent = match os_file.parent() {
            Some(parent) => Ok(parent),
            None => err_at!(InvalidFile, msg: "{:?}", file),
        }?;
        err_at!(IOError, fs::create_dir_all(parent))?;
    };

    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(
        IOError,
        opts.read(true).write(true).create_new(true).open(os_file)
    )?)
}

// open an existing file in read-write mode.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(IOError, opts.read(true).write(true).open(os_file))?)
}
