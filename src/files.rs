//! Module `files` implement the file naming scheme for an index. Each
//! index owns two files under its directory, named by suffix:
//! `{name}-hbt.hist` for the history-index stream and `{name}-hbt.dlog`
//! for the data log.

use std::{convert::TryFrom, ffi, fmt, path, result};

use crate::{err_at, Error, Result};

const HIST_SUFFIX: &str = "-hbt.hist";
const DLOG_SUFFIX: &str = "-hbt.dlog";

// file name for index `name` with `suffix` appended.
fn compose(name: &str, suffix: &str) -> ffi::OsString {
    let mut file_name = String::with_capacity(name.len() + suffix.len());
    file_name.push_str(name);
    file_name.push_str(suffix);
    file_name.into()
}

// recover the index name from a location whose file name carries `suffix`.
fn parse(loc: &ffi::OsStr, suffix: &str) -> Result<String> {
    let file_name = path::Path::new(loc).file_name().and_then(|f| f.to_str());
    match file_name.and_then(|f| f.strip_suffix(suffix)) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => err_at!(InvalidFile, msg: "{:?} not a {} file", loc, suffix),
    }
}

fn fmt_loc(loc: &ffi::OsStr, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
    match loc.to_str() {
        Some(s) => write!(f, "{}", s),
        None => write!(f, "{:?}", loc),
    }
}

/// File name of the history-index stream for an index, uniquely
/// locatable given the `dir` it lives under and the index `name`.
#[derive(Clone)]
pub struct HistoryFileName(pub ffi::OsString);

impl From<String> for HistoryFileName {
    fn from(name: String) -> HistoryFileName {
        HistoryFileName(compose(&name, HIST_SUFFIX))
    }
}

impl TryFrom<HistoryFileName> for String {
    type Error = Error;

    fn try_from(fname: HistoryFileName) -> Result<String> {
        parse(&fname.0, HIST_SUFFIX)
    }
}

impl From<HistoryFileName> for ffi::OsString {
    fn from(val: HistoryFileName) -> ffi::OsString {
        val.0
    }
}

impl fmt::Display for HistoryFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        fmt_loc(&self.0, f)
    }
}

/// File name of the data log for an index, uniquely locatable given the
/// `dir` it lives under and the index `name`.
#[derive(Clone)]
pub struct DlogFileName(pub ffi::OsString);

impl From<String> for DlogFileName {
    fn from(name: String) -> DlogFileName {
        DlogFileName(compose(&name, DLOG_SUFFIX))
    }
}

impl TryFrom<DlogFileName> for String {
    type Error = Error;

    fn try_from(fname: DlogFileName) -> Result<String> {
        parse(&fname.0, DLOG_SUFFIX)
    }
}

impl From<DlogFileName> for ffi::OsString {
    fn from(val: DlogFileName) -> ffi::OsString {
        val.0
    }
}

impl fmt::Display for DlogFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        fmt_loc(&self.0, f)
    }
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
