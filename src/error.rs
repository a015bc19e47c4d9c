use std::{error, fmt, result};

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically the `file:line` where the
/// error originated, and a human readable message. Errors are usually
/// constructed via the [err_at][crate::err_at] macro.
pub enum Error {
    /// Insert attempted on a node that already holds `MAX_CHILDREN`
    /// children. Recovered internally by the tree, by splitting the
    /// nodes along the descent path and retrying.
    NodeFull(String, String),
    /// Insert attempted with an ordering key that duplicates an existing
    /// sibling. Programming error, surfaced unchanged.
    InvalidInsert(String, String),
    /// Malformed on-disk record, wrong child count, impossible length or
    /// bad flag combination.
    InvalidRecord(String, String),
    /// Page-size mismatch or short read/write in the IO handler.
    InvalidWriteRequest(String, String),
    /// Invariant violation, like a missing child during descent. Fatal,
    /// callers should not attempt to recover.
    UnreachableState(String, String),
    /// Invalid file name or path.
    InvalidFile(String, String),
    /// IO error from the underlying file system.
    IOError(String, String),
    /// Failure while converting between types.
    FailConvert(String, String),
    /// Catch all for unrecoverable internal failures.
    Fatal(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            NodeFull(p, msg) => write!(f, "NodeFull:{} {}", p, msg),
            InvalidInsert(p, msg) => write!(f, "InvalidInsert:{} {}", p, msg),
            InvalidRecord(p, msg) => write!(f, "InvalidRecord:{} {}", p, msg),
            InvalidWriteRequest(p, msg) => {
                write!(f, "InvalidWriteRequest:{} {}", p, msg)
            }
            UnreachableState(p, msg) => write!(f, "UnreachableState:{} {}", p, msg),
            InvalidFile(p, msg) => write!(f, "InvalidFile:{} {}", p, msg),
            IOError(p, msg) => write!(f, "IOError:{} {}", p, msg),
            FailConvert(p, msg) => write!(f, "FailConvert:{} {}", p, msg),
            Fatal(p, msg) => write!(f, "Fatal:{} {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}
