//! Hbt implement a buffered btree index for `{key,value}` storage that
//! preserves the full write history of every key.
//!
//! The index keeps the current state of each key in memory, in an ordered
//! btree of [IntermediateNode]s and [LeafNode]s. Every mutation is tagged
//! with a transaction number, a monotonically increasing 128-bit counter
//! maintained by the index. Along with the current value, each leaf holds
//! a small bounded buffer of the key's previous versions. When that buffer
//! fills up, the batch is spilled into an on-disk history index, a btree of
//! fixed fan-out nodes keyed by transaction number. Value payloads
//! themselves live in an append-only data log.
//!
//! Put together, this gives cheap in-memory access to the latest value
//! while keeping every older version reachable: [Index::as_of] answers
//! "what was the value of this key at transaction `tx`", serving the
//! answer from the in-memory buffer when it is recent enough and walking
//! the on-disk history index otherwise.
//!
//! **Components**
//!
//! * [IoHandler], serialized random-access reads and writes over a file,
//!   optionally enforcing a fixed page size.
//! * [DataLogger], append-only log of key and value payloads.
//! * Record codecs for the three on-disk formats, [HistoryIndexNode],
//!   [DataLogEntry] and [MainIndexEntry].
//! * [Index], the in-memory buffered btree routing put/get/delete/as-of.
//! * [HistorySearcher], resolves as-of lookups that have aged out of the
//!   in-memory buffers.
//!
//! Keys are opaque byte sequences ordered lexicographically; values are
//! opaque byte sequences up to [MAX_VALUE_SIZE]. Key and value types
//! plug into the index via the [Serialize] trait.

use std::result;

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(InvalidRecord, msg: "bad child count {}", n);
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf));
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf), "reading {:?}", loc);
/// ```
///
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Fail with `InvalidRecord` when `buf` falls short of `want` bytes.
#[macro_export]
macro_rules! check_remaining {
    ($buf:expr, $want:expr, $msg:expr) => {
        if $buf.len() < $want {
            $crate::err_at!(
                InvalidRecord, msg: "insufficient input {}/{} ({})", $buf.len(), $want, $msg
            )
        } else {
            Ok(())
        }
    };
}

mod config;
mod dlog;
mod error;
mod files;
mod inter;
mod iohandler;
mod leaf;
mod record;
mod searcher;
mod tree;
mod types;
mod util;

pub use crate::config::{
    to_dlog_location, to_history_location, Config, HISTORY_CAP, MAX_CHILDREN,
    MAX_VALUE_SIZE,
};
pub use crate::dlog::DataLogger;
pub use crate::error::Error;
pub use crate::files::{DlogFileName, HistoryFileName};
pub use crate::inter::{Child, IntermediateNode};
pub use crate::iohandler::IoHandler;
pub use crate::leaf::{AsOf, HistoryReadRequest, HistoryRecord, LeafNode, WriteRequest};
pub use crate::record::{
    marker_block, DataLogEntry, HistoryIndexChild, HistoryIndexNode, MainIndexChild,
    MainIndexEntry, ROOT_MARKER,
};
pub use crate::searcher::HistorySearcher;
pub use crate::tree::{Index, Stats};
pub use crate::types::Serialize;

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
