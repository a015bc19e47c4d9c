//! Module `config` carry the crate constants and the configuration type
//! for building an [Index][crate::Index].

use std::{cmp, ffi, path};

use crate::files::{DlogFileName, HistoryFileName};

/// Maximum number of children a btree node can hold, also the fan-out of
/// on-disk history-index nodes.
pub const MAX_CHILDREN: usize = 170;

/// Default capacity of a leaf node's in-memory history buffer. Bounded by
/// [MAX_CHILDREN]; on-disk history nodes are always [MAX_CHILDREN] wide,
/// short batches are padded with sentinel children.
pub const HISTORY_CAP: usize = 16;

/// Maximum size of a value, in bytes.
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1MB

/// Compose a path to history-index file identified by unique `name` under `dir`.
pub fn to_history_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    let loc: path::PathBuf = [
        dir.to_os_string(),
        HistoryFileName::from(name.to_string()).into(),
    ]
    .iter()
    .collect();
    loc.into_os_string()
}

/// Compose a path to data-log file identified by unique `name` under `dir`.
pub fn to_dlog_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    let loc: path::PathBuf = [
        dir.to_os_string(),
        DlogFileName::from(name.to_string()).into(),
    ]
    .iter()
    .collect();
    loc.into_os_string()
}

/// Configuration for buffered btree index.
///
/// Configuration is used only while building an [Index][crate::Index],
/// use the `set_*` methods to add more configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Unique name for the index.
    pub name: String,
    /// Transaction number to start the index from. Mutations are tagged
    /// starting with this value.
    ///
    /// Default: 0
    pub tx_epoch: u128,
    /// Capacity of each leaf node's in-memory history buffer, clamped to
    /// [MAX_CHILDREN].
    ///
    /// Default: [HISTORY_CAP]
    pub history_cap: usize,
}

impl Config {
    pub fn new(name: &str) -> Config {
        Config {
            name: name.to_string(),
            tx_epoch: 0,
            history_cap: HISTORY_CAP,
        }
    }

    /// Configure the starting transaction number.
    pub fn set_tx_epoch(&mut self, tx_epoch: u128) -> &mut Self {
        self.tx_epoch = tx_epoch;
        self
    }

    /// Configure the leaf history buffer capacity. Values above
    /// [MAX_CHILDREN] are clamped.
    pub fn set_history_cap(&mut self, cap: usize) -> &mut Self {
        self.history_cap = cmp::max(1, cmp::min(cap, MAX_CHILDREN));
        self
    }
}
