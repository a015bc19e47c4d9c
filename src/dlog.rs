//! Module `dlog` implement the append-only data log.
//!
//! The data log holds the real, variable-length payloads for keys and
//! their values. A key's bytes are appended once, as a plain entry, on
//! the key's first insert; every value written for the key is appended
//! as a value entry referencing the key's entry. Entries are never
//! mutated.

use std::sync::Arc;

use crate::{err_at, record::DataLogEntry, IoHandler, Result};

/// Append key and value payloads through an [IoHandler], read them back
/// by offset.
pub struct DataLogger {
    io: Arc<IoHandler>,
}

impl DataLogger {
    /// New data logger over `io`. An empty stream is primed with a
    /// marker entry so that offset ZERO never addresses a payload.
    pub fn new(io: Arc<IoHandler>) -> Result<DataLogger> {
        let val = DataLogger { io };
        if val.io.to_size()? == 0 {
            let entry = DataLogEntry::Plain {
                data: crate::record::ROOT_MARKER.clone(),
            };
            let mut buf = Vec::with_capacity(DataLogEntry::plain_size(entry.as_data().len()));
            entry.encode(&mut buf);
            val.io.write(None, &buf)?;
        }
        Ok(val)
    }

    pub fn as_io(&self) -> &IoHandler {
        &self.io
    }

    /// Append `key` as a plain entry, return its offset.
    pub fn append_key(&self, key: &[u8]) -> Result<u64> {
        let entry = DataLogEntry::Plain { data: key.to_vec() };
        let mut buf = Vec::with_capacity(DataLogEntry::plain_size(key.len()));
        entry.encode(&mut buf);
        self.io.write(None, &buf)
    }

    /// Append `value` as a value entry referencing the key entry at
    /// `key_offset`, return the value entry's offset.
    pub fn append_value(&self, key_offset: u64, value: &[u8]) -> Result<u64> {
        let entry = DataLogEntry::Value {
            key_offset,
            data: value.to_vec(),
        };
        let mut buf = Vec::with_capacity(DataLogEntry::value_size(value.len()));
        entry.encode(&mut buf);
        self.io.write(None, &buf)
    }

    /// Read and decode the entry of `size` bytes at `offset`.
    pub fn read(&self, offset: u64, size: usize) -> Result<DataLogEntry> {
        let buf = self.io.read(offset, size)?;
        Ok(DataLogEntry::decode(&buf)?.0)
    }

    /// Read the payload of the value entry at `offset` carrying `length`
    /// payload bytes.
    pub fn read_value(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = DataLogEntry::value_size(length as usize);
        match self.read(offset, size)? {
            DataLogEntry::Value { data, .. } => Ok(data),
            DataLogEntry::Plain { .. } => {
                err_at!(InvalidRecord, msg: "plain entry at {}, expected value", offset)
            }
        }
    }
}

#[cfg(test)]
#[path = "dlog_test.rs"]
mod dlog_test;
