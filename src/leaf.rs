//! Module `leaf` implement the leaf node of the buffered btree.
//!
//! A leaf owns the latest state of one key, current value, transaction
//! number and delete flag, along with a small bounded buffer of the
//! key's previous versions. Overwriting the key pushes the superseded
//! state into the buffer; once the buffer reaches capacity the batch is
//! handed to the tree for spilling into the on-disk history index.

use crate::{err_at, Result};

/// Leaf flag, key's most recent operation was a delete.
pub const LEAF_DELETED: u8 = 0x01;
/// Leaf flag, history buffer is spilled to disk when full.
pub const LEAF_PERSIST_HISTORY: u8 = 0x02;

/// Default flags for a new leaf. Initial flags are XOR-ed against this
/// value, callers set bits they want to toggle from the default.
pub const DEFAULT_FLAGS: u8 = 0;

/// One past state of a key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryRecord {
    /// Transaction number at which this version was written.
    pub tx: u128,
    /// The version's value, None iff `deleted`.
    pub value: Option<Vec<u8>>,
    /// Whether this version was a delete.
    pub deleted: bool,
    /// Data-log offset of the value entry written for this version,
    /// ZERO for tombstones.
    pub offset: u64,
}

/// A request to persist a leaf's latest state, emitted by
/// [LeafNode::add_record]. `offset` of None means append.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteRequest {
    pub offset: Option<u64>,
    pub delete: bool,
    pub value: Vec<u8>,
    pub tx: u128,
}

/// A request to resolve an as-of lookup from the on-disk history index,
/// `offset` is the root of the key's history btree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HistoryReadRequest {
    pub offset: u64,
    pub tx: u128,
}

/// Outcome of [LeafNode::as_of]. Either the value is known from the
/// leaf's in-memory state, or it has aged into the on-disk history index
/// and the caller must resolve the read request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AsOf {
    Native { value: Option<Vec<u8>> },
    Reference { req: HistoryReadRequest },
}

/// Leaf node, holds the current state of one key and a bounded buffer
/// of its previous versions.
#[derive(Clone, Debug)]
pub struct LeafNode {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    tx: u128,
    flags: u8,
    // Data-log offset of the plain entry holding this key's bytes.
    key_offset: u64,
    // Data-log offset of the value entry for the current value, ZERO
    // when deleted.
    current_offset: u64,
    // Previous versions in ascending tx order, only versions not yet
    // spilled to disk.
    history: Vec<HistoryRecord>,
    // Number of versions spilled into the history index over this
    // leaf's lifetime, advances past each spilled batch.
    history_write_index: u64,
    // Offset of the root node of this key's on-disk history btree,
    // ZERO means nothing has spilled.
    history_offset: u64,
    history_cap: usize,
}

impl LeafNode {
    /// New leaf for `key` with its first value. `init_flags` are XOR-ed
    /// against [DEFAULT_FLAGS].
    pub fn new(
        key: Vec<u8>,
        value: Vec<u8>,
        tx: u128,
        init_flags: u8,
        key_offset: u64,
        current_offset: u64,
        history_cap: usize,
    ) -> LeafNode {
        LeafNode {
            key,
            value: Some(value),
            tx,
            flags: init_flags ^ DEFAULT_FLAGS,
            key_offset,
            current_offset,
            history: Vec::default(),
            history_write_index: 0,
            history_offset: 0,
            history_cap: std::cmp::max(1, history_cap),
        }
    }

    /// Record a new version for this key. The superseded state is pushed
    /// into the history buffer; when `delete` the value is forced absent
    /// and the delete flag set. Return a [WriteRequest] describing what
    /// must be persisted.
    pub fn add_record(
        &mut self,
        value: Option<Vec<u8>>,
        tx: u128,
        delete: bool,
    ) -> WriteRequest {
        self.history.push(HistoryRecord {
            tx: self.tx,
            value: self.value.clone(),
            deleted: self.is_deleted(),
            offset: self.current_offset,
        });

        self.tx = tx;
        if delete {
            self.flags |= LEAF_DELETED;
            self.value = None;
            self.current_offset = 0;
        } else {
            self.flags &= !LEAF_DELETED;
            self.value = value;
        }

        self.to_write_req(self.value.clone())
    }

    /// Snapshot this leaf's latest state for persistence.
    pub fn to_write_req(&self, value: Option<Vec<u8>>) -> WriteRequest {
        WriteRequest {
            offset: None,
            delete: self.is_deleted(),
            value: value.unwrap_or_default(),
            tx: self.tx,
        }
    }

    /// Value of this key as of transaction `tx`.
    ///
    /// * `tx` at or after the latest write, the current value.
    /// * `tx` older than the in-memory buffer and history spilled,
    ///   a [HistoryReadRequest] for the caller to resolve.
    /// * otherwise the newest buffered version at or before `tx`, None
    ///   when the key had not been written yet.
    pub fn as_of(&self, tx: u128) -> AsOf {
        if tx >= self.tx {
            return AsOf::Native {
                value: self.to_value(),
            };
        }

        let aged_out = match self.history.first() {
            Some(first) => tx < first.tx,
            None => true, // buffer drained by a spill
        };
        if aged_out && self.history_offset != 0 {
            let req = HistoryReadRequest {
                offset: self.history_offset,
                tx,
            };
            return AsOf::Reference { req };
        }

        match self.history.iter().rev().find(|r| r.tx <= tx) {
            Some(r) if r.deleted => AsOf::Native { value: None },
            Some(r) => AsOf::Native {
                value: r.value.clone(),
            },
            None => AsOf::Native { value: None },
        }
    }

    /// Drain the history buffer for spilling, once it has reached
    /// capacity. Return None when there is nothing to spill, either the
    /// buffer has room or history persistence is disabled for this leaf.
    pub fn take_spill_batch(&mut self) -> Option<Vec<HistoryRecord>> {
        if (self.flags & LEAF_PERSIST_HISTORY) == 0 {
            return None;
        }
        if self.history.len() < self.history_cap {
            return None;
        }

        let batch: Vec<HistoryRecord> = self.history.drain(..).collect();
        self.history_write_index += batch.len() as u64;
        Some(batch)
    }

    pub fn set_current_offset(&mut self, offset: u64) {
        self.current_offset = offset;
    }

    pub fn set_history_offset(&mut self, offset: u64) {
        self.history_offset = offset;
    }
}

impl LeafNode {
    #[inline]
    pub fn as_key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub fn to_value(&self) -> Option<Vec<u8>> {
        if self.is_deleted() {
            None
        } else {
            self.value.clone()
        }
    }

    #[inline]
    pub fn to_tx(&self) -> u128 {
        self.tx
    }

    #[inline]
    pub fn to_flags(&self) -> u8 {
        self.flags
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        (self.flags & LEAF_DELETED) != 0
    }

    #[inline]
    pub fn to_key_offset(&self) -> u64 {
        self.key_offset
    }

    #[inline]
    pub fn to_current_offset(&self) -> u64 {
        self.current_offset
    }

    #[inline]
    pub fn to_history_offset(&self) -> u64 {
        self.history_offset
    }

    #[inline]
    pub fn to_history_write_index(&self) -> u64 {
        self.history_write_index
    }

    /// Buffered versions, oldest first.
    #[inline]
    pub fn as_history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Value length of the current value, ZERO when deleted.
    pub fn to_value_length(&self) -> usize {
        match &self.value {
            Some(value) if !self.is_deleted() => value.len(),
            _ => 0,
        }
    }
}

impl LeafNode {
    // Invariant checks on the in-memory history buffer.
    pub(crate) fn validate(&self, tree_tx: u128) -> Result<()> {
        let mut prev: Option<u128> = None;
        for r in self.history.iter() {
            match prev {
                Some(p) if r.tx <= p => {
                    return err_at!(
                        UnreachableState, msg: "history tx {} after {}", r.tx, p
                    );
                }
                _ => prev = Some(r.tx),
            }
            if r.tx >= self.tx {
                return err_at!(
                    UnreachableState, msg: "history tx {} >= leaf tx {}", r.tx, self.tx
                );
            }
        }

        if self.tx > tree_tx {
            return err_at!(
                UnreachableState, msg: "leaf tx {} > tree tx {}", self.tx, tree_tx
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "leaf_test.rs"]
mod leaf_test;
