//! Module `tree` implement the buffered btree index.
//!
//! [Index] routes every mutation to the leaf owning the key, tags it
//! with the next transaction number and grows the tree by splitting
//! full nodes along the descent path. Reads come in two flavours,
//! [Index::get] for the current value and [Index::as_of] for the value
//! visible at an older transaction.

use log::{debug, info};

use std::{
    marker, mem,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    dlog::DataLogger,
    err_at,
    inter::{Child, IntermediateNode},
    leaf::{AsOf, HistoryRecord, LeafNode, LEAF_PERSIST_HISTORY},
    record::{
        self, HistoryIndexChild, HistoryIndexNode, MainIndexChild, MainIndexEntry,
    },
    searcher::HistorySearcher,
    types::Serialize,
    Config, Error, IoHandler, Result, HISTORY_CAP, MAX_CHILDREN, MAX_VALUE_SIZE,
};

/// Index type for a buffered btree with per-key write history.
///
/// Mutations serialize on the index's mutex; the IO handlers carry
/// their own locks and are acquired one at a time, always after the
/// index's. Cloned handles share the same underlying tree.
pub struct Index<K, V> {
    name: String,
    inner: Arc<Mutex<Inner>>,

    _key: marker::PhantomData<K>,
    _value: marker::PhantomData<V>,
}

impl<K, V> Clone for Index<K, V> {
    fn clone(&self) -> Index<K, V> {
        Index {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),

            _key: marker::PhantomData,
            _value: marker::PhantomData,
        }
    }
}

impl<K, V> Index<K, V> {
    /// Create a new index under `name`, with `history_io` backing the
    /// history-index stream and `data_io` backing the data log.
    pub fn new(name: &str, history_io: IoHandler, data_io: IoHandler) -> Result<Index<K, V>> {
        let mut config = Config::new(name);
        config.set_tx_epoch(0).set_history_cap(HISTORY_CAP);
        Self::with_config(config, history_io, data_io)
    }

    /// Create a new index from `config`.
    pub fn with_config(
        config: Config,
        mut history_io: IoHandler,
        data_io: IoHandler,
    ) -> Result<Index<K, V>> {
        history_io.set_page_size(HistoryIndexNode::SIZE);
        let hio = Arc::new(history_io);
        if hio.to_size()? == 0 {
            hio.write(None, &record::marker_block(HistoryIndexNode::SIZE))?;
        }

        let dlog = DataLogger::new(Arc::new(data_io))?;

        info!(
            target: "hbt   ", "{:?}, new index, tx_epoch:{} history_cap:{}",
            config.name, config.tx_epoch, config.history_cap
        );

        let inner = Inner {
            name: config.name.clone(),
            head: IntermediateNode::new(1),
            tx: config.tx_epoch,
            tx_epoch: config.tx_epoch,
            history_cap: config.history_cap,
            n_count: 0,
            n_deleted: 0,
            n_spills: 0,
            hio,
            dlog,
        };

        let val = Index {
            name: config.name,
            inner: Arc::new(Mutex::new(inner)),

            _key: marker::PhantomData,
            _value: marker::PhantomData,
        };

        Ok(val)
    }

    /// Update index to a new transaction epoch, future mutations shall
    /// be tagged starting from this value. Return the old counter.
    pub fn set_tx_epoch(&self, tx_epoch: u128) -> Result<u128> {
        let mut inner = self.as_inner()?;
        let old = inner.tx;
        inner.tx = tx_epoch;
        inner.tx_epoch = tx_epoch;
        Ok(old)
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }

    fn as_inner(&self) -> Result<MutexGuard<Inner>> {
        match self.inner.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => err_at!(Fatal, msg: "poisoned lock in {:?}", self.name),
        }
    }
}

impl<K, V> Index<K, V> {
    /// Return name of this index instance.
    #[inline]
    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    /// Return the current transaction counter, `tx_epoch + N` after N
    /// state-changing mutations.
    pub fn to_tx(&self) -> Result<u128> {
        Ok(self.as_inner()?.tx)
    }

    /// Return number of live keys in this instance.
    pub fn len(&self) -> Result<usize> {
        Ok(self.as_inner()?.n_count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Return number of keys whose latest operation is a delete.
    pub fn deleted_count(&self) -> Result<usize> {
        Ok(self.as_inner()?.n_deleted)
    }

    pub fn to_stats(&self) -> Result<Stats> {
        let inner = self.as_inner()?;
        let val = Stats {
            name: inner.name.clone(),
            n_count: inner.n_count,
            n_deleted: inner.n_deleted,
            n_spills: inner.n_spills,
            tx: inner.tx,
            tx_epoch: inner.tx_epoch,
            depth: inner.head.depth,
            history_cap: inner.history_cap,
        };
        Ok(val)
    }

    /// Walk the tree checking structural invariants, child ordering,
    /// max-key agreement, child-count bounds and history monotonicity.
    /// Leaves all live at depth ONE by construction.
    pub fn validate(&self) -> Result<()> {
        let inner = self.as_inner()?;
        inner.head.validate(true, inner.tx)?;

        let (total, deleted) = count_subtree(&inner.head);
        if total != inner.n_count + inner.n_deleted {
            return err_at!(
                UnreachableState, msg: "leaf count {} != {}+{}", total, inner.n_count,
                inner.n_deleted
            );
        }
        if deleted != inner.n_deleted {
            return err_at!(
                UnreachableState, msg: "deleted count {} != {}", deleted, inner.n_deleted
            );
        }

        Ok(())
    }
}

impl<K, V> Index<K, V>
where
    K: Serialize,
    V: Serialize,
{
    /// Set `value` for `key`. A fresh key inserts a new leaf, an
    /// existing key records a new version. Return the transaction
    /// number tagged onto this mutation.
    pub fn put(&self, key: K, value: V) -> Result<u128> {
        let key = to_key_bytes(&key)?;
        let value = to_value_bytes(&value)?;

        let mut inner = self.as_inner()?;
        match inner.write(&key, Some(value), false)? {
            Some(tx) => Ok(tx),
            None => err_at!(UnreachableState, msg: "put was a no-op"),
        }
    }

    /// Delete `key`, recording a tombstone version. Deleting an absent
    /// key is a no-op and returns None without consuming a transaction
    /// number.
    pub fn delete(&self, key: &K) -> Result<Option<u128>> {
        let key = to_key_bytes(key)?;

        let mut inner = self.as_inner()?;
        inner.write(&key, None, true)
    }

    /// Get the current value for `key`, None when the key is missing or
    /// its latest operation was a delete.
    pub fn get(&self, key: &K) -> Result<Option<V>>
    where
        V: Default,
    {
        let key = to_key_bytes(key)?;

        let inner = self.as_inner()?;
        match get_subtree(&inner.head, &key) {
            Some(leaf) => leaf.to_value().map(from_value_bytes).transpose(),
            None => Ok(None),
        }
    }

    /// Get the value that was current for `key` at transaction `tx`,
    /// None when the key had no value at that transaction. Served from
    /// the leaf's in-memory buffer when the target is recent enough,
    /// resolved through the on-disk history index otherwise.
    pub fn as_of(&self, key: &K, tx: u128) -> Result<Option<V>>
    where
        V: Default,
    {
        let key = to_key_bytes(key)?;

        let inner = self.as_inner()?;
        let leaf = match get_subtree(&inner.head, &key) {
            Some(leaf) => leaf,
            None => return Ok(None),
        };

        let value = match leaf.as_of(tx) {
            AsOf::Native { value } => value,
            AsOf::Reference { req } => {
                HistorySearcher::new(&inner.hio, &inner.dlog).search(req)?
            }
        };

        value.map(from_value_bytes).transpose()
    }

    /// Persist the main index through `io`, bottom-up, as fixed-size
    /// entries. Return the offset of the root entry.
    pub fn persist(&self, io: &IoHandler) -> Result<u64> {
        let inner = self.as_inner()?;
        let (offset, _, _) = persist_subtree(&inner.head, io)?;

        info!(
            target: "hbt   ", "{:?}, main index persisted, root at {}", inner.name,
            offset
        );

        Ok(offset)
    }
}

/// Statistics for the buffered btree index.
#[derive(Clone, Debug)]
pub struct Stats {
    pub name: String,
    /// Number of live keys.
    pub n_count: usize,
    /// Number of keys whose latest operation is a delete.
    pub n_deleted: usize,
    /// Number of history batches spilled to disk.
    pub n_spills: usize,
    /// Current transaction counter.
    pub tx: u128,
    pub tx_epoch: u128,
    /// Depth of the root node; leaves hang off depth-ONE nodes.
    pub depth: usize,
    pub history_cap: usize,
}

struct Inner {
    name: String,
    head: IntermediateNode,
    tx: u128,
    tx_epoch: u128,
    history_cap: usize,

    n_count: usize,
    n_deleted: usize,
    n_spills: usize,

    hio: Arc<IoHandler>,
    dlog: DataLogger,
}

enum WriteOutcome {
    Fresh,
    Updated { was_deleted: bool },
    Noop,
}

impl Inner {
    // Single entry point for put/delete. Return the transaction number
    // consumed by the mutation, None for no-op deletes.
    fn write(
        &mut self,
        key: &[u8],
        value: Option<Vec<u8>>,
        delete: bool,
    ) -> Result<Option<u128>> {
        let tx = self.tx;
        loop {
            let res = {
                let history_cap = self.history_cap;
                let Inner {
                    head,
                    dlog,
                    hio,
                    n_spills,
                    ..
                } = self;
                write_subtree(
                    head,
                    key,
                    value.as_deref(),
                    delete,
                    tx,
                    history_cap,
                    dlog,
                    hio,
                    n_spills,
                )
            };

            match res {
                Err(Error::NodeFull(_, _)) => self.split_nodes(key)?,
                Err(err) => break Err(err),
                Ok(WriteOutcome::Noop) => break Ok(None),
                Ok(outcome) => {
                    match outcome {
                        WriteOutcome::Fresh => self.n_count += 1,
                        WriteOutcome::Updated { was_deleted } => {
                            match (delete, was_deleted) {
                                (true, false) => {
                                    self.n_count -= 1;
                                    self.n_deleted += 1;
                                }
                                (false, true) => {
                                    self.n_count += 1;
                                    self.n_deleted -= 1;
                                }
                                _ => (),
                            }
                        }
                        WriteOutcome::Noop => unreachable!(),
                    }
                    self.tx = tx + 1;
                    break Ok(Some(tx));
                }
            }
        }
    }

    // Make room along `key`'s descent path. Grow a new root when the
    // head is full, then split every full node down the path. After
    // this, re-running the write cannot hit NodeFull on the same path.
    fn split_nodes(&mut self, key: &[u8]) -> Result<()> {
        if self.head.is_full() {
            let sibling = self.head.split();
            let depth = self.head.depth + 1;
            let max_key = sibling.max_key.clone();

            let old = mem::replace(&mut self.head, IntermediateNode::new(depth));
            self.head.max_key = max_key;
            self.head.children.push(Child::M { node: old });
            self.head.children.push(Child::M { node: sibling });

            debug!(target: "hbt   ", "{:?}, grown root to depth {}", self.name, depth);
        }

        split_subtree(&mut self.head, key)
    }
}

// Recursive descent for put/delete. The call stack is the descent
// stack; ancestors widen their max-key on the way out of a fresh
// insert.
#[allow(clippy::too_many_arguments)]
fn write_subtree(
    node: &mut IntermediateNode,
    key: &[u8],
    value: Option<&[u8]>,
    delete: bool,
    tx: u128,
    history_cap: usize,
    dlog: &DataLogger,
    hio: &IoHandler,
    n_spills: &mut usize,
) -> Result<WriteOutcome> {
    if node.depth > 1 {
        let off = node.off_for_insert(key)?;
        let outcome = match &mut node.children[off] {
            Child::M { node: child } => write_subtree(
                child, key, value, delete, tx, history_cap, dlog, hio, n_spills,
            )?,
            Child::Z { .. } => {
                return err_at!(UnreachableState, msg: "leaf child above depth 1")
            }
        };
        if let WriteOutcome::Fresh = outcome {
            node.widen(key);
        }
        return Ok(outcome);
    }

    if let Some(leaf) = node.search_leaf_mut(key) {
        let was_deleted = leaf.is_deleted();
        let wreq = leaf.add_record(value.map(|v| v.to_vec()), tx, delete);
        if !wreq.delete {
            let offset = dlog.append_value(leaf.to_key_offset(), &wreq.value)?;
            leaf.set_current_offset(offset);
        }

        if let Some(batch) = leaf.take_spill_batch() {
            let offset = spill_history(
                hio,
                dlog,
                leaf.to_key_offset(),
                leaf.to_history_offset(),
                batch,
            )?;
            leaf.set_history_offset(offset);
            *n_spills += 1;
            debug!(
                target: "hbt   ", "history for {:?} spilled, root at {}", key, offset
            );
        }

        return Ok(WriteOutcome::Updated { was_deleted });
    }

    if delete {
        // deleting a key that was never written is a documented no-op.
        return Ok(WriteOutcome::Noop);
    }
    if node.is_full() {
        // fail before touching the data log, the caller splits and
        // retries.
        return err_at!(NodeFull, msg: "leaf run has {} children", MAX_CHILDREN);
    }

    let value = match value {
        Some(value) => value,
        None => return err_at!(UnreachableState, msg: "fresh insert without value"),
    };

    let key_offset = dlog.append_key(key)?;
    let value_offset = dlog.append_value(key_offset, value)?;
    let leaf = LeafNode::new(
        key.to_vec(),
        value.to_vec(),
        tx,
        LEAF_PERSIST_HISTORY,
        key_offset,
        value_offset,
        history_cap,
    );
    node.insert(Child::Z { leaf })?;

    Ok(WriteOutcome::Fresh)
}

// Split every full node along `key`'s descent path. `node` itself is
// never full on entry; splitting the child before descending keeps
// that invariant, so installing a sibling cannot overflow its parent.
fn split_subtree(node: &mut IntermediateNode, key: &[u8]) -> Result<()> {
    if node.depth == 1 {
        return Ok(());
    }

    let mut off = node.off_for_insert(key)?;
    if node.children[off].is_full() {
        let sibling = match &mut node.children[off] {
            Child::M { node: child } => child.split(),
            Child::Z { .. } => {
                return err_at!(UnreachableState, msg: "leaf child above depth 1")
            }
        };
        node.insert(Child::M { node: sibling })?;
        off = node.off_for_insert(key)?;
    }

    match &mut node.children[off] {
        Child::M { node: child } => split_subtree(child, key),
        Child::Z { .. } => err_at!(UnreachableState, msg: "leaf child above depth 1"),
    }
}

// Strict routing for reads, no last-child fallback.
fn get_subtree<'a>(node: &'a IntermediateNode, key: &[u8]) -> Option<&'a LeafNode> {
    match node.search(key)? {
        Child::M { node: child } => get_subtree(child, key),
        Child::Z { leaf } => Some(leaf),
    }
}

fn count_subtree(node: &IntermediateNode) -> (usize, usize) {
    let (mut total, mut deleted) = (0, 0);
    for child in node.children.iter() {
        match child {
            Child::M { node: child } => {
                let (t, d) = count_subtree(child);
                total += t;
                deleted += d;
            }
            Child::Z { leaf } => {
                total += 1;
                if leaf.is_deleted() {
                    deleted += 1;
                }
            }
        }
    }
    (total, deleted)
}

// Turn a drained history batch into a depth-0 history-index node and
// graft it under the key's history btree. On-disk nodes are immutable,
// so a fresh root is appended on every spill: the old root's children
// plus the new batch while the root has room, a taller two-child root
// otherwise. Return the offset of the new root.
fn spill_history(
    hio: &IoHandler,
    dlog: &DataLogger,
    key_offset: u64,
    history_offset: u64,
    batch: Vec<HistoryRecord>,
) -> Result<u64> {
    let mut children = Vec::with_capacity(batch.len());
    for rec in batch.into_iter() {
        let child = match (&rec.value, rec.deleted) {
            (_, true) => HistoryIndexChild::new_tombstone(rec.tx),
            (Some(value), false) if value.len() <= HistoryIndexChild::INLINE_MAX => {
                HistoryIndexChild::new_inline(rec.tx, value)?
            }
            (Some(value), false) => {
                let offset = match rec.offset {
                    0 => dlog.append_value(key_offset, value)?,
                    offset => offset,
                };
                HistoryIndexChild::new_reference(rec.tx, offset, value.len() as u64)
            }
            (None, false) => {
                return err_at!(UnreachableState, msg: "live record without value")
            }
        };
        children.push(child);
    }

    let batch_node = HistoryIndexNode::from_batch(0, children)?;
    let batch_max = batch_node.to_max_tx()?;
    let batch_off = write_node(hio, &batch_node)?;

    match history_offset {
        0 => Ok(batch_off),
        offset => {
            let buf = hio.read(offset, HistoryIndexNode::SIZE)?;
            let root = HistoryIndexNode::decode(&buf, offset)?;
            let root_max = root.to_max_tx()?;

            let new_root = if root.depth == 0 {
                HistoryIndexNode::from_batch(
                    1,
                    vec![
                        HistoryIndexChild::new_subtree(root_max, offset),
                        HistoryIndexChild::new_subtree(batch_max, batch_off),
                    ],
                )?
            } else if root.n_real() < MAX_CHILDREN {
                let mut children = root.as_real().to_vec();
                children.push(HistoryIndexChild::new_subtree(batch_max, batch_off));
                HistoryIndexNode::from_batch(root.depth, children)?
            } else {
                HistoryIndexNode::from_batch(
                    root.depth + 1,
                    vec![
                        HistoryIndexChild::new_subtree(root_max, offset),
                        HistoryIndexChild::new_subtree(batch_max, batch_off),
                    ],
                )?
            };

            write_node(hio, &new_root)
        }
    }
}

fn write_node(hio: &IoHandler, node: &HistoryIndexNode) -> Result<u64> {
    let mut buf = Vec::with_capacity(HistoryIndexNode::SIZE);
    node.encode(&mut buf);
    hio.write(None, &buf)
}

// Bottom-up projection of the in-memory tree into fixed-size
// main-index entries. Return (entry offset, max-key offset, max-key
// length) for the subtree.
fn persist_subtree(node: &IntermediateNode, io: &IoHandler) -> Result<(u64, u64, u64)> {
    let mut children = Vec::with_capacity(node.len());
    let mut max_key = (0, 0);

    for child in node.children.iter() {
        match child {
            Child::Z { leaf } => {
                let (val_off, length) = if leaf.is_deleted() {
                    (0, 0)
                } else {
                    (leaf.to_current_offset(), leaf.to_value_length() as u64)
                };
                children.push(MainIndexChild {
                    key_off: leaf.to_key_offset(),
                    val_off,
                    length,
                });
                max_key = (leaf.to_key_offset(), leaf.as_key().len() as u64);
            }
            Child::M { node: child } => {
                let (entry_off, key_off, key_len) = persist_subtree(child, io)?;
                children.push(MainIndexChild {
                    key_off,
                    val_off: entry_off,
                    length: key_len,
                });
                max_key = (key_off, key_len);
            }
        }
    }

    let depth = (node.depth - 1) as u16;
    let entry = MainIndexEntry::new(depth, children)?;

    let mut buf = Vec::with_capacity(MainIndexEntry::SIZE);
    entry.encode(&mut buf);
    let offset = io.write(None, &buf)?;

    Ok((offset, max_key.0, max_key.1))
}

fn to_key_bytes<K>(key: &K) -> Result<Vec<u8>>
where
    K: Serialize,
{
    let mut buf = vec![];
    key.encode(&mut buf);
    if buf.is_empty() {
        err_at!(InvalidWriteRequest, msg: "empty key")
    } else {
        Ok(buf)
    }
}

fn to_value_bytes<V>(value: &V) -> Result<Vec<u8>>
where
    V: Serialize,
{
    let mut buf = vec![];
    value.encode(&mut buf);
    if buf.len() > MAX_VALUE_SIZE {
        err_at!(InvalidWriteRequest, msg: "value of {} bytes", buf.len())
    } else {
        Ok(buf)
    }
}

fn from_value_bytes<V>(buf: Vec<u8>) -> Result<V>
where
    V: Default + Serialize,
{
    let mut value: V = V::default();
    value.decode(&buf)?;
    Ok(value)
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
