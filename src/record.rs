//! Module `record` implement the on-disk record formats.
//!
//! Three record kinds are serialized by this package. History-index
//! nodes, fixed-size btree nodes indexing a key's past versions by
//! transaction number. Data-log entries, variable-length key and value
//! payloads. And main-index entries, fixed-size projections of the
//! in-memory btree nodes. All integers are encoded little-endian,
//! unsigned.

use lazy_static::lazy_static;

use std::convert::TryInto;

use crate::{check_remaining, err_at, Result, MAX_CHILDREN, MAX_VALUE_SIZE};

lazy_static! {
    pub static ref ROOT_MARKER: Vec<u8> = {
        let marker = "hbt-root-marker/0.1";
        marker.as_bytes().to_vec()
    };
}

/// Return a marker block of exactly `size` bytes, the [ROOT_MARKER]
/// padded with zeros. Streams are primed with a marker block so that
/// offset ZERO never addresses a live record.
pub fn marker_block(size: usize) -> Vec<u8> {
    let mut block = ROOT_MARKER.clone();
    block.resize(size, 0);
    block
}

// Binary format (history-index child):
//
// *-----*------------------------------------*
// |flags|        128-bit tx                  |
// *-----*------------------------------------*
// |             64-bit off-or-val            |
// *------------------------------------------*
// |             64-bit len-or-val            |
// *------------------------------------------*
//
// Flags:
// * bit 0 set means the off/len words carry the value bytes inline.
// * bit 1 set means the entry is populated, clear means padding.
// * bit 2 set means the record is a tombstone, value absent.
// * bits 3-7 carry the inline value length, 0..=16.
const CHILD_SIZE: usize = 1 + 16 + 8 + 8;

/// Child entry of a [HistoryIndexNode].
///
/// At node depth ZERO a child describes one historical version of a key,
/// `tx` is the version's own transaction number and the off/len words
/// either carry the value inline or reference a value entry in the data
/// log. At depth greater than ZERO a child points at another history
/// index node and `tx` is the maximum transaction number of that
/// subtree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HistoryIndexChild {
    pub flags: u8,
    pub tx: u128,
    pub off_or_val: u64,
    pub len_or_val: u64,
}

impl HistoryIndexChild {
    pub const INLINE: u8 = 0x01;
    pub const REAL: u8 = 0x02;
    pub const DELETED: u8 = 0x04;
    const INLINE_LEN_SHIFT: u8 = 3;

    /// Maximum value length that can be carried inline in the off/len words.
    pub const INLINE_MAX: usize = 16;

    /// New depth-0 child carrying `value` inline, `value` must not exceed
    /// [Self::INLINE_MAX] bytes.
    pub fn new_inline(tx: u128, value: &[u8]) -> Result<HistoryIndexChild> {
        if value.len() > Self::INLINE_MAX {
            return err_at!(InvalidRecord, msg: "inline value {}b", value.len());
        }

        let mut scratch = [0_u8; 16];
        scratch[..value.len()].copy_from_slice(value);

        let val = HistoryIndexChild {
            flags: Self::REAL
                | Self::INLINE
                | ((value.len() as u8) << Self::INLINE_LEN_SHIFT),
            tx,
            off_or_val: u64::from_le_bytes(scratch[..8].try_into().unwrap()),
            len_or_val: u64::from_le_bytes(scratch[8..].try_into().unwrap()),
        };

        Ok(val)
    }

    /// New depth-0 child referencing a value entry in the data log,
    /// `offset` locates the entry and `length` is the payload length.
    pub fn new_reference(tx: u128, offset: u64, length: u64) -> HistoryIndexChild {
        HistoryIndexChild {
            flags: Self::REAL,
            tx,
            off_or_val: offset,
            len_or_val: length,
        }
    }

    /// New depth-0 child recording a tombstone.
    pub fn new_tombstone(tx: u128) -> HistoryIndexChild {
        HistoryIndexChild {
            flags: Self::REAL | Self::DELETED,
            tx,
            off_or_val: 0,
            len_or_val: 0,
        }
    }

    /// New child pointing at another history-index node, for depths
    /// greater than ZERO. `max_tx` is the maximum transaction number of
    /// the subtree rooted at `offset`.
    pub fn new_subtree(max_tx: u128, offset: u64) -> HistoryIndexChild {
        HistoryIndexChild {
            flags: Self::REAL,
            tx: max_tx,
            off_or_val: offset,
            len_or_val: HistoryIndexNode::SIZE as u64,
        }
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        (self.flags & Self::REAL) != 0
    }

    #[inline]
    pub fn is_inline(&self) -> bool {
        (self.flags & Self::INLINE) != 0
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        (self.flags & Self::DELETED) != 0
    }

    /// Unpack the inline value carried in the off/len words.
    pub fn to_inline_value(&self) -> Result<Vec<u8>> {
        if !self.is_inline() {
            return err_at!(InvalidRecord, msg: "child is not inline");
        }

        let n = (self.flags >> Self::INLINE_LEN_SHIFT) as usize;
        if n > Self::INLINE_MAX {
            return err_at!(InvalidRecord, msg: "inline length {}", n);
        }

        let mut scratch = [0_u8; 16];
        scratch[..8].copy_from_slice(&self.off_or_val.to_le_bytes());
        scratch[8..].copy_from_slice(&self.len_or_val.to_le_bytes());
        Ok(scratch[..n].to_vec())
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.extend_from_slice(&self.tx.to_le_bytes());
        buf.extend_from_slice(&self.off_or_val.to_le_bytes());
        buf.extend_from_slice(&self.len_or_val.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> HistoryIndexChild {
        HistoryIndexChild {
            flags: buf[0],
            tx: u128::from_le_bytes(buf[1..17].try_into().unwrap()),
            off_or_val: u64::from_le_bytes(buf[17..25].try_into().unwrap()),
            len_or_val: u64::from_le_bytes(buf[25..33].try_into().unwrap()),
        }
    }
}

// Binary format (history-index node):
//
// *------------------*-----------------------*
// |   16-bit depth   |  child 0 .. child 169 |
// *------------------*-----------------------*
//
// Nodes are always MAX_CHILDREN wide on disk. Short batches are padded
// with zeroed children, real children carry the REAL flag and their tx
// entries are strictly ascending.

/// On-disk history-index node, a fixed fan-out btree node indexing a
/// key's past versions by transaction number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryIndexNode {
    /// Offset in the history-index file this node was decoded from. Not
    /// serialized.
    pub offset: u64,
    /// Distance from the bottom of the history btree, ZERO for nodes
    /// whose children are version records.
    pub depth: u16,
    /// Exactly [MAX_CHILDREN] children.
    pub children: Vec<HistoryIndexChild>,
}

impl HistoryIndexNode {
    /// Size of a serialized node, in bytes.
    pub const SIZE: usize = 2 + (CHILD_SIZE * MAX_CHILDREN);

    /// New node from `children`, must supply exactly [MAX_CHILDREN] of
    /// them, pad short batches with `HistoryIndexChild::default()`.
    pub fn new(depth: u16, children: Vec<HistoryIndexChild>) -> Result<HistoryIndexNode> {
        if children.len() != MAX_CHILDREN {
            return err_at!(
                InvalidRecord, msg: "must have exactly {} children, got {}",
                MAX_CHILDREN, children.len()
            );
        }

        let val = HistoryIndexNode {
            offset: 0,
            depth,
            children,
        };

        Ok(val)
    }

    /// Build a node from a short batch, padding with sentinel children.
    pub fn from_batch(
        depth: u16,
        mut children: Vec<HistoryIndexChild>,
    ) -> Result<HistoryIndexNode> {
        if children.len() > MAX_CHILDREN {
            return err_at!(InvalidRecord, msg: "batch of {}", children.len());
        }
        children.resize(MAX_CHILDREN, HistoryIndexChild::default());
        Self::new(depth, children)
    }

    /// Number of populated children.
    pub fn n_real(&self) -> usize {
        self.children.iter().take_while(|c| c.is_real()).count()
    }

    /// Populated children, always a prefix of the child array.
    pub fn as_real(&self) -> &[HistoryIndexChild] {
        &self.children[..self.n_real()]
    }

    /// Maximum transaction number covered by this node.
    pub fn to_max_tx(&self) -> Result<u128> {
        match self.as_real().last() {
            Some(child) => Ok(child.tx),
            None => err_at!(InvalidRecord, msg: "empty history node"),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        buf.extend_from_slice(&self.depth.to_le_bytes());
        for child in self.children.iter() {
            child.encode(buf);
        }
        Self::SIZE
    }

    /// Deserialize a node from `buf`, recording `offset` as where it was
    /// read from.
    pub fn decode(buf: &[u8], offset: u64) -> Result<HistoryIndexNode> {
        check_remaining!(buf, Self::SIZE, "history-index-node")?;

        let depth = u16::from_le_bytes(buf[..2].try_into().unwrap());
        let mut children = Vec::with_capacity(MAX_CHILDREN);
        for i in 0..MAX_CHILDREN {
            let off = 2 + (i * CHILD_SIZE);
            children.push(HistoryIndexChild::decode(&buf[off..off + CHILD_SIZE]));
        }

        let val = HistoryIndexNode {
            offset,
            depth,
            children,
        };

        Ok(val)
    }
}

// Binary format (data-log entry):
//
// *-----*------------------------------------*
// |flags|        64-bit length               |
// *-----*------------------------------------*
// |                payload                   |
// *------------------------------------------*
//
// Binary format (value data-log entry):
//
// *-----*------------------------------------*
// |flags|        64-bit length               |
// *-----*------------------------------------*
// |            64-bit key-offset             |
// *------------------------------------------*
// |                payload                   |
// *------------------------------------------*
//
// Flags:
// * bit 0 clear for plain entries, set for value entries.
// * bit 1-7 reserved.

/// Entry in the data log. Key and value payloads live in the same
/// stream, discriminated by the entry's flag byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataLogEntry {
    /// Plain payload, typically a key's bytes.
    Plain { data: Vec<u8> },
    /// Value payload, `key_offset` references the plain entry holding
    /// the key this value was written for.
    Value { key_offset: u64, data: Vec<u8> },
}

impl DataLogEntry {
    const VALUE_FLAG: u8 = 0x01;

    /// Serialized size of a plain entry carrying `len` payload bytes.
    pub fn plain_size(len: usize) -> usize {
        1 + 8 + len
    }

    /// Serialized size of a value entry carrying `len` payload bytes.
    pub fn value_size(len: usize) -> usize {
        1 + 8 + 8 + len
    }

    pub fn as_data(&self) -> &[u8] {
        match self {
            DataLogEntry::Plain { data } => data,
            DataLogEntry::Value { data, .. } => data,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        match self {
            DataLogEntry::Plain { data } => {
                buf.push(0);
                buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
                buf.extend_from_slice(data);
                Self::plain_size(data.len())
            }
            DataLogEntry::Value { key_offset, data } => {
                buf.push(Self::VALUE_FLAG);
                buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
                buf.extend_from_slice(&key_offset.to_le_bytes());
                buf.extend_from_slice(data);
                Self::value_size(data.len())
            }
        }
    }

    /// Deserialize an entry from `buf`. The length word is read before
    /// any payload byte is consumed; impossible lengths fail with
    /// `InvalidRecord`. Return the entry and the number of bytes
    /// consumed.
    pub fn decode(buf: &[u8]) -> Result<(DataLogEntry, usize)> {
        check_remaining!(buf, 9, "data-log-entry header")?;

        let flags = buf[0];
        let length = u64::from_le_bytes(buf[1..9].try_into().unwrap()) as usize;
        if length > MAX_VALUE_SIZE {
            return err_at!(InvalidRecord, msg: "payload length {}", length);
        }

        if (flags & Self::VALUE_FLAG) == 0 {
            check_remaining!(buf, 9 + length, "data-log-entry payload")?;
            let data = buf[9..9 + length].to_vec();
            Ok((DataLogEntry::Plain { data }, 9 + length))
        } else {
            check_remaining!(buf, 17 + length, "value-log-entry payload")?;
            let key_offset = u64::from_le_bytes(buf[9..17].try_into().unwrap());
            let data = buf[17..17 + length].to_vec();
            Ok((DataLogEntry::Value { key_offset, data }, 17 + length))
        }
    }
}

// Binary format (main-index entry):
//
// *------------------*-----------------------*
// |   16-bit depth   |   22-byte bitmap      |
// *------------------*-----------------------*
// |  (k-off, v-off, len) triple 0 .. 169     |
// *------------------------------------------*
//
// Bitmap bit i set means triple i is populated. At depth ZERO triples
// are (key-offset, current-value-offset, value-length), deleted leaves
// carry (key-offset, 0, 0). At depth greater than ZERO triples are
// (max-key-offset, child-entry-offset, max-key-length).

const BITMAP_SIZE: usize = (MAX_CHILDREN + 7) / 8;
const TRIPLE_SIZE: usize = 8 + 8 + 8;

/// Child triple of a [MainIndexEntry].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MainIndexChild {
    pub key_off: u64,
    pub val_off: u64,
    pub length: u64,
}

/// On-disk projection of an in-memory btree node. A node holding leaves
/// serializes at depth ZERO, deeper nodes at their in-memory depth less
/// one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MainIndexEntry {
    pub depth: u16,
    bitmap: [u8; BITMAP_SIZE],
    pub children: Vec<MainIndexChild>,
}

impl MainIndexEntry {
    /// Size of a serialized entry, in bytes.
    pub const SIZE: usize = 2 + BITMAP_SIZE + (TRIPLE_SIZE * MAX_CHILDREN);

    /// New entry from the populated `children`, padded to [MAX_CHILDREN]
    /// triples. More than [MAX_CHILDREN] children is `InvalidRecord`.
    pub fn new(depth: u16, mut children: Vec<MainIndexChild>) -> Result<MainIndexEntry> {
        if children.len() > MAX_CHILDREN {
            return err_at!(
                InvalidRecord, msg: "must have at most {} children, got {}",
                MAX_CHILDREN, children.len()
            );
        }

        let mut bitmap = [0_u8; BITMAP_SIZE];
        for i in 0..children.len() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
        children.resize(MAX_CHILDREN, MainIndexChild::default());

        let val = MainIndexEntry {
            depth,
            bitmap,
            children,
        };

        Ok(val)
    }

    /// Whether child `i` is populated.
    #[inline]
    pub fn is_set(&self, i: usize) -> bool {
        (self.bitmap[i / 8] & (1 << (i % 8))) != 0
    }

    /// Number of populated children.
    pub fn n_real(&self) -> usize {
        (0..MAX_CHILDREN).take_while(|i| self.is_set(*i)).count()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        buf.extend_from_slice(&self.depth.to_le_bytes());
        buf.extend_from_slice(&self.bitmap);
        for child in self.children.iter() {
            buf.extend_from_slice(&child.key_off.to_le_bytes());
            buf.extend_from_slice(&child.val_off.to_le_bytes());
            buf.extend_from_slice(&child.length.to_le_bytes());
        }
        Self::SIZE
    }

    pub fn decode(buf: &[u8]) -> Result<MainIndexEntry> {
        check_remaining!(buf, Self::SIZE, "main-index-entry")?;

        let depth = u16::from_le_bytes(buf[..2].try_into().unwrap());
        let mut bitmap = [0_u8; BITMAP_SIZE];
        bitmap.copy_from_slice(&buf[2..2 + BITMAP_SIZE]);

        let mut children = Vec::with_capacity(MAX_CHILDREN);
        for i in 0..MAX_CHILDREN {
            let off = 2 + BITMAP_SIZE + (i * TRIPLE_SIZE);
            children.push(MainIndexChild {
                key_off: u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()),
                val_off: u64::from_le_bytes(buf[off + 8..off + 16].try_into().unwrap()),
                length: u64::from_le_bytes(buf[off + 16..off + 24].try_into().unwrap()),
            });
        }

        let val = MainIndexEntry {
            depth,
            bitmap,
            children,
        };

        Ok(val)
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
