//! Module `searcher` implement lookups into the on-disk history index.

use std::cmp::Ordering;

use crate::{
    dlog::DataLogger,
    err_at,
    leaf::HistoryReadRequest,
    record::{HistoryIndexChild, HistoryIndexNode},
    IoHandler, Result,
};

/// Walks a key's on-disk history btree to answer as-of lookups whose
/// target transaction has aged out of the leaf's in-memory buffer.
pub struct HistorySearcher<'a> {
    hio: &'a IoHandler,
    dlog: &'a DataLogger,
}

impl<'a> HistorySearcher<'a> {
    pub fn new(hio: &'a IoHandler, dlog: &'a DataLogger) -> HistorySearcher<'a> {
        HistorySearcher { hio, dlog }
    }

    /// Resolve `req`, the value recorded by the newest spilled version
    /// at or before `req.tx`. None when the key had no version that old.
    pub fn search(&self, req: HistoryReadRequest) -> Result<Option<Vec<u8>>> {
        let mut node = self.read_node(req.offset)?;
        // Nearest sibling to the left of the descent path; its subtree
        // maximum is at or before the target.
        let mut prev: Option<u64> = None;

        while node.depth > 0 {
            let next = {
                let reals = node.as_real();
                if reals.is_empty() {
                    return err_at!(InvalidRecord, msg: "empty node at {}", node.offset);
                }

                // first child whose subtree maximum exceeds the target;
                // when the target is newer than every subtree, the last.
                let off = match frontier(reals, req.tx) {
                    off if off == reals.len() => reals.len() - 1,
                    off => off,
                };
                if off > 0 {
                    prev = Some(reals[off - 1].off_or_val);
                }
                reals[off].off_or_val
            };
            node = self.read_node(next)?;
        }

        let reals = node.as_real();
        match frontier(reals, req.tx) {
            // every version in this node is newer than the target; the
            // answer, if any, is the rightmost record of the nearest
            // left sibling.
            0 => match prev {
                Some(offset) => self.rightmost(offset),
                None => Ok(None),
            },
            off => self.resolve(&reals[off - 1]),
        }
    }

    // Descend along last children down to the newest record of the
    // subtree rooted at `offset`.
    fn rightmost(&self, offset: u64) -> Result<Option<Vec<u8>>> {
        let mut node = self.read_node(offset)?;
        loop {
            let child = match node.as_real().last() {
                Some(child) => *child,
                None => {
                    return err_at!(InvalidRecord, msg: "empty node at {}", node.offset)
                }
            };
            if node.depth == 0 {
                return self.resolve(&child);
            }
            node = self.read_node(child.off_or_val)?;
        }
    }

    fn resolve(&self, child: &HistoryIndexChild) -> Result<Option<Vec<u8>>> {
        if child.is_deleted() {
            Ok(None)
        } else if child.is_inline() {
            Ok(Some(child.to_inline_value()?))
        } else {
            let value = self.dlog.read_value(child.off_or_val, child.len_or_val)?;
            Ok(Some(value))
        }
    }

    fn read_node(&self, offset: u64) -> Result<HistoryIndexNode> {
        let buf = self.hio.read(offset, HistoryIndexNode::SIZE)?;
        HistoryIndexNode::decode(&buf, offset)
    }
}

// Index of the first child whose tx exceeds `tx`; `children.len()` when
// none does. Entries are ascending, so a binary search is admissible.
fn frontier(children: &[HistoryIndexChild], tx: u128) -> usize {
    children
        .binary_search_by(|child| {
            if child.tx <= tx {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })
        .unwrap_err()
}

#[cfg(test)]
#[path = "searcher_test.rs"]
mod searcher_test;
