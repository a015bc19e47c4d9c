//! Module `inter` implement the routing nodes of the buffered btree.

use std::cmp::Ordering;

use crate::{err_at, leaf::LeafNode, Result, MAX_CHILDREN};

/// Child of an [IntermediateNode]. Nodes at depth greater than ONE hold
/// `M` children, nodes at depth ONE hold `Z` children. The depth field
/// statically determines the variant.
#[derive(Clone, Debug)]
pub enum Child {
    /// Another intermediate node, one level closer to the leaves.
    M { node: IntermediateNode },
    /// A leaf node.
    Z { leaf: LeafNode },
}

impl Child {
    /// The key this child is ordered by within its parent, `max_key`
    /// for intermediate children and the leaf's own key for leaves.
    pub fn as_ordering_key(&self) -> &[u8] {
        match self {
            Child::M { node } => &node.max_key,
            Child::Z { leaf } => leaf.as_key(),
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        match self {
            Child::M { node } => node.is_full(),
            Child::Z { .. } => false,
        }
    }
}

/// Routing node over an ordered run of children. Children are kept
/// strictly ascending by their ordering key; `max_key` equals the
/// ordering key of the last child.
#[derive(Clone, Debug)]
pub struct IntermediateNode {
    pub max_key: Vec<u8>,
    pub depth: usize,
    pub children: Vec<Child>,
}

impl IntermediateNode {
    pub fn new(depth: usize) -> IntermediateNode {
        IntermediateNode {
            max_key: Vec::default(),
            depth,
            children: Vec::default(),
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.children.len() >= MAX_CHILDREN
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    // Position of `key` among the children's ordering keys.
    fn position(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.as_ordering_key().cmp(key))
    }

    /// Search for the child covering `key`. At depth greater than ONE,
    /// the first child whose `max_key` is at or above `key`. At depth
    /// ONE, the leaf whose key matches exactly. None when the key is not
    /// covered.
    pub fn search(&self, key: &[u8]) -> Option<&Child> {
        if self.children.is_empty() {
            return None;
        }

        match self.depth {
            1 => match self.position(key) {
                Ok(off) => Some(&self.children[off]),
                Err(_) => None,
            },
            _ => match self.position(key) {
                Ok(off) | Err(off) if off < self.children.len() => {
                    Some(&self.children[off])
                }
                _ => None,
            },
        }
    }

    /// Leaf holding exactly `key`, mutable. Only meaningful at depth ONE.
    pub fn search_leaf_mut(&mut self, key: &[u8]) -> Option<&mut LeafNode> {
        match self.position(key) {
            Ok(off) => match &mut self.children[off] {
                Child::Z { leaf } => Some(leaf),
                Child::M { .. } => None,
            },
            Err(_) => None,
        }
    }

    /// Index of the child to descend into when inserting `key`. As
    /// `search`, except that a key beyond the current maximum routes to
    /// the last child. Fails with `UnreachableState` on a node with no
    /// children.
    pub fn off_for_insert(&self, key: &[u8]) -> Result<usize> {
        if self.children.is_empty() {
            return err_at!(UnreachableState, msg: "no children to insert into");
        }

        let off = match self.position(key) {
            Ok(off) => off,
            Err(off) if off < self.children.len() => off,
            Err(_) => self.children.len() - 1,
        };
        Ok(off)
    }

    /// Insert `child` keeping the run ordered by the children's ordering
    /// keys. A duplicate ordering key fails with `InvalidInsert`, a full
    /// node fails with `NodeFull`. Extending the range updates
    /// `max_key`. Return the insert position.
    pub fn insert(&mut self, child: Child) -> Result<usize> {
        if self.is_full() {
            return err_at!(NodeFull, msg: "node has {} children", self.children.len());
        }

        let key = child.as_ordering_key();
        let off = match self.position(key) {
            Ok(_) => {
                return err_at!(InvalidInsert, msg: "duplicate key {:?}", key);
            }
            Err(off) => off,
        };

        if off == self.children.len() {
            self.max_key = key.to_vec();
        }
        self.children.insert(off, child);
        Ok(off)
    }

    /// Split this node at the mid point. The right half moves into the
    /// returned sibling, the left half stays in place; both ends update
    /// their `max_key`. The caller installs the sibling in the parent.
    pub fn split(&mut self) -> IntermediateNode {
        let mid = self.children.len() / 2;
        let right = self.children.split_off(mid);

        let sibling = IntermediateNode {
            max_key: right.last().map(|c| c.as_ordering_key().to_vec()).unwrap_or_default(),
            depth: self.depth,
            children: right,
        };

        self.max_key = self
            .children
            .last()
            .map(|c| c.as_ordering_key().to_vec())
            .unwrap_or_default();

        sibling
    }

    /// Widen `max_key` when `key` extends this node's range.
    pub fn widen(&mut self, key: &[u8]) {
        if self.max_key.as_slice() < key {
            self.max_key = key.to_vec();
        }
    }
}

impl IntermediateNode {
    // Structural invariant checks, recursive.
    pub(crate) fn validate(&self, is_root: bool, tree_tx: u128) -> Result<()> {
        if self.children.len() > MAX_CHILDREN {
            return err_at!(
                UnreachableState, msg: "{} children", self.children.len()
            );
        }
        if !is_root && self.children.is_empty() {
            return err_at!(UnreachableState, msg: "empty non-root node");
        }

        let mut prev: Option<&[u8]> = None;
        for child in self.children.iter() {
            let key = child.as_ordering_key();
            match prev {
                Some(p) if p.cmp(key) != Ordering::Less => {
                    return err_at!(
                        UnreachableState, msg: "unordered children at {:?}", key
                    );
                }
                _ => prev = Some(key),
            }

            match child {
                Child::M { node } if self.depth > 1 => {
                    if node.depth != self.depth - 1 {
                        return err_at!(
                            UnreachableState, msg: "child depth {} under {}", node.depth,
                            self.depth
                        );
                    }
                    node.validate(false, tree_tx)?;
                }
                Child::Z { leaf } if self.depth == 1 => leaf.validate(tree_tx)?,
                _ => {
                    return err_at!(
                        UnreachableState, msg: "child variant at depth {}", self.depth
                    );
                }
            }
        }

        match self.children.last() {
            Some(last) if last.as_ordering_key() != self.max_key.as_slice() => {
                err_at!(UnreachableState, msg: "max_key out of date")
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "inter_test.rs"]
mod inter_test;
