use super::*;

use crate::{leaf::LEAF_PERSIST_HISTORY, Error};

fn new_leaf(key: &[u8]) -> LeafNode {
    LeafNode::new(key.to_vec(), b"value".to_vec(), 0, LEAF_PERSIST_HISTORY, 0, 0, 16)
}

fn leaf_run(keys: &[&[u8]]) -> IntermediateNode {
    let mut node = IntermediateNode::new(1);
    for key in keys {
        node.insert(Child::Z { leaf: new_leaf(key) }).unwrap();
    }
    node
}

#[test]
fn test_insert_keeps_order() {
    let node = leaf_run(&[b"mmm", b"aaa", b"zzz", b"bbb"]);

    let keys: Vec<&[u8]> = node.children.iter().map(|c| c.as_ordering_key()).collect();
    assert_eq!(keys, vec![&b"aaa"[..], b"bbb", b"mmm", b"zzz"]);
    assert_eq!(node.max_key, b"zzz".to_vec());
    assert_eq!(node.len(), 4);
}

#[test]
fn test_insert_duplicate() {
    let mut node = leaf_run(&[b"aaa", b"bbb"]);
    match node.insert(Child::Z { leaf: new_leaf(b"aaa") }) {
        Err(Error::InvalidInsert(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_insert_full() {
    let mut node = IntermediateNode::new(1);
    for i in 0..MAX_CHILDREN {
        let key = format!("key{:03}", i).into_bytes();
        node.insert(Child::Z { leaf: new_leaf(&key) }).unwrap();
    }
    assert!(node.is_full());

    match node.insert(Child::Z { leaf: new_leaf(b"zzz") }) {
        Err(Error::NodeFull(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_search() {
    let mut node = leaf_run(&[b"bbb", b"ddd"]);

    match node.search(b"bbb") {
        Some(Child::Z { leaf }) => assert_eq!(leaf.as_key(), b"bbb"),
        res => panic!("unexpected {:?}", res),
    }
    // depth-1 search is exact, near misses return None.
    assert!(node.search(b"aaa").is_none());
    assert!(node.search(b"ccc").is_none());
    assert!(node.search(b"zzz").is_none());

    assert!(node.search_leaf_mut(b"ddd").is_some());
    assert!(node.search_leaf_mut(b"ccc").is_none());

    assert!(IntermediateNode::new(1).search(b"bbb").is_none());
}

#[test]
fn test_search_routing() {
    let mut root = IntermediateNode::new(2);
    for max in [b"ccc", b"fff", b"jjj"].iter() {
        let node = leaf_run(&[max.as_slice()]);
        root.insert(Child::M { node }).unwrap();
    }

    // first child whose max-key covers the search key.
    for (key, want) in [
        (&b"aaa"[..], &b"ccc"[..]),
        (b"ccc", b"ccc"),
        (b"ddd", b"fff"),
        (b"jjj", b"jjj"),
    ] {
        match root.search(key) {
            Some(child) => assert_eq!(child.as_ordering_key(), want, "{:?}", key),
            None => panic!("missing child for {:?}", key),
        }
    }
    // beyond the maximum, strict search finds nothing.
    assert!(root.search(b"zzz").is_none());

    // inserts beyond the maximum route to the last child.
    assert_eq!(root.off_for_insert(b"zzz").unwrap(), 2);
    assert_eq!(root.off_for_insert(b"aaa").unwrap(), 0);
    assert_eq!(root.off_for_insert(b"ddd").unwrap(), 1);

    match IntermediateNode::new(2).off_for_insert(b"aaa") {
        Err(Error::UnreachableState(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_split() {
    let mut node = IntermediateNode::new(1);
    for i in 0..MAX_CHILDREN {
        let key = format!("key{:03}", i).into_bytes();
        node.insert(Child::Z { leaf: new_leaf(&key) }).unwrap();
    }

    let sibling = node.split();

    assert_eq!(node.len(), MAX_CHILDREN / 2);
    assert_eq!(sibling.len(), MAX_CHILDREN - (MAX_CHILDREN / 2));
    assert_eq!(node.max_key, b"key084".to_vec());
    assert_eq!(sibling.max_key, b"key169".to_vec());
    assert_eq!(sibling.depth, node.depth);
    assert!(!node.is_full() && !sibling.is_full());

    // both halves stay internally ordered.
    node.validate(true, 0).unwrap();
    sibling.validate(true, 0).unwrap();
}

#[test]
fn test_widen() {
    let mut node = leaf_run(&[b"bbb"]);
    node.widen(b"aaa");
    assert_eq!(node.max_key, b"bbb".to_vec());
    node.widen(b"ccc");
    assert_eq!(node.max_key, b"ccc".to_vec());
}

#[test]
fn test_validate() {
    let node = leaf_run(&[b"aaa", b"bbb"]);
    node.validate(true, 0).unwrap();

    let mut node = leaf_run(&[b"aaa", b"bbb"]);
    node.max_key = b"zzz".to_vec();
    assert!(node.validate(true, 0).is_err());

    // depth-2 node holding a leaf child is an invariant violation.
    let mut node = IntermediateNode::new(2);
    node.children.push(Child::Z { leaf: new_leaf(b"aaa") });
    node.max_key = b"aaa".to_vec();
    assert!(node.validate(true, 0).is_err());
}
