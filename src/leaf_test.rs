use super::*;

fn new_leaf(cap: usize) -> LeafNode {
    LeafNode::new(
        b"key".to_vec(),
        b"value0".to_vec(),
        0,
        LEAF_PERSIST_HISTORY,
        10,
        20,
        cap,
    )
}

#[test]
fn test_new_leaf() {
    let leaf = new_leaf(16);
    assert_eq!(leaf.as_key(), b"key");
    assert_eq!(leaf.to_value(), Some(b"value0".to_vec()));
    assert_eq!(leaf.to_tx(), 0);
    assert_eq!(leaf.to_flags(), LEAF_PERSIST_HISTORY);
    assert!(!leaf.is_deleted());
    assert_eq!(leaf.to_key_offset(), 10);
    assert_eq!(leaf.to_current_offset(), 20);
    assert_eq!(leaf.to_history_offset(), 0);
    assert!(leaf.as_history().is_empty());
}

#[test]
fn test_flags_xor() {
    // initial flags toggle bits off DEFAULT_FLAGS.
    let leaf = LeafNode::new(b"k".to_vec(), b"v".to_vec(), 0, 0, 0, 0, 16);
    assert_eq!(leaf.to_flags(), DEFAULT_FLAGS);

    let leaf = new_leaf(16);
    assert_eq!(leaf.to_flags(), DEFAULT_FLAGS ^ LEAF_PERSIST_HISTORY);
}

#[test]
fn test_add_record_saves_history() {
    let mut leaf = new_leaf(16);
    for i in 1..4 {
        let value = format!("value{}", i).into_bytes();
        let wreq = leaf.add_record(Some(value.clone()), i as u128, false);
        assert_eq!(wreq, leaf.to_write_req(Some(value)));
    }

    assert_eq!(leaf.to_value(), Some(b"value3".to_vec()));
    assert_eq!(leaf.to_tx(), 3);

    let history = leaf.as_history();
    assert_eq!(history.len(), 3);
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record.tx, i as u128);
        assert_eq!(record.value, Some(format!("value{}", i).into_bytes()));
        assert!(!record.deleted);
    }
}

#[test]
fn test_add_record_delete() {
    let mut leaf = new_leaf(16);
    let wreq = leaf.add_record(None, 1, true);

    assert!(wreq.delete);
    assert_eq!(wreq.value, Vec::<u8>::new());
    assert_eq!(wreq.tx, 1);

    assert!(leaf.is_deleted());
    assert_eq!(leaf.to_value(), None);
    assert_eq!(leaf.to_current_offset(), 0);

    // resurrecting the key clears the delete flag.
    leaf.add_record(Some(b"value2".to_vec()), 2, false);
    assert!(!leaf.is_deleted());
    assert_eq!(leaf.to_value(), Some(b"value2".to_vec()));

    let history = leaf.as_history();
    assert_eq!(history.len(), 2);
    assert!(!history[0].deleted);
    assert!(history[1].deleted);
    assert_eq!(history[1].value, None);
}

#[test]
fn test_as_of_buffered() {
    let mut leaf = new_leaf(16);
    leaf.add_record(Some(b"value1".to_vec()), 1, false);
    leaf.add_record(None, 2, true);
    leaf.add_record(Some(b"value3".to_vec()), 3, false);

    let native = |value: Option<&[u8]>| AsOf::Native {
        value: value.map(|v| v.to_vec()),
    };

    // at or after the latest write, the current value.
    assert_eq!(leaf.as_of(3), native(Some(b"value3")));
    assert_eq!(leaf.as_of(99), native(Some(b"value3")));
    // buffered versions.
    assert_eq!(leaf.as_of(0), native(Some(b"value0")));
    assert_eq!(leaf.as_of(1), native(Some(b"value1")));
    assert_eq!(leaf.as_of(2), native(None));
}

#[test]
fn test_as_of_before_first_write() {
    let leaf = LeafNode::new(b"k".to_vec(), b"v".to_vec(), 5, 0, 0, 0, 16);
    assert_eq!(leaf.as_of(4), AsOf::Native { value: None });
    assert_eq!(leaf.as_of(5), AsOf::Native { value: Some(b"v".to_vec()) });
}

#[test]
fn test_as_of_aged_out() {
    let mut leaf = new_leaf(4);
    for i in 1..=4 {
        leaf.add_record(Some(format!("value{}", i).into_bytes()), i as u128, false);
    }

    let batch = leaf.take_spill_batch().unwrap();
    assert_eq!(batch.len(), 4);
    leaf.set_history_offset(5612);

    // everything older than the buffer resolves through the history index.
    let req = HistoryReadRequest { offset: 5612, tx: 2 };
    assert_eq!(leaf.as_of(2), AsOf::Reference { req });
    // the current value is still served from memory.
    assert_eq!(
        leaf.as_of(4),
        AsOf::Native { value: Some(b"value4".to_vec()) }
    );
}

#[test]
fn test_spill_batch() {
    let mut leaf = new_leaf(4);
    assert_eq!(leaf.take_spill_batch(), None);

    for i in 1..4 {
        leaf.add_record(Some(b"v".to_vec()), i as u128, false);
        assert_eq!(leaf.take_spill_batch(), None);
    }
    leaf.add_record(Some(b"v".to_vec()), 4, false);

    let batch = leaf.take_spill_batch().unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0].tx, 0);
    assert_eq!(batch[3].tx, 3);
    assert_eq!(leaf.to_history_write_index(), 4);
    assert!(leaf.as_history().is_empty());

    assert_eq!(leaf.take_spill_batch(), None);
}

#[test]
fn test_spill_disabled() {
    let mut leaf = LeafNode::new(b"k".to_vec(), b"v".to_vec(), 0, 0, 0, 0, 4);
    for i in 1..=8 {
        leaf.add_record(Some(b"v".to_vec()), i as u128, false);
    }
    // PERSIST_HISTORY is off, the buffer is never handed out.
    assert_eq!(leaf.take_spill_batch(), None);
    assert_eq!(leaf.as_history().len(), 8);
}
