use std::{fs, sync::Arc};

use super::*;
use crate::{
    to_dlog_location, to_history_location, Config, HistoryIndexNode, Index,
    HISTORY_CAP,
};

fn test_locations(name: &str) -> (std::ffi::OsString, std::ffi::OsString) {
    let dir = std::env::temp_dir().join("hbt-searcher-test");
    fs::create_dir_all(&dir).unwrap();
    (
        to_history_location(dir.as_os_str(), name),
        to_dlog_location(dir.as_os_str(), name),
    )
}

fn new_index(name: &str) -> Index<Vec<u8>, Vec<u8>> {
    let (hloc, dloc) = test_locations(name);
    let hio = IoHandler::create(&hloc).unwrap();
    let dio = IoHandler::create(&dloc).unwrap();
    Index::new(name, hio, dio).unwrap()
}

// enough overwrites of one key to spill several batches to disk.
#[test]
fn test_as_of_spilled() {
    let index = new_index("as-of-spilled");
    let key = b"key".to_vec();

    let count = 100;
    for i in 0..count {
        // long values take the data-log reference path.
        let value = format!("value-{:032}", i).into_bytes();
        index.put(key.clone(), value).unwrap();
    }

    let stats = index.to_stats().unwrap();
    assert!(stats.n_spills >= 5, "spills {}", stats.n_spills);

    for i in 0..count {
        let expect = format!("value-{:032}", i).into_bytes();
        assert_eq!(index.as_of(&key, i as u128).unwrap(), Some(expect), "tx {}", i);
    }
    assert_eq!(
        index.as_of(&key, 1000).unwrap(),
        Some(format!("value-{:032}", count - 1).into_bytes())
    );
}

#[test]
fn test_as_of_spilled_inline() {
    let index = new_index("as-of-spilled-inline");
    let key = b"key".to_vec();

    let count = 60;
    for i in 0..count {
        // short values are carried inline in the history index.
        let value = format!("v{}", i).into_bytes();
        index.put(key.clone(), value).unwrap();
    }

    assert!(index.to_stats().unwrap().n_spills >= 3);

    for i in 0..count {
        let expect = format!("v{}", i).into_bytes();
        assert_eq!(index.as_of(&key, i as u128).unwrap(), Some(expect), "tx {}", i);
    }
}

#[test]
fn test_as_of_spilled_tombstones() {
    let index = new_index("as-of-spilled-tombstones");
    let key = b"key".to_vec();

    let count = 60;
    for i in 0..count {
        if i % 3 == 2 {
            index.delete(&key).unwrap();
        } else {
            index.put(key.clone(), format!("value{}", i).into_bytes()).unwrap();
        }
    }

    assert!(index.to_stats().unwrap().n_spills >= 3);

    for i in 0..count {
        let expect = if i % 3 == 2 {
            None
        } else {
            Some(format!("value{}", i).into_bytes())
        };
        assert_eq!(index.as_of(&key, i as u128).unwrap(), expect, "tx {}", i);
    }
}

// two keys alternating, each key's history has gaps in the global
// transaction sequence; probes inside the gaps must land on the
// previous version, across batch boundaries too.
#[test]
fn test_as_of_tx_gaps() {
    let index = new_index("as-of-tx-gaps");
    let (ka, kb) = (b"aaa".to_vec(), b"bbb".to_vec());

    let rounds = 40;
    for i in 0..rounds {
        index.put(ka.clone(), format!("a{}", i).into_bytes()).unwrap(); // tx 2i
        index.put(kb.clone(), format!("b{}", i).into_bytes()).unwrap(); // tx 2i+1
    }

    assert!(index.to_stats().unwrap().n_spills >= 2);

    for i in 0..rounds {
        let tx = (2 * i) as u128;
        // at key a's write, and inside the gap right after it.
        assert_eq!(
            index.as_of(&ka, tx).unwrap(),
            Some(format!("a{}", i).into_bytes())
        );
        assert_eq!(
            index.as_of(&kb, tx).unwrap(),
            if i == 0 {
                None
            } else {
                Some(format!("b{}", i - 1).into_bytes())
            },
            "tx {}",
            tx
        );
    }
}

// drive the searcher by hand over a tree assembled from raw records.
#[test]
fn test_searcher_manual() {
    let (hloc, dloc) = test_locations("searcher-manual");
    let mut hio = IoHandler::create(&hloc).unwrap();
    hio.set_page_size(HistoryIndexNode::SIZE);
    let hio = hio;
    let dio = Arc::new(IoHandler::create(&dloc).unwrap());
    let dlog = DataLogger::new(Arc::clone(&dio)).unwrap();

    // prime page, offset ZERO stays unaddressable.
    hio.write(None, &crate::record::marker_block(HistoryIndexNode::SIZE)).unwrap();

    let write_node = |node: &HistoryIndexNode| -> u64 {
        let mut buf = vec![];
        node.encode(&mut buf);
        hio.write(None, &buf).unwrap()
    };

    // batch 1 covers txs 10, 12, 14; batch 2 covers txs 20, 22.
    let key_off = dlog.append_key(b"key").unwrap();
    let v14 = dlog.append_value(key_off, b"a-value-longer-than-16-bytes").unwrap();

    let b1 = HistoryIndexNode::from_batch(
        0,
        vec![
            HistoryIndexChild::new_inline(10, b"v10").unwrap(),
            HistoryIndexChild::new_tombstone(12),
            HistoryIndexChild::new_reference(14, v14, 28),
        ],
    )
    .unwrap();
    let b1_off = write_node(&b1);

    let b2 = HistoryIndexNode::from_batch(
        0,
        vec![
            HistoryIndexChild::new_inline(20, b"v20").unwrap(),
            HistoryIndexChild::new_inline(22, b"v22").unwrap(),
        ],
    )
    .unwrap();
    let b2_off = write_node(&b2);

    let root = HistoryIndexNode::from_batch(
        1,
        vec![
            HistoryIndexChild::new_subtree(14, b1_off),
            HistoryIndexChild::new_subtree(22, b2_off),
        ],
    )
    .unwrap();
    let root_off = write_node(&root);

    let searcher = HistorySearcher::new(&hio, &dlog);
    let lookup = |tx: u128| {
        searcher.search(HistoryReadRequest { offset: root_off, tx }).unwrap()
    };

    // before the oldest record.
    assert_eq!(lookup(9), None);
    // exact hits.
    assert_eq!(lookup(10), Some(b"v10".to_vec()));
    assert_eq!(lookup(12), None); // tombstone
    assert_eq!(lookup(14), Some(b"a-value-longer-than-16-bytes".to_vec()));
    assert_eq!(lookup(20), Some(b"v20".to_vec()));
    assert_eq!(lookup(22), Some(b"v22".to_vec()));
    // probes inside gaps land on the previous version.
    assert_eq!(lookup(11), Some(b"v10".to_vec()));
    assert_eq!(lookup(13), None);
    assert_eq!(lookup(15), Some(b"a-value-longer-than-16-bytes".to_vec()));
    // between the two batches, the left subtree's newest record.
    assert_eq!(lookup(19), Some(b"a-value-longer-than-16-bytes".to_vec()));
    assert_eq!(lookup(21), Some(b"v20".to_vec()));
    // newer than every spilled record.
    assert_eq!(lookup(99), Some(b"v22".to_vec()));
}

// the buffer drains into the history index, queries keep answering
// across the spill boundary.
#[test]
fn test_spill_boundary() {
    let mut config = Config::new("spill-boundary");
    config.set_history_cap(4);
    let (hloc, dloc) = test_locations("spill-boundary");
    let hio = IoHandler::create(&hloc).unwrap();
    let dio = IoHandler::create(&dloc).unwrap();
    let index: Index<Vec<u8>, Vec<u8>> = Index::with_config(config, hio, dio).unwrap();

    let key = b"key".to_vec();
    for i in 0..6 {
        index.put(key.clone(), format!("value{}", i).into_bytes()).unwrap();
    }
    // cap 4: versions 0..=3 spilled, version 4 buffered, version 5 current.
    assert_eq!(index.to_stats().unwrap().n_spills, 1);

    for i in 0..6 {
        let expect = format!("value{}", i).into_bytes();
        assert_eq!(index.as_of(&key, i as u128).unwrap(), Some(expect), "tx {}", i);
    }

    assert_eq!(index.get(&key).unwrap(), Some(b"value5".to_vec()));
    assert_eq!(index.to_tx().unwrap(), 6);
    assert_eq!(index.len().unwrap(), 1);
    assert_eq!(
        index.as_of(&key, HISTORY_CAP as u128 + 100).unwrap(),
        Some(b"value5".to_vec())
    );
}
