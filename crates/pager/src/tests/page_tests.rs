use crate::page::{InternalNode, LeafNode, Page, PageKind, SstMeta, DEFAULT_PAGE_SIZE};
use crate::PagerError;
use bloom::BloomFilter;
use record::Record;

fn leaf_bloom() -> BloomFilter {
    BloomFilter::new(1024, 100).unwrap()
}

// -------------------- Round trips --------------------

#[test]
fn internal_node_round_trip() {
    let node = InternalNode {
        keys: vec![Record::new(10, 0), Record::new(20, 0)],
        children: vec![4096, 8192, 12288],
    };
    let page = Page::Internal(node);
    let bytes = page.serialize(DEFAULT_PAGE_SIZE).unwrap();
    assert_eq!(bytes.len(), DEFAULT_PAGE_SIZE);

    let parsed = Page::deserialize(&bytes).unwrap();
    let parsed = parsed.internal().unwrap();
    assert_eq!(parsed.children, vec![4096, 8192, 12288]);
    assert_eq!(parsed.keys.len(), 2);
    assert_eq!(parsed.keys[0], Record::new(10, 0));
    assert_eq!(parsed.keys[1], Record::new(20, 0));
}

#[test]
fn leaf_node_round_trip_preserves_seq_and_tombstone() {
    let mut leaf = LeafNode::new(Some(leaf_bloom()));
    let mut a = Record::new(1, 100);
    a.seq = 7;
    let mut b = Record::new(2, 200);
    b.seq = 8;
    b.mark_tombstone();
    leaf.push(a);
    leaf.push(b);
    leaf.next_leaf = 8192;

    let bytes = Page::Leaf(leaf).serialize(DEFAULT_PAGE_SIZE).unwrap();
    let parsed = Page::deserialize(&bytes).unwrap();
    let parsed = parsed.leaf().unwrap();

    assert_eq!(parsed.entries.len(), 2);
    assert_eq!(parsed.entries[0].seq, 7);
    assert!(!parsed.entries[0].tombstone);
    assert_eq!(parsed.entries[1].seq, 8);
    assert!(parsed.entries[1].tombstone);
    assert_eq!(parsed.next_leaf, 8192);

    // The bloom filter must survive and still reflect the stored keys.
    let bf = parsed.bloom.as_ref().unwrap();
    assert!(bf.possibly_contains(&Record::new(1, 0)));
    assert!(bf.possibly_contains(&Record::new(2, 0)));
}

#[test]
fn leaf_without_bloom_round_trips() {
    let mut leaf = LeafNode::new(None);
    leaf.push(Record::new(5, 50));
    let bytes = Page::Leaf(leaf).serialize(DEFAULT_PAGE_SIZE).unwrap();
    let parsed = Page::deserialize(&bytes).unwrap();
    assert!(parsed.leaf().unwrap().bloom.is_none());
}

#[test]
fn metadata_round_trip() {
    let meta = SstMeta {
        root_offset: 40960,
        leaf_begin: 4096,
        leaf_end: 36864,
        file_name: "L1_SSTable_3.sst".to_string(),
        bloom: None,
    };
    let bytes = Page::Metadata(meta).serialize(DEFAULT_PAGE_SIZE).unwrap();
    let parsed = Page::deserialize(&bytes).unwrap();
    let parsed = parsed.metadata().unwrap();
    assert_eq!(parsed.root_offset, 40960);
    assert_eq!(parsed.leaf_begin, 4096);
    assert_eq!(parsed.leaf_end, 36864);
    assert_eq!(parsed.file_name, "L1_SSTable_3.sst");
}

// -------------------- Kind discipline --------------------

#[test]
fn wrong_kind_accessors_fail() {
    let leaf = Page::Leaf(LeafNode::new(None));
    assert_eq!(leaf.kind(), PageKind::Leaf);
    assert!(matches!(
        leaf.internal().unwrap_err(),
        PagerError::InvalidPageKind { .. }
    ));
    assert!(matches!(
        leaf.metadata().unwrap_err(),
        PagerError::InvalidPageKind { .. }
    ));

    let meta = Page::Metadata(SstMeta::default());
    assert!(matches!(
        meta.leaf().unwrap_err(),
        PagerError::InvalidPageKind { .. }
    ));
}

#[test]
fn unknown_kind_byte_is_corrupt() {
    let mut bytes = vec![0u8; DEFAULT_PAGE_SIZE];
    bytes[0] = 9;
    assert!(matches!(
        Page::deserialize(&bytes).unwrap_err(),
        PagerError::Corrupt(_)
    ));
}

#[test]
fn inconsistent_internal_counts_are_corrupt() {
    // An internal node must carry exactly keys + 1 children.
    let node = InternalNode {
        keys: vec![Record::new(10, 0)],
        children: vec![4096],
    };
    let bytes = Page::Internal(node).serialize(DEFAULT_PAGE_SIZE).unwrap();
    assert!(matches!(
        Page::deserialize(&bytes).unwrap_err(),
        PagerError::Corrupt(_)
    ));
}

// -------------------- Size budget --------------------

#[test]
fn base_size_matches_empty_serialization() {
    // base_size is the exact overhead: an empty node serializes to exactly
    // that many bytes before padding.
    let leaf = Page::Leaf(LeafNode::new(Some(leaf_bloom())));
    let mut unpadded = leaf.serialize(DEFAULT_PAGE_SIZE).unwrap();
    while unpadded.last() == Some(&0) {
        unpadded.pop();
    }
    // Trailing zeros of real content may be stripped too, so compare ≤.
    assert!(unpadded.len() <= leaf.base_size());

    let internal = Page::Internal(InternalNode {
        keys: vec![],
        children: vec![],
    });
    assert_eq!(internal.base_size(), 5);
}

#[test]
fn running_budget_predicts_serialized_size() {
    let mut leaf = LeafNode::new(Some(leaf_bloom()));
    let mut expected = Page::Leaf(leaf.clone()).base_size();
    for i in 0..20 {
        let mut rec = Record::new(i, i * 10);
        rec.seq = i as u64;
        expected += LeafNode::entry_size(&rec);
        leaf.push(rec);
    }
    let page = Page::Leaf(leaf);
    let bytes = page.serialize(DEFAULT_PAGE_SIZE).unwrap();
    let content_len = {
        let mut b = bytes.clone();
        while b.len() > expected && b.last() == Some(&0) {
            b.pop();
        }
        b.len()
    };
    assert_eq!(content_len, expected);
}

#[test]
fn oversized_page_fails_before_write() {
    let mut leaf = LeafNode::new(None);
    let big_value = "x".repeat(DEFAULT_PAGE_SIZE);
    leaf.push(Record::new("key", big_value.as_str()));
    let err = Page::Leaf(leaf).serialize(DEFAULT_PAGE_SIZE).unwrap_err();
    assert!(matches!(err, PagerError::PageOverflow { .. }));
}

#[test]
fn serialization_always_pads_to_page_size() {
    let pages = vec![
        Page::Internal(InternalNode {
            keys: vec![],
            children: vec![4096],
        }),
        Page::Leaf(LeafNode::new(None)),
        Page::Metadata(SstMeta::default()),
    ];
    for page in pages {
        assert_eq!(page.serialize(DEFAULT_PAGE_SIZE).unwrap().len(), DEFAULT_PAGE_SIZE);
    }
}
