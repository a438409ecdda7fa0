use super::*;

fn rec(key: i32, value: i32, seq: u64) -> Record {
    let mut r = Record::new(key, value);
    r.seq = seq;
    r
}

fn tomb(key: i32, seq: u64) -> Record {
    let mut r = Record::key_only(key);
    r.seq = seq;
    r.mark_tombstone();
    r
}

#[test]
fn put_get() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 10, 1));
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(&FieldValue::Int(1)).unwrap().value, FieldValue::Int(10));
    assert!(m.get(&FieldValue::Int(2)).is_none());
}

#[test]
fn newer_seq_replaces_older() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 10, 1));
    m.put(rec(1, 20, 2));
    assert_eq!(m.get(&FieldValue::Int(1)).unwrap().value, FieldValue::Int(20));
    assert_eq!(m.len(), 1);
}

#[test]
fn older_seq_never_overwrites_newer() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 20, 5));
    m.put(rec(1, 10, 3));
    assert_eq!(m.get(&FieldValue::Int(1)).unwrap().value, FieldValue::Int(20));
}

#[test]
fn tombstone_is_stored_like_any_record() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 10, 1));
    m.put(tomb(1, 2));
    let entry = m.get(&FieldValue::Int(1)).unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(m.len(), 1);
}

#[test]
fn threshold_signalling() {
    let mut m = Memtable::new(3);
    assert!(!m.is_full());
    m.put(rec(1, 10, 1));
    m.put(rec(2, 20, 2));
    assert!(!m.is_full());
    m.put(rec(3, 30, 3));
    assert!(m.is_full());

    // Overwrites do not grow the buffer.
    m.put(rec(3, 31, 4));
    assert_eq!(m.len(), 3);
}

#[test]
fn drain_is_sorted_and_resets() {
    let mut m = Memtable::new(100);
    for (i, k) in [5, 1, 4, 2, 3].iter().enumerate() {
        m.put(rec(*k, k * 10, i as u64 + 1));
    }
    let drained = m.drain_sorted();
    let keys: Vec<_> = drained.iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            FieldValue::Int(1),
            FieldValue::Int(2),
            FieldValue::Int(3),
            FieldValue::Int(4),
            FieldValue::Int(5)
        ]
    );
    assert!(m.is_empty());
    assert!(!m.is_full());
}

#[test]
fn scan_is_inclusive_on_both_ends() {
    let mut m = Memtable::new(100);
    for k in 1..=9 {
        m.put(rec(k, k * 10, k as u64));
    }
    let hits = m.scan(&FieldValue::Int(3), &FieldValue::Int(6));
    let keys: Vec<_> = hits.iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            FieldValue::Int(3),
            FieldValue::Int(4),
            FieldValue::Int(5),
            FieldValue::Int(6)
        ]
    );
}

#[test]
fn scan_with_inverted_bounds_is_empty() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 10, 1));
    assert!(m.scan(&FieldValue::Int(5), &FieldValue::Int(1)).is_empty());
}

#[test]
fn scan_includes_tombstones() {
    let mut m = Memtable::new(100);
    m.put(rec(1, 10, 1));
    m.put(tomb(2, 2));
    let hits = m.scan(&FieldValue::Int(1), &FieldValue::Int(2));
    assert_eq!(hits.len(), 2);
    assert!(hits[1].is_tombstone());
}
