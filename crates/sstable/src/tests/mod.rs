
use record::Record;

/// Builds a sorted record slice `(key, value, seq)` for table construction.
pub(crate) fn records(entries: &[(i32, i32, u64)]) -> Vec<Record> {
    entries
        .iter()
        .map(|&(key, value, seq)| {
            let mut rec = Record::new(key, value);
            rec.seq = seq;
            rec
        })
        .collect()
}

/// A tombstone record for `key`.
pub(crate) fn tombstone(key: i32, seq: u64) -> Record {
    let mut rec = Record::key_only(key);
    rec.seq = seq;
    rec.mark_tombstone();
    rec
}

/// Records with ~100-byte string values; a few hundred of these span
/// multiple leaf pages at the default page size.
pub(crate) fn wide_records(count: i32) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut rec = Record::new(i, format!("value-{i:04}-{}", "x".repeat(90)));
            rec.seq = i as u64 + 1;
            rec
        })
        .collect()
}
