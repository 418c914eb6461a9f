//! Key-wise folding of result records.

use super::record::{FieldValue, ResultRecord};

/// Folds result records of repeated runs into one series record.
///
/// Shared keys become lists and later values are appended; nothing is
/// ever replaced. Keys present only in the right-hand record are inserted
/// as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMerger;

impl ResultMerger {
    /// Merges `b` into a copy of `a`.
    #[must_use]
    pub fn merge(a: &ResultRecord, b: &ResultRecord) -> ResultRecord {
        let mut merged = a.clone();
        Self::merge_into(&mut merged, b);
        merged
    }

    /// Merges `b` into `a` in place.
    pub fn merge_into(a: &mut ResultRecord, b: &ResultRecord) {
        for (key, incoming) in b.iter() {
            match a.get_mut(key) {
                Some(existing) => fold_value(existing, incoming.clone()),
                None => {
                    // Absent keys cannot conflict.
                    let _ = a.insert(key, incoming.clone());
                }
            }
        }
    }

    /// Left-folds every record, in order.
    #[must_use]
    pub fn merge_all<'a, I>(records: I) -> ResultRecord
    where
        I: IntoIterator<Item = &'a ResultRecord>,
    {
        let mut merged = ResultRecord::new();
        for record in records {
            Self::merge_into(&mut merged, record);
        }
        merged
    }
}

/// Appends `incoming` to `existing` when `existing` is already a series of
/// values shaped like `incoming`; otherwise starts a new two-element series.
fn fold_value(existing: &mut FieldValue, incoming: FieldValue) {
    match existing {
        FieldValue::List(items) if is_series_of(items, &incoming) => items.push(incoming),
        _ => {
            let first = std::mem::replace(existing, FieldValue::List(Vec::new()));
            *existing = FieldValue::List(vec![first, incoming]);
        }
    }
}

fn is_series_of(items: &[FieldValue], incoming: &FieldValue) -> bool {
    if incoming.is_list() {
        !items.is_empty() && items.iter().all(FieldValue::is_list)
    } else {
        true
    }
}
