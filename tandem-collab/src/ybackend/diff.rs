//! Before/after diffs used to turn an applied remote update into events.

use std::collections::BTreeMap;

/// One contiguous edit of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Splice<T> {
    pub index: usize,
    pub removed: Vec<T>,
    pub inserted: Vec<T>,
}

/// Smallest single splice turning `before` into `after` (common prefix and
/// suffix trimmed). `None` when nothing changed.
pub(crate) fn splice<T: PartialEq + Clone>(before: &[T], after: &[T]) -> Option<Splice<T>> {
    let prefix = before
        .iter()
        .zip(after)
        .take_while(|(a, b)| a == b)
        .count();
    let room = before.len().min(after.len()) - prefix;
    let suffix = before
        .iter()
        .rev()
        .zip(after.iter().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = before[prefix..before.len() - suffix].to_vec();
    let inserted = after[prefix..after.len() - suffix].to_vec();
    if removed.is_empty() && inserted.is_empty() {
        return None;
    }
    Some(Splice {
        index: prefix,
        removed,
        inserted,
    })
}

/// Per-key changes between two map states, in key order.
pub(crate) fn map_changes<V: PartialEq + Clone>(
    before: &BTreeMap<String, V>,
    after: &BTreeMap<String, V>,
) -> Vec<(String, Option<V>, Option<V>)> {
    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            (old != new).then(|| (key.clone(), old.cloned(), new.cloned()))
        })
        .collect()
}
