//! Non-unique key → rowIDs index, built as a unique [`BTree`] over composite
//! `(key, rowID)` pairs with a two-level comparator: the user key first,
//! rowID numerically as the tiebreak. Composite keys are unique by
//! construction, so `put` always succeeds.

use crate::btree::{BTree, OrderedKey};
use crate::cmp::{compare, Comparison};
use crate::value::Value;

#[derive(Clone)]
struct CompositeKey {
    key: Value,
    row_id: i64,
}

impl OrderedKey for CompositeKey {
    fn key_cmp(&self, other: &Self) -> Comparison {
        match compare(&self.key, &other.key) {
            Comparison::Equal => match self.row_id.cmp(&other.row_id) {
                std::cmp::Ordering::Less => Comparison::Less,
                std::cmp::Ordering::Equal => Comparison::Equal,
                std::cmp::Ordering::Greater => Comparison::Greater,
            },
            other => other,
        }
    }
}

/// A non-unique secondary index: one composite entry per (non-null) column
/// value / rowID pair.
#[derive(Default)]
pub struct MultiBTree {
    inner: BTree<CompositeKey>,
}

impl MultiBTree {
    pub fn new() -> Self {
        MultiBTree { inner: BTree::new() }
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Always succeeds: `(key, row_id)` pairs are unique by construction.
    pub fn put(&mut self, key: Value, row_id: i64) {
        let inserted = self.inner.put(CompositeKey { key, row_id }, row_id);
        debug_assert!(inserted, "composite (key, row_id) pairs must be unique");
    }

    pub fn delete(&mut self, key: &Value, row_id: i64) -> bool {
        self.inner.delete(&CompositeKey {
            key: key.clone(),
            row_id,
        })
    }

    /// Returns every rowID paired with `key`, in ascending rowID order.
    pub fn get_all(&self, key: &Value) -> Vec<i64> {
        let mut out = Vec::new();
        let probe = move |stored: &CompositeKey| compare(&stored.key, key);
        self.inner.scan_matching(&probe, &mut out);
        out.into_iter().map(|(_, row_id)| row_id).collect()
    }
}
