//! An in-memory B-tree ordered by an [`OrderedKey`]'s comparator, targeting
//! an order of 64 (at most 63 entries per node before a split). Used both
//! directly (unique indexes, including the implicit PK index) and wrapped by
//! [`crate::multibtree`] for non-unique secondary indexes.
//!
//! Deletion on an internal node swaps in the in-order predecessor and then
//! removes it from the leaf it lived in; underflow is never rebalanced. A
//! transiently unbalanced tree is acceptable — only `get`/`delete`
//! correctness and root collapse on empty/single-child are guaranteed.

use crate::cmp::Comparison;

/// Maximum number of entries a node may hold before it must split.
const MAX_ENTRIES: usize = 63;

/// A key usable in a [`BTree`]. Implementors provide a total-ish order via
/// `key_cmp`; returning `Comparison::Incomparable` for a pair that is
/// actually inserted as two distinct keys is a caller bug, not a recoverable
/// error — the tree panics rather than silently corrupting its order.
pub trait OrderedKey: Clone {
    fn key_cmp(&self, other: &Self) -> Comparison;
}

struct Node<K> {
    keys: Vec<K>,
    values: Vec<i64>,
    children: Vec<Box<Node<K>>>,
}

impl<K: OrderedKey> Node<K> {
    fn leaf() -> Self {
        Node {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Binary search for `key` among `keys`. `Ok(idx)` on an exact match,
/// `Err(idx)` with the insertion point otherwise. Ties resolve to a single
/// well-defined index, matching Rust's own `slice::binary_search` contract.
fn locate<K: OrderedKey>(keys: &[K], key: &K) -> Result<usize, usize> {
    let mut lo = 0usize;
    let mut hi = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match keys[mid].key_cmp(key) {
            Comparison::Equal => return Ok(mid),
            Comparison::Less => lo = mid + 1,
            Comparison::Greater => hi = mid,
            Comparison::Incomparable => {
                panic!("attempted to order an incomparable key in a B-tree")
            }
        }
    }
    Err(lo)
}

/// Result of inserting into a subtree: either the key was already present
/// (no change), or the insert completed, possibly producing a node that
/// must be promoted (median key/value, new right sibling) to the caller.
enum Insert<K> {
    Duplicate,
    Done(Option<(K, i64, Box<Node<K>>)>),
}

fn split_leaf<K: OrderedKey>(node: &mut Node<K>) -> (K, i64, Box<Node<K>>) {
    let mid = node.keys.len() / 2;
    let right_keys = node.keys.split_off(mid + 1);
    let right_values = node.values.split_off(mid + 1);
    let median_key = node.keys.pop().expect("split node must be non-empty");
    let median_value = node.values.pop().expect("split node must be non-empty");
    let right = Node {
        keys: right_keys,
        values: right_values,
        children: Vec::new(),
    };
    (median_key, median_value, Box::new(right))
}

fn split_internal<K: OrderedKey>(node: &mut Node<K>) -> (K, i64, Box<Node<K>>) {
    let mid = node.keys.len() / 2;
    let right_keys = node.keys.split_off(mid + 1);
    let right_values = node.values.split_off(mid + 1);
    let median_key = node.keys.pop().expect("split node must be non-empty");
    let median_value = node.values.pop().expect("split node must be non-empty");
    let right_children = node.children.split_off(mid + 1);
    let right = Node {
        keys: right_keys,
        values: right_values,
        children: right_children,
    };
    (median_key, median_value, Box::new(right))
}

fn insert_into<K: OrderedKey>(node: &mut Node<K>, key: K, value: i64) -> Insert<K> {
    match locate(&node.keys, &key) {
        Ok(_) => Insert::Duplicate,
        Err(idx) => {
            if node.is_leaf() {
                node.keys.insert(idx, key);
                node.values.insert(idx, value);
                if node.keys.len() > MAX_ENTRIES {
                    Insert::Done(Some(split_leaf(node)))
                } else {
                    Insert::Done(None)
                }
            } else {
                match insert_into(&mut node.children[idx], key, value) {
                    Insert::Duplicate => Insert::Duplicate,
                    Insert::Done(None) => Insert::Done(None),
                    Insert::Done(Some((mk, mv, right))) => {
                        node.keys.insert(idx, mk);
                        node.values.insert(idx, mv);
                        node.children.insert(idx + 1, right);
                        if node.keys.len() > MAX_ENTRIES {
                            Insert::Done(Some(split_internal(node)))
                        } else {
                            Insert::Done(None)
                        }
                    }
                }
            }
        }
    }
}

/// Removes and returns the largest (key, value) in `node`'s subtree — the
/// in-order predecessor used when deleting from an internal node.
fn remove_max<K: OrderedKey>(node: &mut Node<K>) -> (K, i64) {
    if node.is_leaf() {
        let k = node.keys.pop().expect("predecessor leaf must be non-empty");
        let v = node.values.pop().expect("predecessor leaf must be non-empty");
        (k, v)
    } else {
        let last = node.children.last_mut().expect("internal node must have children");
        remove_max(last)
    }
}

fn delete_from<K: OrderedKey>(node: &mut Node<K>, key: &K) -> bool {
    match locate(&node.keys, key) {
        Ok(idx) => {
            if node.is_leaf() {
                node.keys.remove(idx);
                node.values.remove(idx);
            } else {
                let (pred_key, pred_value) = remove_max(&mut node.children[idx]);
                node.keys[idx] = pred_key;
                node.values[idx] = pred_value;
            }
            true
        }
        Err(idx) => {
            if node.is_leaf() {
                false
            } else {
                delete_from(&mut node.children[idx], key)
            }
        }
    }
}

/// An ordered key → rowID map, unique by key.
pub struct BTree<K> {
    root: Option<Box<Node<K>>>,
    size: usize,
}

impl<K: OrderedKey> Default for BTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: OrderedKey> BTree<K> {
    pub fn new() -> Self {
        BTree { root: None, size: 0 }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Inserts `key -> row_id` if `key` is absent. Returns `false` on
    /// duplicate, leaving the existing mapping untouched.
    pub fn put(&mut self, key: K, row_id: i64) -> bool {
        match &mut self.root {
            None => {
                let mut leaf = Node::leaf();
                leaf.keys.push(key);
                leaf.values.push(row_id);
                self.root = Some(Box::new(leaf));
                self.size += 1;
                true
            }
            Some(root) => match insert_into(root, key, row_id) {
                Insert::Duplicate => false,
                Insert::Done(None) => {
                    self.size += 1;
                    true
                }
                Insert::Done(Some((mk, mv, right))) => {
                    let old_root = self.root.take().expect("root present");
                    let new_root = Node {
                        keys: vec![mk],
                        values: vec![mv],
                        children: vec![old_root, right],
                    };
                    self.root = Some(Box::new(new_root));
                    self.size += 1;
                    true
                }
            },
        }
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            match locate(&node.keys, key) {
                Ok(idx) => return Some(node.values[idx]),
                Err(idx) => {
                    if node.is_leaf() {
                        return None;
                    }
                    cur = Some(&node.children[idx]);
                }
            }
        }
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`. Returns `false` if absent. Collapses the root when it
    /// becomes empty with a single child, and empties the tree entirely when
    /// the last entry is removed.
    pub fn delete(&mut self, key: &K) -> bool {
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        if !delete_from(root, key) {
            return false;
        }
        self.size -= 1;

        let root_ref = self.root.as_ref().expect("root present");
        if root_ref.keys.is_empty() {
            if root_ref.children.is_empty() {
                self.root = None;
            } else if root_ref.children.len() == 1 {
                let mut old_root = self.root.take().expect("root present");
                let only_child = old_root.children.pop().expect("checked len == 1");
                self.root = Some(only_child);
            }
        }
        true
    }

    /// In-order traversal pruned to the contiguous run where `probe` reports
    /// `Equal`; emission follows ascending key order. `probe` compares a
    /// stored key against an implicit target (e.g. "does this key belong to
    /// the queried prefix"), returning `Greater` once the stored key has
    /// moved past anything that could still match.
    pub(crate) fn scan_matching(&self, probe: &dyn Fn(&K) -> Comparison, out: &mut Vec<(K, i64)>) {
        if let Some(root) = &self.root {
            scan_node(root, probe, out);
        }
    }
}

fn scan_node<K: OrderedKey>(node: &Node<K>, probe: &dyn Fn(&K) -> Comparison, out: &mut Vec<(K, i64)>) -> bool {
    if node.is_leaf() {
        for i in 0..node.keys.len() {
            match probe(&node.keys[i]) {
                Comparison::Greater => return false,
                Comparison::Equal => out.push((node.keys[i].clone(), node.values[i])),
                _ => {}
            }
        }
        true
    } else {
        for i in 0..node.keys.len() {
            if !scan_node(&node.children[i], probe, out) {
                return false;
            }
            match probe(&node.keys[i]) {
                Comparison::Greater => return false,
                Comparison::Equal => out.push((node.keys[i].clone(), node.values[i])),
                _ => {}
            }
        }
        scan_node(&node.children[node.keys.len()], probe, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl OrderedKey for i64 {
        fn key_cmp(&self, other: &Self) -> Comparison {
            match self.cmp(other) {
                std::cmp::Ordering::Less => Comparison::Less,
                std::cmp::Ordering::Equal => Comparison::Equal,
                std::cmp::Ordering::Greater => Comparison::Greater,
            }
        }
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let mut t: BTree<i64> = BTree::new();
        assert!(t.put(5, 100));
        assert!(!t.put(5, 200), "duplicate insert must preserve existing mapping");
        assert_eq!(t.get(&5), Some(100));
        assert_eq!(t.size(), 1);
        assert!(t.delete(&5));
        assert!(!t.delete(&5));
        assert_eq!(t.get(&5), None);
        assert_eq!(t.size(), 0);
        assert!(t.is_empty());
    }

    #[test]
    fn large_ascending_and_descending_inserts_are_all_retrievable() {
        let mut t: BTree<i64> = BTree::new();
        for i in 0..10_000i64 {
            assert!(t.put(i, i * 2));
        }
        for i in 0..10_000i64 {
            assert_eq!(t.get(&i), Some(i * 2));
        }
        assert_eq!(t.size(), 10_000);

        let mut t2: BTree<i64> = BTree::new();
        for i in (0..10_000i64).rev() {
            assert!(t2.put(i, i * 3));
        }
        for i in 0..10_000i64 {
            assert_eq!(t2.get(&i), Some(i * 3));
        }
    }

    #[test]
    fn sequential_delete_of_half_the_keys_preserves_the_rest() {
        let mut t: BTree<i64> = BTree::new();
        for i in 0..2_000i64 {
            t.put(i, i);
        }
        for i in (0..2_000i64).step_by(2) {
            assert!(t.delete(&i));
        }
        for i in 0..2_000i64 {
            if i % 2 == 0 {
                assert_eq!(t.get(&i), None);
            } else {
                assert_eq!(t.get(&i), Some(i));
            }
        }
        assert_eq!(t.size(), 1_000);
    }

    #[test]
    fn deleting_last_entry_empties_tree_and_put_still_works() {
        let mut t: BTree<i64> = BTree::new();
        t.put(1, 1);
        assert!(t.delete(&1));
        assert!(t.is_empty());
        assert!(t.root.is_none());
        assert!(t.put(2, 2));
        assert_eq!(t.get(&2), Some(2));
    }

    #[test]
    fn delete_on_internal_node_uses_predecessor() {
        let mut t: BTree<i64> = BTree::new();
        for i in 0..200i64 {
            t.put(i, i);
        }
        // Force deletion of a key that is very likely to live on an internal node.
        assert!(t.delete(&100));
        assert_eq!(t.get(&100), None);
        for i in 0..200i64 {
            if i != 100 {
                assert_eq!(t.get(&i), Some(i));
            }
        }
    }
}
