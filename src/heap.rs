//! In-memory row store keyed by monotonically allocated rowID, with PK and
//! secondary index maintenance.

use crate::btree::BTree;
use crate::error::EngineError;
use crate::model::{IndexDef, Row, TableDef};
use crate::multibtree::MultiBTree;
use crate::value::Value;
use std::collections::HashMap;

/// The two capability sets a secondary index can expose. Kept as two
/// distinct variants (rather than one interface) because unique and
/// non-unique lookups return different shapes: `Option<rowID>` vs
/// `Vec<rowID>`.
enum SecondaryIndex {
    Unique(BTree<Value>),
    Multi(MultiBTree),
}

impl SecondaryIndex {
    fn new(unique: bool) -> Self {
        if unique {
            SecondaryIndex::Unique(BTree::new())
        } else {
            SecondaryIndex::Multi(MultiBTree::new())
        }
    }

    fn put(&mut self, value: &Value, row_id: i64) -> Result<(), ()> {
        match self {
            SecondaryIndex::Unique(t) => {
                if t.put(value.clone(), row_id) {
                    Ok(())
                } else {
                    Err(())
                }
            }
            SecondaryIndex::Multi(t) => {
                t.put(value.clone(), row_id);
                Ok(())
            }
        }
    }

    fn remove(&mut self, value: &Value, row_id: i64) {
        match self {
            SecondaryIndex::Unique(t) => {
                t.delete(value);
            }
            SecondaryIndex::Multi(t) => {
                t.delete(value, row_id);
            }
        }
    }

    fn lookup(&self, value: &Value) -> Vec<i64> {
        match self {
            SecondaryIndex::Unique(t) => t.get(value).into_iter().collect(),
            SecondaryIndex::Multi(t) => t.get_all(value),
        }
    }
}

/// Snapshot iterator returned by [`TableHeap::scan`]: the row vector is
/// materialized at call time, so later mutations cannot affect it.
pub struct RowIterator {
    rows: std::vec::IntoIter<Row>,
}

impl Iterator for RowIterator {
    type Item = Row;
    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

pub struct TableHeap {
    pub def: TableDef,
    rows: HashMap<i64, Vec<Value>>,
    next_id: i64,
    pk_index: Option<BTree<Value>>,
    secondary: HashMap<String, SecondaryIndex>,
}

impl TableHeap {
    pub fn new(def: TableDef) -> Self {
        let pk_index = def.primary_key_column().map(|_| BTree::new());
        let mut secondary = HashMap::new();
        for idx in &def.indexes {
            secondary.insert(idx.name.clone(), SecondaryIndex::new(idx.unique));
        }
        TableHeap {
            def,
            rows: HashMap::new(),
            next_id: 1,
            pk_index,
            secondary,
        }
    }

    pub fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bump_next_id(&mut self, id: i64) {
        if id + 1 > self.next_id {
            self.next_id = id + 1;
        }
    }

    fn pk_column_index(&self) -> Option<usize> {
        self.def
            .primary_key_column()
            .and_then(|c| self.def.column_index(&c.name))
    }

    /// Checked first, before any index is touched, so a NOT NULL violation
    /// on replay is exactly as fatal as a uniqueness violation — the caller
    /// must pre-validate this during live operation.
    fn check_not_null(&self, values: &[Value]) -> Result<(), EngineError> {
        for col in &self.def.columns {
            if !col.not_null {
                continue;
            }
            let Some(idx) = self.def.column_index(&col.name) else { continue };
            let value = values.get(idx).unwrap_or(&Value::Null);
            if value.is_null() {
                return Err(EngineError::NotNullViolation {
                    table: self.def.name.clone(),
                    column: col.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Inserts into the row map and maintains PK + secondary indexes. The
    /// caller must pre-validate uniqueness before calling during live
    /// operation; during replay, a violation here (including NOT NULL)
    /// indicates WAL corruption and is fatal.
    pub fn insert_with_id(&mut self, id: i64, values: Vec<Value>) -> Result<(), EngineError> {
        self.check_not_null(&values)?;

        if let Some(pk_idx) = self.pk_column_index() {
            if let Some(pk_tree) = &mut self.pk_index {
                let pk_value = values.get(pk_idx).unwrap_or(&Value::Null);
                if !pk_value.is_null() && !pk_tree.put(pk_value.clone(), id) {
                    return Err(EngineError::UniqueViolation {
                        table: self.def.name.clone(),
                        column: self.def.columns[pk_idx].name.clone(),
                        value: Some(pk_value.to_string()),
                        index: None,
                    });
                }
            }
        }

        for idx in self.def.indexes.clone() {
            let Some(col_idx) = self.def.column_index(&idx.column) else {
                continue;
            };
            let value = values.get(col_idx).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            if let Some(index) = self.secondary.get_mut(&idx.name) {
                if index.put(value, id).is_err() {
                    return Err(EngineError::UniqueViolation {
                        table: self.def.name.clone(),
                        column: idx.column.clone(),
                        value: Some(value.to_string()),
                        index: Some(idx.name.clone()),
                    });
                }
            }
        }

        self.rows.insert(id, values);
        self.bump_next_id(id);
        Ok(())
    }

    pub fn delete_rows(&mut self, ids: &[i64]) {
        for id in ids {
            let Some(values) = self.rows.remove(id) else {
                continue;
            };
            self.remove_index_entries(*id, &values);
        }
    }

    fn remove_index_entries(&mut self, id: i64, values: &[Value]) {
        if let Some(pk_idx) = self.pk_column_index() {
            if let Some(pk_tree) = &mut self.pk_index {
                let pk_value = values.get(pk_idx).unwrap_or(&Value::Null);
                if !pk_value.is_null() {
                    pk_tree.delete(pk_value);
                }
            }
        }
        for idx in self.def.indexes.clone() {
            let Some(col_idx) = self.def.column_index(&idx.column) else {
                continue;
            };
            let value = values.get(col_idx).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            if let Some(index) = self.secondary.get_mut(&idx.name) {
                index.remove(value, id);
            }
        }
    }

    /// Replaces the stored values for `id`. Index entries are removed and
    /// reinserted only for columns whose value actually changed; rowID
    /// ordering and `next_id` are never touched.
    pub fn update_row(&mut self, id: i64, values: Vec<Value>) -> Result<(), EngineError> {
        let Some(old_values) = self.rows.get(&id).cloned() else {
            return Ok(());
        };

        self.check_not_null(&values)?;

        if let Some(pk_idx) = self.pk_column_index() {
            let old = old_values.get(pk_idx).unwrap_or(&Value::Null);
            let new = values.get(pk_idx).unwrap_or(&Value::Null);
            if !values_equal(old, new) {
                if let Some(pk_tree) = &mut self.pk_index {
                    if !old.is_null() {
                        pk_tree.delete(old);
                    }
                    if !new.is_null() {
                        if !pk_tree.put(new.clone(), id) {
                            // Caller must have pre-validated; restore old entry to avoid
                            // leaving the index in a half-updated state.
                            if !old.is_null() {
                                pk_tree.put(old.clone(), id);
                            }
                            return Err(EngineError::UniqueViolation {
                                table: self.def.name.clone(),
                                column: self.def.columns[pk_idx].name.clone(),
                                value: Some(new.to_string()),
                                index: None,
                            });
                        }
                    }
                }
            }
        }

        for idx in self.def.indexes.clone() {
            let Some(col_idx) = self.def.column_index(&idx.column) else {
                continue;
            };
            let old = old_values.get(col_idx).unwrap_or(&Value::Null);
            let new = values.get(col_idx).unwrap_or(&Value::Null);
            if values_equal(old, new) {
                continue;
            }
            if let Some(index) = self.secondary.get_mut(&idx.name) {
                if !old.is_null() {
                    index.remove(old, id);
                }
                if !new.is_null() {
                    if index.put(new, id).is_err() {
                        return Err(EngineError::UniqueViolation {
                            table: self.def.name.clone(),
                            column: idx.column.clone(),
                            value: Some(new.to_string()),
                            index: Some(idx.name.clone()),
                        });
                    }
                }
            }
        }

        self.rows.insert(id, values);
        Ok(())
    }

    pub fn scan(&self) -> RowIterator {
        let rows: Vec<Row> = self
            .rows
            .iter()
            .map(|(id, values)| Row {
                id: *id,
                values: values.clone(),
            })
            .collect();
        RowIterator { rows: rows.into_iter() }
    }

    pub fn row_count(&self) -> i64 {
        self.rows.len() as i64
    }

    pub fn lookup_by_pk(&self, value: &Value) -> Option<Row> {
        let pk_tree = self.pk_index.as_ref()?;
        let id = pk_tree.get(value)?;
        self.rows.get(&id).map(|values| Row {
            id,
            values: values.clone(),
        })
    }

    pub fn lookup_by_index(&self, index_name: &str, value: &Value) -> Vec<Row> {
        let Some(index) = self.secondary.get(index_name) else {
            return Vec::new();
        };
        index
            .lookup(value)
            .into_iter()
            .filter_map(|id| {
                self.rows.get(&id).map(|values| Row {
                    id,
                    values: values.clone(),
                })
            })
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.def.column_index(name)
    }

    /// Creates a named secondary index and backfills it from the current
    /// row set.
    pub fn create_index(&mut self, def: IndexDef) -> Result<(), EngineError> {
        if self.def.index(&def.name).is_some() {
            return Err(EngineError::IndexExists {
                table: self.def.name.clone(),
                index: def.name.clone(),
            });
        }
        let Some(col_idx) = self.def.column_index(&def.column) else {
            return Err(EngineError::ColumnNotFound {
                table: self.def.name.clone(),
                column: def.column.clone(),
            });
        };

        let mut index = SecondaryIndex::new(def.unique);
        for (id, values) in self.rows.iter() {
            let value = values.get(col_idx).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            if index.put(value, *id).is_err() {
                return Err(EngineError::UniqueViolation {
                    table: self.def.name.clone(),
                    column: def.column.clone(),
                    value: Some(value.to_string()),
                    index: Some(def.name.clone()),
                });
            }
        }

        self.secondary.insert(def.name.clone(), index);
        self.def.indexes.push(def);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<(), EngineError> {
        if self.def.index(name).is_none() {
            return Err(EngineError::IndexNotFound {
                table: self.def.name.clone(),
                index: name.to_string(),
            });
        }
        self.secondary.remove(name);
        self.def.indexes.retain(|i| i.name != name);
        Ok(())
    }

    /// Appends a fresh ordinal to the schema. Existing rows are untouched —
    /// reads of the new column fall back to `Null` via `Row::get`.
    pub fn add_column(&mut self, col: crate::model::ColumnDef) {
        self.def.next_ordinal = self.def.next_ordinal.max(col.ordinal + 1);
        self.def.columns.push(col);
    }

    /// Removes a column by name. Existing row storage keeps its old width;
    /// readers index by position, and positions for columns after the
    /// removed one simply shift left after this call.
    pub fn drop_column(&mut self, name: &str) -> Option<usize> {
        let idx = self.def.column_index(name)?;
        self.def.columns.remove(idx);
        for values in self.rows.values_mut() {
            if idx < values.len() {
                values.remove(idx);
            }
        }
        Some(idx)
    }

    pub fn next_id_hint(&self) -> i64 {
        self.next_id
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    use crate::cmp::{compare, Comparison};
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => compare(a, b) == Comparison::Equal,
    }
}
