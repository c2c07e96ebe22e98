//! The engine facade: a `parking_lot::RwLock`-protected catalog plus WAL
//! handle. Every write op follows pre-validate → WAL append+fsync → apply;
//! every read op snapshots to owned memory before releasing the lock.
//! Replay drives the exact same catalog/heap mutators as live writes
//! (`ReplayApply` below), which is the crate's central correctness argument:
//! nothing reachable at runtime is unreachable on restart.

use crate::catalog::Catalog;
use crate::cmp::{compare, Comparison};
use crate::error::{EngineError, EngineResult};
use crate::heap::RowIterator;
use crate::model::{ColumnDef, IndexDef, Row, TableDef};
use crate::timestamp::parse_timestamp;
use crate::value::{DataType, Value};
use crate::wal::replay::{replay, ReplayApply};
use crate::wal::{self, payload, Op, WalWriter};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

struct EngineState {
    catalog: Catalog,
    wal: WalWriter,
}

pub struct Engine {
    data_dir: PathBuf,
    state: RwLock<EngineState>,
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => compare(a, b) == Comparison::Equal,
    }
}

/// Coerces `v` into column `col`'s declared type where there is an
/// unambiguous conversion (text → timestamp, integer → float); anything
/// else that doesn't already match is a `TypeMismatch`.
fn coerce_value(col: &ColumnDef, v: Value) -> EngineResult<Value> {
    if v.is_null() {
        return Ok(v);
    }
    if v.data_type() == Some(col.data_type) {
        return Ok(v);
    }
    match (col.data_type, &v) {
        (DataType::Timestamp, Value::Text(s)) => {
            let dt = parse_timestamp(s)?;
            Ok(Value::Timestamp(dt))
        }
        (DataType::Float, Value::Integer(i)) => Ok(Value::Float(*i as f64)),
        _ => Err(EngineError::TypeMismatch {
            column: col.name.clone(),
            expected: col.data_type.to_string(),
            got: v.data_type().map(|t| t.to_string()).unwrap_or_else(|| "NULL".to_string()),
        }),
    }
}

fn validate_not_null(def: &TableDef, values: &[Value]) -> EngineResult<()> {
    for col in &def.columns {
        let Some(idx) = def.column_index(&col.name) else { continue };
        let value = values.get(idx).unwrap_or(&Value::Null);
        if col.not_null && value.is_null() {
            return Err(EngineError::NotNullViolation {
                table: def.name.clone(),
                column: col.name.clone(),
            });
        }
    }
    Ok(())
}

impl Engine {
    /// Opens (or creates) the engine's data directory and `catalog.wal`
    /// inside it, replaying every entry already on disk. `migrate` mirrors
    /// the WAL's own `allow_migrate` flag.
    pub fn open(data_dir: &Path, migrate: bool) -> EngineResult<Engine> {
        std::fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join("catalog.wal");
        info!(path = %wal_path.display(), "opening WAL");
        let opened = wal::open(&wal_path, migrate)?;
        info!(entries = opened.entries.len(), "replaying WAL");

        let mut state = EngineState {
            catalog: Catalog::new(),
            wal: opened.writer,
        };
        replay(&opened.entries, &mut state)?;
        debug!(tables = state.catalog.list_tables().len(), "replay complete");

        Ok(Engine {
            data_dir: data_dir.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    pub fn close(&self) -> EngineResult<()> {
        self.state.write().wal.flush()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDef>) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.catalog.contains_table(name) {
            return Err(EngineError::TableExists(name.to_string()));
        }
        let payload = payload::encode_create_table(name, &columns);
        state.wal.append(Op::CreateTable, &payload)?;
        state
            .catalog
            .create_table(TableDef::new(name, columns))
            .expect("table creation pre-validated before WAL append");
        info!(table = name, "created table");
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.write();
        if !state.catalog.contains_table(name) {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        let payload = payload::encode_drop_table(name);
        state.wal.append(Op::DropTable, &payload)?;
        state.catalog.drop_table(name).expect("drop pre-validated before WAL append");
        info!(table = name, "dropped table");
        Ok(())
    }

    pub fn add_column(&self, table: &str, column: ColumnDef) -> EngineResult<()> {
        let mut state = self.state.write();
        let def = state.catalog.get_table(table).ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        if def.column(&column.name).is_some() {
            return Err(EngineError::ColumnExists { table: table.to_string(), column: column.name });
        }
        let payload = payload::encode_add_column(table, &column);
        state.wal.append(Op::AddColumn, &payload)?;
        state
            .catalog
            .add_column(table, column)
            .expect("add_column pre-validated before WAL append");
        Ok(())
    }

    pub fn drop_column(&self, table: &str, column: &str) -> EngineResult<()> {
        let mut state = self.state.write();
        let def = state.catalog.get_table(table).ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        let col = def.column(column).ok_or_else(|| EngineError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        if col.primary_key {
            return Err(EngineError::CannotDropPk { table: table.to_string(), column: column.to_string() });
        }
        if def.columns.len() == 1 {
            return Err(EngineError::CannotDropLastColumn { table: table.to_string(), column: column.to_string() });
        }
        let payload = payload::encode_drop_column(table, column);
        state.wal.append(Op::DropColumn, &payload)?;
        state
            .catalog
            .drop_column(table, column)
            .expect("drop_column pre-validated before WAL append");
        Ok(())
    }

    pub fn create_index(&self, table: &str, index: IndexDef) -> EngineResult<()> {
        let mut state = self.state.write();
        let heap = state.catalog.table(table)?;
        if heap.def.index(&index.name).is_some() {
            return Err(EngineError::IndexExists { table: table.to_string(), index: index.name });
        }
        if heap.def.column_index(&index.column).is_none() {
            return Err(EngineError::ColumnNotFound { table: table.to_string(), column: index.column });
        }
        let payload = payload::encode_create_index(table, &index);
        state.wal.append(Op::CreateIndex, &payload)?;
        let heap = state.catalog.table_mut(table)?;
        heap.create_index(index)?;
        Ok(())
    }

    pub fn drop_index(&self, table: &str, index: &str) -> EngineResult<()> {
        let mut state = self.state.write();
        let heap = state.catalog.table(table)?;
        if heap.def.index(index).is_none() {
            return Err(EngineError::IndexNotFound { table: table.to_string(), index: index.to_string() });
        }
        let payload = payload::encode_drop_index(table, index);
        state.wal.append(Op::DropIndex, &payload)?;
        state.catalog.table_mut(table)?.drop_index(index).expect("drop_index pre-validated before WAL append");
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<TableDef> {
        self.state.read().catalog.get_table(name).cloned()
    }

    pub fn list_tables(&self) -> Vec<TableDef> {
        self.state.read().catalog.list_tables()
    }

    pub fn row_count(&self, table: &str) -> EngineResult<i64> {
        Ok(self.state.read().catalog.table(table)?.row_count())
    }

    pub fn scan(&self, table: &str) -> EngineResult<RowIterator> {
        Ok(self.state.read().catalog.table(table)?.scan())
    }

    pub fn lookup_by_pk(&self, table: &str, value: &Value) -> EngineResult<Option<Row>> {
        Ok(self.state.read().catalog.table(table)?.lookup_by_pk(value))
    }

    pub fn lookup_by_index(&self, table: &str, index_name: &str, value: &Value) -> EngineResult<Vec<Row>> {
        Ok(self.state.read().catalog.table(table)?.lookup_by_index(index_name, value))
    }

    /// Resolves `raw` (one row) under `columns` (or the table's declared
    /// column order when `None`) into a full-width, type-coerced value
    /// vector.
    fn resolve_row(def: &TableDef, columns: Option<&[String]>, raw: Vec<Value>) -> EngineResult<Vec<Value>> {
        let mut resolved = match columns {
            None => {
                if raw.len() != def.columns.len() {
                    return Err(EngineError::ValueCount { expected: def.columns.len(), got: raw.len() });
                }
                raw
            }
            Some(cols) => {
                if raw.len() != cols.len() {
                    return Err(EngineError::ValueCount { expected: cols.len(), got: raw.len() });
                }
                let mut out = vec![Value::Null; def.columns.len()];
                for (name, value) in cols.iter().zip(raw) {
                    let idx = def.column_index(name).ok_or_else(|| EngineError::ColumnNotFound {
                        table: def.name.clone(),
                        column: name.clone(),
                    })?;
                    out[idx] = value;
                }
                out
            }
        };
        for (idx, col) in def.columns.iter().enumerate() {
            let value = std::mem::replace(&mut resolved[idx], Value::Null);
            resolved[idx] = coerce_value(col, value)?;
        }
        Ok(resolved)
    }

    /// Inserts every row in `values` as one WAL-atomic batch: all rows are
    /// resolved, coerced, and checked for NOT NULL/PK-uniqueness (against
    /// both existing rows and the rest of the batch) before any WAL entry
    /// is written. Returns the number of rows inserted.
    pub fn insert(&self, table: &str, columns: Option<&[String]>, values: Vec<Vec<Value>>) -> EngineResult<i64> {
        let mut state = self.state.write();
        let heap = state.catalog.table(table)?;
        let def = heap.def.clone();

        let mut rows = Vec::with_capacity(values.len());
        for raw in values {
            let resolved = Self::resolve_row(&def, columns, raw)?;
            validate_not_null(&def, &resolved)?;
            rows.push(resolved);
        }

        if let Some(pk_col) = def.primary_key_column() {
            let pk_idx = def.column_index(&pk_col.name).expect("pk column is a column");
            let mut seen: Vec<&Value> = Vec::new();
            for row in &rows {
                let v = &row[pk_idx];
                if heap.lookup_by_pk(v).is_some() {
                    return Err(EngineError::UniqueViolation {
                        table: table.to_string(),
                        column: pk_col.name.clone(),
                        value: Some(v.to_string()),
                        index: None,
                    });
                }
                if seen.iter().any(|existing| values_equal(existing, v)) {
                    return Err(EngineError::UniqueViolation {
                        table: table.to_string(),
                        column: pk_col.name.clone(),
                        value: Some(v.to_string()),
                        index: None,
                    });
                }
                seen.push(v);
            }
        }

        for idx_def in &def.indexes {
            if !idx_def.unique {
                continue;
            }
            let Some(col_idx) = def.column_index(&idx_def.column) else { continue };
            let mut seen: Vec<&Value> = Vec::new();
            for row in &rows {
                let v = &row[col_idx];
                if v.is_null() {
                    continue;
                }
                if !heap.lookup_by_index(&idx_def.name, v).is_empty()
                    || seen.iter().any(|existing| values_equal(existing, v))
                {
                    return Err(EngineError::UniqueViolation {
                        table: table.to_string(),
                        column: idx_def.column.clone(),
                        value: Some(v.to_string()),
                        index: Some(idx_def.name.clone()),
                    });
                }
                seen.push(v);
            }
        }

        let mut inserted = 0i64;
        for row in rows {
            let id = state.catalog.table_mut(table)?.allocate_id();
            let payload = payload::encode_insert(table, id, &row);
            state.wal.append(Op::Insert, &payload)?;
            state
                .catalog
                .table_mut(table)?
                .insert_with_id(id, row)
                .expect("insert pre-validated before WAL append");
            inserted += 1;
        }
        debug!(table, inserted, "batch insert complete");
        Ok(inserted)
    }

    /// Updates every row the filter matches. If the PK column, or any
    /// column backing a unique secondary index, is among `sets`, the whole
    /// batch's new values for that column are validated for non-nullness
    /// (PK only), intra-batch uniqueness, and collision against rows
    /// outside the batch before a single WAL `Update` entry is written.
    pub fn update<F>(&self, table: &str, sets: &[(String, Value)], filter: F) -> EngineResult<i64>
    where
        F: Fn(&Row) -> bool,
    {
        let mut state = self.state.write();
        let heap = state.catalog.table(table)?;
        let def = heap.def.clone();

        let mut set_indices = Vec::with_capacity(sets.len());
        for (name, _) in sets {
            let idx = def.column_index(name).ok_or_else(|| EngineError::ColumnNotFound {
                table: table.to_string(),
                column: name.clone(),
            })?;
            set_indices.push(idx);
        }

        let candidates: Vec<Row> = heap.scan().filter(|r| filter(r)).collect();
        let candidate_ids: Vec<i64> = candidates.iter().map(|r| r.id).collect();

        let mut updates: Vec<(i64, Vec<Value>)> = Vec::with_capacity(candidates.len());
        for row in &candidates {
            let mut new_values = row.values.clone();
            while new_values.len() < def.columns.len() {
                new_values.push(Value::Null);
            }
            for (idx, (_, value)) in set_indices.iter().zip(sets) {
                let col = &def.columns[*idx];
                new_values[*idx] = coerce_value(col, value.clone())?;
            }
            validate_not_null(&def, &new_values)?;
            updates.push((row.id, new_values));
        }

        if let Some(pk_col) = def.primary_key_column() {
            let pk_idx = def.column_index(&pk_col.name).expect("pk column is a column");
            if set_indices.contains(&pk_idx) {
                let mut seen: Vec<&Value> = Vec::new();
                for (_, values) in &updates {
                    let v = &values[pk_idx];
                    if let Some(existing) = heap.lookup_by_pk(v) {
                        if !candidate_ids.contains(&existing.id) {
                            return Err(EngineError::UniqueViolation {
                                table: table.to_string(),
                                column: pk_col.name.clone(),
                                value: Some(v.to_string()),
                                index: None,
                            });
                        }
                    }
                    if seen.iter().any(|existing| values_equal(existing, v)) {
                        return Err(EngineError::UniqueViolation {
                            table: table.to_string(),
                            column: pk_col.name.clone(),
                            value: Some(v.to_string()),
                            index: None,
                        });
                    }
                    seen.push(v);
                }
            }
        }

        for idx_def in &def.indexes {
            if !idx_def.unique {
                continue;
            }
            let Some(col_idx) = def.column_index(&idx_def.column) else { continue };
            if !set_indices.contains(&col_idx) {
                // Value cannot have changed for a column that isn't in `sets`.
                continue;
            }
            let mut seen: Vec<&Value> = Vec::new();
            for (_, values) in &updates {
                let v = &values[col_idx];
                if v.is_null() {
                    continue;
                }
                let collides_outside_batch = heap
                    .lookup_by_index(&idx_def.name, v)
                    .into_iter()
                    .any(|existing| !candidate_ids.contains(&existing.id));
                if collides_outside_batch || seen.iter().any(|existing| values_equal(existing, v)) {
                    return Err(EngineError::UniqueViolation {
                        table: table.to_string(),
                        column: idx_def.column.clone(),
                        value: Some(v.to_string()),
                        index: Some(idx_def.name.clone()),
                    });
                }
                seen.push(v);
            }
        }

        if updates.is_empty() {
            return Ok(0);
        }

        let payload = payload::encode_update(table, &updates);
        state.wal.append(Op::Update, &payload)?;
        let heap = state.catalog.table_mut(table)?;
        let count = updates.len() as i64;
        for (id, values) in updates {
            heap.update_row(id, values).expect("update pre-validated before WAL append");
        }
        debug!(table, updated = count, "batch update complete");
        Ok(count)
    }

    /// Deletes every row the filter matches in a single WAL entry; a
    /// filter matching nothing appends no entry at all.
    pub fn delete<F>(&self, table: &str, filter: F) -> EngineResult<i64>
    where
        F: Fn(&Row) -> bool,
    {
        let mut state = self.state.write();
        let heap = state.catalog.table(table)?;
        let ids: Vec<i64> = heap.scan().filter(|r| filter(r)).map(|r| r.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let payload = payload::encode_delete(table, &ids);
        state.wal.append(Op::Delete, &payload)?;
        let heap = state.catalog.table_mut(table)?;
        heap.delete_rows(&ids);
        debug!(table, deleted = ids.len(), "batch delete complete");
        Ok(ids.len() as i64)
    }
}

impl ReplayApply for EngineState {
    fn on_create_table(&mut self, table: &str, columns: Vec<ColumnDef>) -> EngineResult<()> {
        self.catalog.create_table(TableDef::new(table, columns))
    }

    fn on_drop_table(&mut self, table: &str) -> EngineResult<()> {
        self.catalog.drop_table(table)
    }

    fn on_insert(&mut self, table: &str, row_id: i64, values: Vec<Value>) -> EngineResult<()> {
        self.catalog.table_mut(table)?.insert_with_id(row_id, values).map_err(|e| {
            warn!(table, row_id, "replay insert violated a heap invariant");
            e
        })
    }

    fn on_delete(&mut self, table: &str, row_ids: &[i64]) -> EngineResult<()> {
        self.catalog.table_mut(table)?.delete_rows(row_ids);
        Ok(())
    }

    fn on_update(&mut self, table: &str, rows: Vec<(i64, Vec<Value>)>) -> EngineResult<()> {
        let heap = self.catalog.table_mut(table)?;
        for (id, values) in rows {
            heap.update_row(id, values)?;
        }
        Ok(())
    }

    fn on_add_column(&mut self, table: &str, column: ColumnDef) -> EngineResult<()> {
        self.catalog.add_column(table, column)
    }

    fn on_drop_column(&mut self, table: &str, column: &str) -> EngineResult<()> {
        self.catalog.drop_column(table, column)
    }

    fn on_create_index(&mut self, table: &str, index: IndexDef) -> EngineResult<()> {
        self.catalog.table_mut(table)?.create_index(index)
    }

    fn on_drop_index(&mut self, table: &str, index: &str) -> EngineResult<()> {
        self.catalog.table_mut(table)?.drop_index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;
    use tempfile::tempdir;

    fn users_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Integer, true, 0),
            ColumnDef::new("name", DataType::Text, false, 1),
        ]
    }

    #[test]
    fn insert_then_restart_preserves_rows() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), false).unwrap();
            engine.create_table("users", users_columns()).unwrap();
            engine
                .insert(
                    "users",
                    None,
                    vec![
                        vec![Value::Integer(1), Value::Text("alice".into())],
                        vec![Value::Integer(2), Value::Text("bob".into())],
                    ],
                )
                .unwrap();
            engine.close().unwrap();
        }

        let engine = Engine::open(dir.path(), false).unwrap();
        let rows: Vec<Row> = engine.scan("users").unwrap().collect();
        assert_eq!(rows.len(), 2);
        let alice = engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().unwrap();
        assert!(matches!(&alice.values[1], Value::Text(s) if s == "alice"));
    }

    #[test]
    fn duplicate_pk_in_batch_rejects_whole_batch() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .insert("users", None, vec![vec![Value::Integer(1), Value::Text("a".into())]])
            .unwrap();

        let err = engine
            .insert(
                "users",
                None,
                vec![
                    vec![Value::Integer(3), Value::Text("carol".into())],
                    vec![Value::Integer(1), Value::Text("dave".into())],
                ],
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation { .. }));
        assert_eq!(engine.row_count("users").unwrap(), 1);
    }

    #[test]
    fn update_pk_collision_is_rejected_but_valid_rename_succeeds() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .insert(
                "users",
                None,
                vec![
                    vec![Value::Integer(1), Value::Text("a".into())],
                    vec![Value::Integer(2), Value::Text("b".into())],
                ],
            )
            .unwrap();

        let err = engine
            .update("users", &[("id".to_string(), Value::Integer(2))], |r| r.id == 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation { .. }));

        engine
            .update("users", &[("id".to_string(), Value::Integer(3))], |r| r.id == 1)
            .unwrap();
        assert!(engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().is_none());
        assert!(engine.lookup_by_pk("users", &Value::Integer(3)).unwrap().is_some());
    }

    #[test]
    fn update_into_a_secondary_unique_collision_is_rejected_and_file_stays_reopenable() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .create_index(
                "users",
                IndexDef { name: "by_name".into(), column: "name".into(), unique: true },
            )
            .unwrap();
        engine
            .insert(
                "users",
                None,
                vec![
                    vec![Value::Integer(1), Value::Text("alice".into())],
                    vec![Value::Integer(2), Value::Text("bob".into())],
                ],
            )
            .unwrap();

        let err = engine
            .update("users", &[("name".to_string(), Value::Text("bob".into()))], |r| r.id == 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation { .. }));

        // The rejection must have happened before any WAL byte was written:
        // both rows are untouched, and the engine reopens cleanly.
        assert!(engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().is_some());
        drop(engine);
        let reopened = Engine::open(dir.path(), false).unwrap();
        assert_eq!(reopened.row_count("users").unwrap(), 2);
    }

    #[test]
    fn not_null_violation_rejects_insert() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), false).unwrap();
        let cols = vec![
            ColumnDef::new("id", DataType::Integer, true, 0),
            ColumnDef {
                name: "email".into(),
                data_type: DataType::Text,
                primary_key: false,
                not_null: true,
                ordinal: 1,
            },
        ];
        engine.create_table("users", cols).unwrap();
        let err = engine
            .insert("users", None, vec![vec![Value::Integer(1), Value::Null]])
            .unwrap_err();
        assert!(matches!(err, EngineError::NotNullViolation { .. }));
    }

    #[test]
    fn delete_with_no_matches_appends_nothing() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        let deleted = engine.delete("users", |r| r.id == 999).unwrap();
        assert_eq!(deleted, 0);
    }
}
