//! Schema and row types shared by the catalog, heap, and WAL.

use crate::value::{DataType, Value};

/// A column's permanent slot index, assigned at table creation and
/// preserved across `AddColumn`/`DropColumn`. Dropped ordinals are never
/// reused.
pub type Ordinal = u16;

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    /// Defaults to `primary_key` at construction time, matching the v3→v4
    /// WAL migrator's `not_null_flag = pk_flag` rule.
    pub not_null: bool,
    pub ordinal: Ordinal,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, primary_key: bool, ordinal: Ordinal) -> Self {
        ColumnDef {
            name: name.into(),
            data_type,
            primary_key,
            not_null: primary_key,
            ordinal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub column: String,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub next_ordinal: Ordinal,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        let next_ordinal = columns.iter().map(|c| c.ordinal).max().map(|o| o + 1).unwrap_or(0);
        TableDef {
            name: name.into(),
            columns,
            next_ordinal,
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A stored row. `values` is indexed by position in `TableDef.columns`, not
/// by ordinal, and may be shorter than `columns` when the row predates an
/// `AddColumn` — reads of the new column then yield `Null`.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: i64,
    pub values: Vec<Value>,
}

const NULL_VALUE: Value = Value::Null;

impl Row {
    /// Returns the value at `col_idx`, or `Null` if the row predates that
    /// column.
    pub fn get(&self, col_idx: usize) -> &Value {
        self.values.get(col_idx).unwrap_or(&NULL_VALUE)
    }
}
