//! In-memory schema registry. Each table's [`TableDef`] lives inside its
//! own [`TableHeap`] (which owns the rows and indexes too) so that schema
//! and data can never drift apart; this module only adds the thin
//! create/drop/list surface over that map.

use crate::error::EngineError;
use crate::heap::TableHeap;
use crate::model::{ColumnDef, TableDef};
use std::collections::HashMap;

#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, TableHeap>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog { tables: HashMap::new() }
    }

    pub fn create_table(&mut self, def: TableDef) -> Result<(), EngineError> {
        if self.tables.contains_key(&def.name) {
            return Err(EngineError::TableExists(def.name));
        }
        self.tables.insert(def.name.clone(), TableHeap::new(def));
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<(), EngineError> {
        if self.tables.remove(name).is_none() {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn add_column(&mut self, table: &str, col: ColumnDef) -> Result<(), EngineError> {
        let heap = self.table_mut(table)?;
        if heap.def.column(&col.name).is_some() {
            return Err(EngineError::ColumnExists {
                table: table.to_string(),
                column: col.name,
            });
        }
        heap.add_column(col);
        Ok(())
    }

    /// Fails for PK columns and for the sole remaining column; otherwise
    /// removes the column by name.
    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<(), EngineError> {
        let heap = self.table_mut(table)?;
        let Some(col) = heap.def.column(column) else {
            return Err(EngineError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        };
        if col.primary_key {
            return Err(EngineError::CannotDropPk {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        if heap.def.columns.len() == 1 {
            return Err(EngineError::CannotDropLastColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        heap.drop_column(column);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name).map(|h| &h.def)
    }

    pub fn list_tables(&self) -> Vec<TableDef> {
        self.tables.values().map(|h| h.def.clone()).collect()
    }

    pub fn table(&self, name: &str) -> Result<&TableHeap, EngineError> {
        self.tables.get(name).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut TableHeap, EngineError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}
