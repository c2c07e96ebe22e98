//! Drives a sequence of [`RawEntry`] values into an applier. Both live
//! writes and startup recovery go through the same `ReplayApply` methods,
//! so there is exactly one code path that mutates the in-memory catalog —
//! replay is just that path fed from disk instead of from a fresh request.

use super::payload::{
    decode_add_column, decode_create_index, decode_create_table, decode_delete, decode_drop_column,
    decode_drop_index, decode_drop_table, decode_insert, decode_update,
};
use super::{Op, RawEntry};
use crate::error::EngineError;
use crate::model::{ColumnDef, IndexDef};
use crate::value::Value;

/// Implemented by whatever owns the in-memory catalog (the [`crate::engine::Engine`]).
/// Each method performs the same mutation the corresponding public API call
/// performs, minus the WAL append — the entry being replayed already *is*
/// that append.
pub trait ReplayApply {
    fn on_create_table(&mut self, table: &str, columns: Vec<ColumnDef>) -> Result<(), EngineError>;
    fn on_drop_table(&mut self, table: &str) -> Result<(), EngineError>;
    fn on_insert(&mut self, table: &str, row_id: i64, values: Vec<Value>) -> Result<(), EngineError>;
    fn on_delete(&mut self, table: &str, row_ids: &[i64]) -> Result<(), EngineError>;
    fn on_update(&mut self, table: &str, rows: Vec<(i64, Vec<Value>)>) -> Result<(), EngineError>;
    fn on_add_column(&mut self, table: &str, column: ColumnDef) -> Result<(), EngineError>;
    fn on_drop_column(&mut self, table: &str, column: &str) -> Result<(), EngineError>;
    fn on_create_index(&mut self, table: &str, index: IndexDef) -> Result<(), EngineError>;
    fn on_drop_index(&mut self, table: &str, index: &str) -> Result<(), EngineError>;
}

/// Replays every entry in order, aborting on the first error — a partially
/// replayed catalog is never handed back to the caller.
pub fn replay<A: ReplayApply>(entries: &[RawEntry], apply: &mut A) -> Result<(), EngineError> {
    for entry in entries {
        apply_one(apply, entry)?;
    }
    Ok(())
}

fn apply_one<A: ReplayApply>(apply: &mut A, entry: &RawEntry) -> Result<(), EngineError> {
    let op = Op::from_byte(entry.op).ok_or(EngineError::WalUnknownOp { op: entry.op, offset: 0 })?;
    match op {
        Op::CreateTable => {
            let p = decode_create_table(&entry.payload)?;
            apply.on_create_table(&p.table, p.columns)
        }
        Op::DropTable => {
            let table = decode_drop_table(&entry.payload)?;
            apply.on_drop_table(&table)
        }
        Op::Insert => {
            let p = decode_insert(&entry.payload)?;
            apply.on_insert(&p.table, p.row_id, p.values)
        }
        Op::Delete => {
            let p = decode_delete(&entry.payload)?;
            apply.on_delete(&p.table, &p.row_ids)
        }
        Op::Update => {
            let p = decode_update(&entry.payload)?;
            apply.on_update(&p.table, p.rows)
        }
        Op::AddColumn => {
            let p = decode_add_column(&entry.payload)?;
            apply.on_add_column(&p.table, p.column)
        }
        Op::DropColumn => {
            let p = decode_drop_column(&entry.payload)?;
            apply.on_drop_column(&p.table, &p.column)
        }
        Op::CreateIndex => {
            let p = decode_create_index(&entry.payload)?;
            apply.on_create_index(&p.table, p.index)
        }
        Op::DropIndex => {
            let p = decode_drop_index(&entry.payload)?;
            apply.on_drop_index(&p.table, &p.index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::encode_frame;

    #[derive(Default)]
    struct Recorder {
        created: Vec<String>,
        inserted: Vec<(String, i64)>,
    }

    impl ReplayApply for Recorder {
        fn on_create_table(&mut self, table: &str, _columns: Vec<ColumnDef>) -> Result<(), EngineError> {
            self.created.push(table.to_string());
            Ok(())
        }
        fn on_drop_table(&mut self, _table: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_insert(&mut self, table: &str, row_id: i64, _values: Vec<Value>) -> Result<(), EngineError> {
            self.inserted.push((table.to_string(), row_id));
            Ok(())
        }
        fn on_delete(&mut self, _table: &str, _row_ids: &[i64]) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_update(&mut self, _table: &str, _rows: Vec<(i64, Vec<Value>)>) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_add_column(&mut self, _table: &str, _column: ColumnDef) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_drop_column(&mut self, _table: &str, _column: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_create_index(&mut self, _table: &str, _index: IndexDef) -> Result<(), EngineError> {
            Ok(())
        }
        fn on_drop_index(&mut self, _table: &str, _index: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn raw_from_frame(op: Op, payload: Vec<u8>) -> RawEntry {
        let frame = encode_frame(op.to_byte(), &payload);
        super::super::read_frame(&mut std::io::Cursor::new(frame)).unwrap().unwrap()
    }

    #[test]
    fn replay_dispatches_in_order() {
        use crate::model::ColumnDef as CD;
        use crate::value::DataType;
        use crate::wal::payload::{encode_create_table, encode_insert};

        let cols = vec![CD::new("id", DataType::Integer, true, 0)];
        let e1 = raw_from_frame(Op::CreateTable, encode_create_table("t", &cols));
        let e2 = raw_from_frame(Op::Insert, encode_insert("t", 1, &[Value::Integer(1)]));
        let e3 = raw_from_frame(Op::Insert, encode_insert("t", 2, &[Value::Integer(2)]));

        let mut rec = Recorder::default();
        replay(&[e1, e2, e3], &mut rec).unwrap();

        assert_eq!(rec.created, vec!["t".to_string()]);
        assert_eq!(rec.inserted, vec![("t".to_string(), 1), ("t".to_string(), 2)]);
    }

    #[test]
    fn unknown_op_byte_aborts_replay() {
        let entry = RawEntry { op: 200, payload: vec![] };
        let mut rec = Recorder::default();
        let err = replay(&[entry], &mut rec).unwrap_err();
        assert!(matches!(err, EngineError::WalUnknownOp { .. }));
    }
}
