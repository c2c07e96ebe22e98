//! End-to-end scenarios against the engine through its public API only,
//! exercising restart durability, atomic batch rejection, and WAL tamper
//! detection the way SPEC_FULL.md §8 describes them.

use pgmini_engine::{ColumnDef, DataType, Engine, EngineError, Row, Value};
use tempfile::tempdir;

fn users_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", DataType::Integer, true, 0),
        ColumnDef::new("name", DataType::Text, false, 1),
    ]
}

fn text_of(row: &Row, idx: usize) -> &str {
    match &row.values[idx] {
        Value::Text(s) => s.as_str(),
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn insert_then_restart_round_trips_rows_and_pk_lookup() {
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
    let names: std::collections::HashSet<&str> = rows.iter().map(|r| text_of(r, 1)).collect();
    assert!(names.contains("alice"));
    assert!(names.contains("bob"));

    let alice = engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(text_of(&alice, 1), "alice");
}

#[test]
fn unique_violation_in_a_batch_is_atomic() {
    let dir = tempdir().unwrap();
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

    match err {
        EngineError::UniqueViolation { column, value, .. } => {
            assert_eq!(column, "id");
            assert_eq!(value.as_deref(), Some("1"));
        }
        other => panic!("expected UniqueViolation, got {other:?}"),
    }

    // No WAL entry was appended for the rejected batch: exactly the first
    // two rows are still present.
    let rows: Vec<Row> = engine.scan("users").unwrap().collect();
    assert_eq!(rows.len(), 2);
}

#[test]
fn update_pk_collision_is_rejected_then_a_valid_rename_succeeds() {
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
    assert!(engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().is_some());
    assert!(engine.lookup_by_pk("users", &Value::Integer(2)).unwrap().is_some());

    let updated = engine
        .update("users", &[("id".to_string(), Value::Integer(3))], |r| r.id == 1)
        .unwrap();
    assert_eq!(updated, 1);
    assert!(engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().is_none());
    assert!(engine.lookup_by_pk("users", &Value::Integer(3)).unwrap().is_some());
}

#[test]
fn secondary_index_lookup_and_drop_round_trip_across_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .create_index(
                "users",
                pgmini_engine::IndexDef {
                    name: "by_name".into(),
                    column: "name".into(),
                    unique: false,
                },
            )
            .unwrap();
        engine
            .insert(
                "users",
                None,
                vec![
                    vec![Value::Integer(1), Value::Text("shared".into())],
                    vec![Value::Integer(2), Value::Text("shared".into())],
                ],
            )
            .unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(dir.path(), false).unwrap();
    let matches = engine
        .lookup_by_index("users", "by_name", &Value::Text("shared".into()))
        .unwrap();
    assert_eq!(matches.len(), 2);

    engine.drop_index("users", "by_name").unwrap();
    assert!(engine
        .lookup_by_index("users", "by_name", &Value::Text("shared".into()))
        .unwrap()
        .is_empty());
}

#[test]
fn add_column_then_restart_yields_null_for_old_rows() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .insert("users", None, vec![vec![Value::Integer(1), Value::Text("a".into())]])
            .unwrap();
        engine
            .add_column("users", ColumnDef::new("age", DataType::Integer, false, 2))
            .unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(dir.path(), false).unwrap();
    let row = engine.lookup_by_pk("users", &Value::Integer(1)).unwrap().unwrap();
    assert!(matches!(row.get(2), Value::Null));

    engine
        .insert(
            "users",
            None,
            vec![vec![Value::Integer(2), Value::Text("b".into()), Value::Integer(30)]],
        )
        .unwrap();
    let row2 = engine.lookup_by_pk("users", &Value::Integer(2)).unwrap().unwrap();
    assert!(matches!(row2.get(2), Value::Integer(30)));
}

#[test]
fn torn_wal_tail_is_refused_on_reopen() {
    use std::fs::OpenOptions;
    use std::io::Write;

    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), false).unwrap();
        engine.create_table("users", users_columns()).unwrap();
        engine
            .insert("users", None, vec![vec![Value::Integer(1), Value::Text("a".into())]])
            .unwrap();
        engine.close().unwrap();
    }

    // Append a frame whose declared length overruns the bytes actually
    // written — a crash mid-append.
    let wal_path = dir.path().join("catalog.wal");
    {
        let mut f = OpenOptions::new().append(true).open(&wal_path).unwrap();
        let total_len: u32 = 40;
        f.write_all(&total_len.to_be_bytes()).unwrap();
        f.write_all(&[3u8]).unwrap();
        f.write_all(b"short").unwrap();
        f.sync_all().unwrap();
    }

    let err = Engine::open(dir.path(), false).unwrap_err();
    assert!(matches!(err, EngineError::WalShortFrame { .. }));
}
