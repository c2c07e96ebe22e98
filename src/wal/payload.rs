//! Current-version (v4) payload encoding for every WAL op. Older versions'
//! layouts live only in [`super::migration`] as byte-level transforms; by
//! the time a payload reaches these functions it has already been migrated
//! forward to v4.

use crate::error::EngineError;
use crate::model::{ColumnDef, IndexDef, Ordinal};
use crate::value::{
    decode_string, decode_value_list, encode_string, encode_value_list, DataType, Value,
};

fn encode_column(buf: &mut Vec<u8>, col: &ColumnDef) {
    encode_string(buf, &col.name);
    buf.push(col.data_type.to_byte());
    buf.push(col.primary_key as u8);
    buf.push(col.not_null as u8);
    buf.extend_from_slice(&col.ordinal.to_be_bytes());
}

fn decode_column(bytes: &[u8]) -> Result<(ColumnDef, &[u8]), EngineError> {
    let (name, rest) = decode_string(bytes)?;
    let (type_byte, rest) = take1(rest)?;
    let data_type = DataType::from_byte(type_byte)?;
    let (pk_byte, rest) = take1(rest)?;
    let (not_null_byte, rest) = take1(rest)?;
    let (ord_bytes, rest) = take(rest, 2)?;
    let ordinal = Ordinal::from_be_bytes(ord_bytes.try_into().unwrap());
    Ok((
        ColumnDef {
            name,
            data_type,
            primary_key: pk_byte != 0,
            not_null: not_null_byte != 0,
            ordinal,
        },
        rest,
    ))
}

fn take(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), EngineError> {
    if bytes.len() < n {
        return Err(EngineError::WalDecode(format!(
            "truncated WAL payload: needed {n} bytes, had {}",
            bytes.len()
        )));
    }
    Ok(bytes.split_at(n))
}

fn take1(bytes: &[u8]) -> Result<(u8, &[u8]), EngineError> {
    let (head, rest) = take(bytes, 1)?;
    Ok((head[0], rest))
}

pub struct CreateTablePayload {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

pub fn encode_create_table(table: &str, columns: &[ColumnDef]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    assert!(columns.len() <= u16::MAX as usize, "too many columns");
    buf.extend_from_slice(&(columns.len() as u16).to_be_bytes());
    for col in columns {
        encode_column(&mut buf, col);
    }
    buf
}

pub fn decode_create_table(bytes: &[u8]) -> Result<CreateTablePayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (count_bytes, mut rest) = take(rest, 2)?;
    let count = u16::from_be_bytes(count_bytes.try_into().unwrap()) as usize;
    let mut columns = Vec::with_capacity(count);
    for _ in 0..count {
        let (col, r) = decode_column(rest)?;
        columns.push(col);
        rest = r;
    }
    Ok(CreateTablePayload { table, columns })
}

pub fn encode_drop_table(table: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    buf
}

pub fn decode_drop_table(bytes: &[u8]) -> Result<String, EngineError> {
    Ok(decode_string(bytes)?.0)
}

pub struct InsertPayload {
    pub table: String,
    pub row_id: i64,
    pub values: Vec<Value>,
}

pub fn encode_insert(table: &str, row_id: i64, values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    buf.extend_from_slice(&row_id.to_be_bytes());
    encode_value_list(&mut buf, values);
    buf
}

pub fn decode_insert(bytes: &[u8]) -> Result<InsertPayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (id_bytes, rest) = take(rest, 8)?;
    let row_id = i64::from_be_bytes(id_bytes.try_into().unwrap());
    let (values, _) = decode_value_list(rest)?;
    Ok(InsertPayload { table, row_id, values })
}

/// Delete is batched: one WAL entry covers every row a single `Engine::delete`
/// call removes, matching the engine facade's "collect matching IDs, then
/// WAL-append a single Delete entry" contract.
pub struct DeletePayload {
    pub table: String,
    pub row_ids: Vec<i64>,
}

pub fn encode_delete(table: &str, row_ids: &[i64]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    assert!(row_ids.len() <= u16::MAX as usize, "too many rows in one delete batch");
    buf.extend_from_slice(&(row_ids.len() as u16).to_be_bytes());
    for id in row_ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf
}

pub fn decode_delete(bytes: &[u8]) -> Result<DeletePayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (count_bytes, mut rest) = take(rest, 2)?;
    let count = u16::from_be_bytes(count_bytes.try_into().unwrap()) as usize;
    let mut row_ids = Vec::with_capacity(count);
    for _ in 0..count {
        let (id_bytes, r) = take(rest, 8)?;
        row_ids.push(i64::from_be_bytes(id_bytes.try_into().unwrap()));
        rest = r;
    }
    Ok(DeletePayload { table, row_ids })
}

/// Update is batched the same way: one entry per `Engine::update` call,
/// covering every row the filter matched.
pub struct UpdatePayload {
    pub table: String,
    pub rows: Vec<(i64, Vec<Value>)>,
}

pub fn encode_update(table: &str, rows: &[(i64, Vec<Value>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    assert!(rows.len() <= u16::MAX as usize, "too many rows in one update batch");
    buf.extend_from_slice(&(rows.len() as u16).to_be_bytes());
    for (row_id, values) in rows {
        buf.extend_from_slice(&row_id.to_be_bytes());
        encode_value_list(&mut buf, values);
    }
    buf
}

pub fn decode_update(bytes: &[u8]) -> Result<UpdatePayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (count_bytes, mut rest) = take(rest, 2)?;
    let count = u16::from_be_bytes(count_bytes.try_into().unwrap()) as usize;
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        let (id_bytes, r) = take(rest, 8)?;
        let row_id = i64::from_be_bytes(id_bytes.try_into().unwrap());
        let (values, r) = decode_value_list(r)?;
        rows.push((row_id, values));
        rest = r;
    }
    Ok(UpdatePayload { table, rows })
}

pub struct AddColumnPayload {
    pub table: String,
    pub column: ColumnDef,
}

pub fn encode_add_column(table: &str, column: &ColumnDef) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    encode_column(&mut buf, column);
    buf
}

pub fn decode_add_column(bytes: &[u8]) -> Result<AddColumnPayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (column, _) = decode_column(rest)?;
    Ok(AddColumnPayload { table, column })
}

pub struct DropColumnPayload {
    pub table: String,
    pub column: String,
}

pub fn encode_drop_column(table: &str, column: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    encode_string(&mut buf, column);
    buf
}

pub fn decode_drop_column(bytes: &[u8]) -> Result<DropColumnPayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (column, _) = decode_string(rest)?;
    Ok(DropColumnPayload { table, column })
}

pub struct CreateIndexPayload {
    pub table: String,
    pub index: IndexDef,
}

pub fn encode_create_index(table: &str, index: &IndexDef) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    encode_string(&mut buf, &index.name);
    encode_string(&mut buf, &index.column);
    buf.push(index.unique as u8);
    buf
}

pub fn decode_create_index(bytes: &[u8]) -> Result<CreateIndexPayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (name, rest) = decode_string(rest)?;
    let (column, rest) = decode_string(rest)?;
    let (unique_byte, _) = take1(rest)?;
    Ok(CreateIndexPayload {
        table,
        index: IndexDef {
            name,
            column,
            unique: unique_byte != 0,
        },
    })
}

pub struct DropIndexPayload {
    pub table: String,
    pub index: String,
}

pub fn encode_drop_index(table: &str, index: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_string(&mut buf, table);
    encode_string(&mut buf, index);
    buf
}

pub fn decode_drop_index(bytes: &[u8]) -> Result<DropIndexPayload, EngineError> {
    let (table, rest) = decode_string(bytes)?;
    let (index, _) = decode_string(rest)?;
    Ok(DropIndexPayload { table, index })
}
