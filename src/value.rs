//! Tag-prefixed serialization of typed column values.
//!
//! Every [`Value`] round-trips through [`encode_value`]/[`decode_value`]
//! unchanged except for non-UTC timestamps, which are normalized to UTC on
//! decode. Text length is bounded at 65535 bytes; exceeding that is a
//! programming error the caller must have prevented earlier (the encoder
//! panics rather than silently truncating).

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use std::fmt;

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_BOOLEAN: u8 = 3;
const TAG_TIMESTAMP: u8 = 4;
const TAG_FLOAT: u8 = 5;

/// The column data type, as recorded in `ColumnDef` and WAL DDL payloads.
///
/// Distinct from [`Value`]'s own tag space: a column's declared type never
/// includes "null", whereas a stored value can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Text,
    Boolean,
    Timestamp,
    Float,
}

impl DataType {
    pub fn to_byte(self) -> u8 {
        match self {
            DataType::Integer => 0,
            DataType::Text => 1,
            DataType::Boolean => 2,
            DataType::Timestamp => 3,
            DataType::Float => 4,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, EngineError> {
        Ok(match b {
            0 => DataType::Integer,
            1 => DataType::Text,
            2 => DataType::Boolean,
            3 => DataType::Timestamp,
            4 => DataType::Float,
            other => return Err(EngineError::WalDecode(format!("unknown data type byte {other}"))),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Float => "FLOAT",
        };
        f.write_str(s)
    }
}

/// A typed column value. `Null` is a value of every type, not a type of its
/// own; the comparator treats it as `Incomparable` against anything.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Float(f64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Text(_) => Some(DataType::Text),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Float(_) => Some(DataType::Float),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Appends the wire encoding of `v` to `buf`.
///
/// Panics if `v` is `Value::Text` longer than 65535 bytes — callers must
/// validate text length before it reaches the codec.
pub fn encode_value(buf: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null => buf.push(TAG_NULL),
        Value::Integer(i) => {
            buf.push(TAG_INTEGER);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Text(s) => {
            buf.push(TAG_TEXT);
            let bytes = s.as_bytes();
            assert!(
                bytes.len() <= 65_535,
                "text value exceeds the 65535-byte wire limit"
            );
            buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            buf.extend_from_slice(bytes);
        }
        Value::Boolean(b) => {
            buf.push(TAG_BOOLEAN);
            buf.push(if *b { 1 } else { 0 });
        }
        Value::Timestamp(t) => {
            buf.push(TAG_TIMESTAMP);
            let micros = t.timestamp_micros();
            buf.extend_from_slice(&micros.to_be_bytes());
        }
        Value::Float(v) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&v.to_bits().to_be_bytes());
        }
    }
}

/// Decodes one value from the front of `bytes`, returning the value and the
/// remaining slice. A truncated input is a recoverable decode error; an
/// unknown tag is fatal (callers treat it as WAL corruption).
pub fn decode_value(bytes: &[u8]) -> Result<(Value, &[u8]), EngineError> {
    let (&tag, rest) = bytes
        .split_first()
        .ok_or_else(|| EngineError::WalDecode("truncated value: missing tag".into()))?;
    match tag {
        TAG_NULL => Ok((Value::Null, rest)),
        TAG_INTEGER => {
            let (raw, rest) = take(rest, 8, "integer")?;
            let i = i64::from_be_bytes(raw.try_into().unwrap());
            Ok((Value::Integer(i), rest))
        }
        TAG_TEXT => {
            let (len_bytes, rest) = take(rest, 2, "text length")?;
            let len = u16::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
            let (str_bytes, rest) = take(rest, len, "text body")?;
            let s = std::str::from_utf8(str_bytes)
                .map_err(|e| EngineError::WalDecode(format!("invalid utf8 in text value: {e}")))?
                .to_string();
            Ok((Value::Text(s), rest))
        }
        TAG_BOOLEAN => {
            let (raw, rest) = take(rest, 1, "boolean")?;
            Ok((Value::Boolean(raw[0] != 0), rest))
        }
        TAG_TIMESTAMP => {
            let (raw, rest) = take(rest, 8, "timestamp")?;
            let micros = i64::from_be_bytes(raw.try_into().unwrap());
            let dt = DateTime::<Utc>::from_timestamp_micros(micros)
                .ok_or_else(|| EngineError::WalDecode("timestamp out of range".into()))?;
            Ok((Value::Timestamp(dt), rest))
        }
        TAG_FLOAT => {
            let (raw, rest) = take(rest, 8, "float")?;
            let bits = u64::from_be_bytes(raw.try_into().unwrap());
            Ok((Value::Float(f64::from_bits(bits)), rest))
        }
        other => Err(EngineError::WalDecode(format!("unknown value tag {other}"))),
    }
}

fn take<'a>(bytes: &'a [u8], n: usize, what: &str) -> Result<(&'a [u8], &'a [u8]), EngineError> {
    if bytes.len() < n {
        return Err(EngineError::WalDecode(format!(
            "truncated value: needed {n} bytes for {what}, had {}",
            bytes.len()
        )));
    }
    Ok(bytes.split_at(n))
}

/// Encodes a `u16`-prefixed list of values (used for Insert/Update payloads).
pub fn encode_value_list(buf: &mut Vec<u8>, values: &[Value]) {
    assert!(values.len() <= u16::MAX as usize, "value list too long");
    buf.extend_from_slice(&(values.len() as u16).to_be_bytes());
    for v in values {
        encode_value(buf, v);
    }
}

/// Decodes a `u16`-prefixed list of values.
pub fn decode_value_list(bytes: &[u8]) -> Result<(Vec<Value>, &[u8]), EngineError> {
    let (count_bytes, mut rest) = take(bytes, 2, "value list count")?;
    let count = u16::from_be_bytes(count_bytes.try_into().unwrap()) as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let (v, r) = decode_value(rest)?;
        values.push(v);
        rest = r;
    }
    Ok((values, rest))
}

/// Encodes a `u16`-prefixed UTF-8 string (table/column/index names).
pub fn encode_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    assert!(bytes.len() <= 65_535, "string exceeds the 65535-byte wire limit");
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Decodes a `u16`-prefixed UTF-8 string.
pub fn decode_string(bytes: &[u8]) -> Result<(String, &[u8]), EngineError> {
    let (len_bytes, rest) = take(bytes, 2, "string length")?;
    let len = u16::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
    let (str_bytes, rest) = take(rest, len, "string body")?;
    let s = std::str::from_utf8(str_bytes)
        .map_err(|e| EngineError::WalDecode(format!("invalid utf8 in string: {e}")))?
        .to_string();
    Ok((s, rest))
}
