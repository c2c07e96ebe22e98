//! Byte-level WAL version migration.
//!
//! Only `CreateTable` and `AddColumn` payloads carry a column shape that
//! changed across versions; every other op's payload (`Insert`, `Delete`,
//! `Update`, `DropTable`, `DropColumn`, `CreateIndex`, `DropIndex`) is
//! version-invariant and passes through each step untouched.
//!
//! Column shape by version:
//! - v1: `name, type`
//! - v2: `name, type, pk`
//! - v3: `name, type, pk, ordinal`
//! - v4: `name, type, pk, not_null, ordinal`
//!
//! `v2 -> v3` is the one step that cannot be a context-free per-entry
//! transform: assigning the right ordinal to an `AddColumn` entry requires
//! knowing how many columns that table already has, which depends on every
//! earlier entry for the same table. `migrate` threads a per-table counter
//! through that one step; every other step is a pure `(op, payload) ->
//! payload` function.

use super::{read_frame, write_header, Op, RawEntry, CURRENT_VERSION, HEADER_LEN, MAGIC};
use crate::error::EngineError;
use crate::value::{decode_string, encode_string};
use fs2::available_space;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn take(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), EngineError> {
    if bytes.len() < n {
        return Err(EngineError::WalDecode(format!(
            "truncated legacy WAL payload: needed {n} bytes, had {}",
            bytes.len()
        )));
    }
    Ok(bytes.split_at(n))
}

fn take1(bytes: &[u8]) -> Result<(u8, &[u8]), EngineError> {
    let (head, rest) = take(bytes, 1)?;
    Ok((head[0], rest))
}

fn affects_column_shape(op: u8) -> bool {
    op == Op::CreateTable.to_byte() || op == Op::AddColumn.to_byte()
}

/// Reads one v1-shaped column (`name, type`).
fn read_col_v1(bytes: &[u8]) -> Result<((String, u8), &[u8]), EngineError> {
    let (name, rest) = decode_string(bytes)?;
    let (type_byte, rest) = take1(rest)?;
    Ok(((name, type_byte), rest))
}

fn write_col_v2(buf: &mut Vec<u8>, name: &str, type_byte: u8, pk: u8) {
    encode_string(buf, name);
    buf.push(type_byte);
    buf.push(pk);
}

fn read_col_v2(bytes: &[u8]) -> Result<((String, u8, u8), &[u8]), EngineError> {
    let (name, rest) = decode_string(bytes)?;
    let (type_byte, rest) = take1(rest)?;
    let (pk, rest) = take1(rest)?;
    Ok(((name, type_byte, pk), rest))
}

fn write_col_v3(buf: &mut Vec<u8>, name: &str, type_byte: u8, pk: u8, ordinal: u16) {
    encode_string(buf, name);
    buf.push(type_byte);
    buf.push(pk);
    buf.extend_from_slice(&ordinal.to_be_bytes());
}

fn read_col_v3(bytes: &[u8]) -> Result<((String, u8, u8, u16), &[u8]), EngineError> {
    let (name, rest) = decode_string(bytes)?;
    let (type_byte, rest) = take1(rest)?;
    let (pk, rest) = take1(rest)?;
    let (ord_bytes, rest) = take(rest, 2)?;
    let ordinal = u16::from_be_bytes(ord_bytes.try_into().unwrap());
    Ok(((name, type_byte, pk, ordinal), rest))
}

fn write_col_v4(buf: &mut Vec<u8>, name: &str, type_byte: u8, pk: u8, not_null: u8, ordinal: u16) {
    encode_string(buf, name);
    buf.push(type_byte);
    buf.push(pk);
    buf.push(not_null);
    buf.extend_from_slice(&ordinal.to_be_bytes());
}

/// Inserts `pk_flag = 0` after every column's data-type byte. v1 never
/// recorded primary-key-ness, so tables migrated from v1 lose that
/// information — any `pk` constraint must be re-declared after migration.
fn migrate_v1_to_v2(op: u8, payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    if !affects_column_shape(op) {
        return Ok(payload.to_vec());
    }
    let mut buf = Vec::new();
    if op == Op::CreateTable.to_byte() {
        let (table, rest) = decode_string(payload)?;
        let (count_bytes, mut rest) = take(rest, 2)?;
        let count = u16::from_be_bytes(count_bytes.try_into().unwrap());
        encode_string(&mut buf, &table);
        buf.extend_from_slice(&count.to_be_bytes());
        for _ in 0..count {
            let ((name, type_byte), r) = read_col_v1(rest)?;
            write_col_v2(&mut buf, &name, type_byte, 0);
            rest = r;
        }
    } else {
        let (table, rest) = decode_string(payload)?;
        encode_string(&mut buf, &table);
        let ((name, type_byte), _) = read_col_v1(rest)?;
        write_col_v2(&mut buf, &name, type_byte, 0);
    }
    Ok(buf)
}

/// Inserts a sequential `ordinal: u16` per column, continuing from however
/// many columns that table already has. `next_ordinal` is reset to the
/// column count on each `CreateTable` for that table name (covering a
/// drop-and-recreate), then advanced by one per `AddColumn`.
fn migrate_v2_to_v3(
    op: u8,
    payload: &[u8],
    next_ordinal: &mut HashMap<String, u16>,
) -> Result<Vec<u8>, EngineError> {
    if !affects_column_shape(op) {
        return Ok(payload.to_vec());
    }
    let mut buf = Vec::new();
    if op == Op::CreateTable.to_byte() {
        let (table, rest) = decode_string(payload)?;
        let (count_bytes, mut rest) = take(rest, 2)?;
        let count = u16::from_be_bytes(count_bytes.try_into().unwrap());
        encode_string(&mut buf, &table);
        buf.extend_from_slice(&count.to_be_bytes());
        for ordinal in 0..count {
            let ((name, type_byte, pk), r) = read_col_v2(rest)?;
            write_col_v3(&mut buf, &name, type_byte, pk, ordinal);
            rest = r;
        }
        next_ordinal.insert(table, count);
    } else {
        let (table, rest) = decode_string(payload)?;
        let ((name, type_byte, pk), _) = read_col_v2(rest)?;
        let ordinal = *next_ordinal.get(&table).unwrap_or(&0);
        next_ordinal.insert(table.clone(), ordinal + 1);
        encode_string(&mut buf, &table);
        write_col_v3(&mut buf, &name, type_byte, pk, ordinal);
    }
    Ok(buf)
}

/// Inserts `not_null_flag = pk_flag` before the ordinal, matching
/// `ColumnDef::new`'s default of treating primary-key columns as implicitly
/// `NOT NULL` and every other migrated column as nullable.
fn migrate_v3_to_v4(op: u8, payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    if !affects_column_shape(op) {
        return Ok(payload.to_vec());
    }
    let mut buf = Vec::new();
    if op == Op::CreateTable.to_byte() {
        let (table, rest) = decode_string(payload)?;
        let (count_bytes, mut rest) = take(rest, 2)?;
        let count = u16::from_be_bytes(count_bytes.try_into().unwrap());
        encode_string(&mut buf, &table);
        buf.extend_from_slice(&count.to_be_bytes());
        for _ in 0..count {
            let ((name, type_byte, pk, ordinal), r) = read_col_v3(rest)?;
            write_col_v4(&mut buf, &name, type_byte, pk, pk, ordinal);
            rest = r;
        }
    } else {
        let (table, rest) = decode_string(payload)?;
        encode_string(&mut buf, &table);
        let ((name, type_byte, pk, ordinal), _) = read_col_v3(rest)?;
        write_col_v4(&mut buf, &name, type_byte, pk, pk, ordinal);
    }
    Ok(buf)
}

fn read_legacy_entries(file: &mut File, source_version: u16) -> Result<Vec<RawEntry>, EngineError> {
    file.seek(SeekFrom::Start(if source_version == 1 { 0 } else { HEADER_LEN }))?;
    let mut entries = Vec::new();
    while let Some(entry) = read_frame(file)? {
        entries.push(entry);
    }
    Ok(entries)
}

fn run_step(entries: Vec<RawEntry>, version: u16) -> Result<Vec<RawEntry>, EngineError> {
    match version {
        1 => entries
            .into_iter()
            .map(|e| Ok(RawEntry { op: e.op, payload: migrate_v1_to_v2(e.op, &e.payload)? }))
            .collect(),
        2 => {
            let mut next_ordinal = HashMap::new();
            entries
                .into_iter()
                .map(|e| {
                    let payload = migrate_v2_to_v3(e.op, &e.payload, &mut next_ordinal)?;
                    Ok(RawEntry { op: e.op, payload })
                })
                .collect()
        }
        3 => entries
            .into_iter()
            .map(|e| Ok(RawEntry { op: e.op, payload: migrate_v3_to_v4(e.op, &e.payload)? }))
            .collect(),
        other => Err(EngineError::WalDecode(format!("no migrator registered for WAL version {other}"))),
    }
}

fn first_unused_backup_path(path: &Path) -> PathBuf {
    let plain = backup_path(path, "bak");
    if !plain.exists() {
        return plain;
    }
    let mut n = 1u32;
    loop {
        let candidate = backup_path(path, &format!("bak.{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// `Path::with_extension` replaces rather than appends, so build the whole
/// file name by hand instead.
fn append_ext(path: &Path, suffix: &str) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("wal");
    format!("{name}.{suffix}")
}

fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut p = path.to_path_buf();
    p.set_file_name(append_ext(path, suffix));
    p
}

/// Migrates the WAL at `path` from `source_version` up to
/// [`CURRENT_VERSION`] in place: preflight free-space check, read and
/// CRC-verify every legacy entry, run the migrator chain step by step,
/// write the result to a sibling `.mig` file, rename the original aside to
/// a `.bak` (or `.bak.N`), then rename `.mig` into place. On failure after
/// the backup rename, the original is restored best-effort.
pub fn migrate(path: &Path, source_version: u16) -> Result<(), EngineError> {
    let file_size = fs::metadata(path)?.len();
    let free = available_space(path).map_err(EngineError::Io)?;
    if free < file_size.saturating_mul(2) {
        return Err(EngineError::InsufficientDiskSpace);
    }

    let mut entries = {
        let mut file = File::open(path)?;
        read_legacy_entries(&mut file, source_version)?
    };

    for version in source_version..CURRENT_VERSION {
        entries = run_step(entries, version)?;
    }

    let mig_path = backup_path(path, "mig");
    {
        let mut mig_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&mig_path)?;
        write_header(&mut mig_file, CURRENT_VERSION)?;
        for entry in &entries {
            let frame = super::encode_frame(entry.op, &entry.payload);
            mig_file.write_all(&frame)?;
        }
        mig_file.sync_all()?;
    }

    let bak_path = first_unused_backup_path(path);
    fs::rename(path, &bak_path)?;

    if let Err(e) = fs::rename(&mig_path, path) {
        let _ = fs::rename(&bak_path, path);
        let _ = fs::remove_file(&mig_path);
        return Err(EngineError::Io(e));
    }

    Ok(())
}

#[allow(dead_code)]
fn assert_magic(bytes: &[u8]) {
    debug_assert_eq!(&bytes[..4], MAGIC);
}
