//! Binary write-ahead log: framed entry stream, versioned header, CRC
//! integrity, version detection, and migration.
//!
//! File layout: a 6-byte header `["MWAL"][version: u16 BE]`, followed by a
//! sequence of framed entries:
//!
//! ```text
//! [total_len: u32 BE][op: u8][payload: total_len-9 bytes][crc32: u32 BE]
//! ```
//!
//! `total_len` counts itself plus `op` plus `payload` plus the trailing CRC.
//! The CRC is IEEE CRC-32 over `op ++ payload`. The framing format itself is
//! stable across WAL versions — only payload layout (`payload` module)
//! evolves, which is why migration rewrites payloads but never frames.

pub mod migration;
pub mod payload;
pub mod replay;

use crate::error::EngineError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"MWAL";
pub const CURRENT_VERSION: u16 = 4;
pub const HEADER_LEN: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    CreateTable = 1,
    DropTable = 2,
    Insert = 3,
    Delete = 4,
    Update = 5,
    AddColumn = 6,
    DropColumn = 7,
    CreateIndex = 8,
    DropIndex = 9,
}

impl Op {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Op::CreateTable,
            2 => Op::DropTable,
            3 => Op::Insert,
            4 => Op::Delete,
            5 => Op::Update,
            6 => Op::AddColumn,
            7 => Op::DropColumn,
            8 => Op::CreateIndex,
            9 => Op::DropIndex,
            _ => return None,
        })
    }
}

/// One decoded (but not yet interpreted) WAL entry.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub op: u8,
    pub payload: Vec<u8>,
}

fn crc32_of(op: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[op]);
    hasher.update(payload);
    hasher.finalize()
}

/// Frames `op`/`payload` into the on-disk entry representation.
pub fn encode_frame(op: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = 4 + 1 + payload.len() + 4;
    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(&(total_len as u32).to_be_bytes());
    buf.push(op);
    buf.extend_from_slice(payload);
    let crc = crc32_of(op, payload);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Reads one frame from `reader`. `Ok(None)` is a clean EOF exactly at a
/// frame boundary; anything else short of a full, CRC-valid frame is an
/// error.
pub fn read_frame(reader: &mut impl Read) -> Result<Option<RawEntry>, EngineError> {
    let mut len_bytes = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_bytes)? {
        FillResult::Eof => return Ok(None),
        FillResult::Short => {
            return Err(EngineError::WalShortFrame { total_len: 0 });
        }
        FillResult::Full => {}
    }
    let total_len = u32::from_be_bytes(len_bytes);
    if total_len < 9 {
        return Err(EngineError::WalShortFrame { total_len });
    }
    let remaining = total_len as usize - 4;
    let mut rest = vec![0u8; remaining];
    reader
        .read_exact(&mut rest)
        .map_err(|_| EngineError::WalShortFrame { total_len })?;

    let op = rest[0];
    let body_len = remaining - 1 - 4;
    let payload = rest[1..1 + body_len].to_vec();
    let crc_bytes: [u8; 4] = rest[1 + body_len..].try_into().unwrap();
    let stored_crc = u32::from_be_bytes(crc_bytes);
    let computed = crc32_of(op, &payload);
    if stored_crc != computed {
        return Err(EngineError::WalCrcMismatch { offset: 0 });
    }
    Ok(Some(RawEntry { op, payload }))
}

enum FillResult {
    Full,
    Short,
    Eof,
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<FillResult, EngineError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 { FillResult::Eof } else { FillResult::Short });
            }
            Ok(n) => filled += n,
            Err(e) => return Err(EngineError::Io(e)),
        }
    }
    Ok(FillResult::Full)
}

/// A handle on the append side of an opened WAL file, positioned at the
/// current end of the entry stream.
pub struct WalWriter {
    file: File,
}

impl WalWriter {
    /// Appends one framed entry and `fsync`s before returning. A crash
    /// after the fsync but before the in-memory apply is recovered by
    /// replay on the next open; a crash mid-frame leaves a torn suffix that
    /// the reader detects as a short read or CRC mismatch.
    pub fn append(&mut self, op: Op, payload: &[u8]) -> Result<(), EngineError> {
        let frame = encode_frame(op.to_byte(), payload);
        self.file.write_all(&frame).map_err(EngineError::Io)?;
        self.file.sync_all().map_err(EngineError::Io)?;
        Ok(())
    }

    /// Flushes any OS-buffered writes. Every `append` already fsyncs before
    /// returning, so this exists only so `Engine::close` has something
    /// explicit to call.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.file.sync_all().map_err(EngineError::Io)
    }
}

/// Outcome of opening a WAL file: the ready-to-append writer, plus every
/// entry already on disk (already normalized to the current payload
/// format — older entries went through [`migration`] first).
pub struct OpenedWal {
    pub writer: WalWriter,
    pub entries: Vec<RawEntry>,
}

/// Opens (or creates) the WAL at `path`. `allow_migrate` governs whether an
/// older-version file is migrated in place or rejected with
/// `MigrationNeeded`.
pub fn open(path: &Path, allow_migrate: bool) -> Result<OpenedWal, EngineError> {
    let existed = path.exists() && std::fs::metadata(path)?.len() > 0;

    if !existed {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        write_header(&mut file, CURRENT_VERSION)?;
        file.sync_all()?;
        return Ok(OpenedWal {
            writer: WalWriter { file },
            entries: Vec::new(),
        });
    }

    let detected_version = {
        let mut probe = File::open(path)?;
        detect_version(&mut probe)?
    };

    if detected_version > CURRENT_VERSION {
        return Err(EngineError::FutureVersion {
            found: detected_version,
            current: CURRENT_VERSION,
        });
    }

    if detected_version < CURRENT_VERSION {
        if !allow_migrate {
            return Err(EngineError::MigrationNeeded {
                current: detected_version,
                required: CURRENT_VERSION,
            });
        }
        migration::migrate(path, detected_version)?;
    }

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(HEADER_LEN))?;
    let mut entries = Vec::new();
    loop {
        match read_frame(&mut file)? {
            Some(entry) => entries.push(entry),
            None => break,
        }
    }
    file.seek(SeekFrom::End(0))?;
    Ok(OpenedWal {
        writer: WalWriter { file },
        entries,
    })
}

/// Detects the version of an existing, non-empty WAL file without
/// consuming it for replay. A file not starting with `"MWAL"` is legacy
/// version 1 (headerless).
pub fn detect_version(file: &mut File) -> Result<u16, EngineError> {
    file.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 4];
    let n = read_some(file, &mut magic)?;
    if n < 4 || &magic != MAGIC {
        return Ok(1);
    }
    let mut version_bytes = [0u8; 2];
    file.read_exact(&mut version_bytes)
        .map_err(|_| EngineError::WalDecode("truncated WAL header".into()))?;
    Ok(u16::from_be_bytes(version_bytes))
}

fn read_some(file: &mut File, buf: &mut [u8]) -> Result<usize, EngineError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

pub fn write_header(file: &mut File, version: u16) -> Result<(), EngineError> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(MAGIC)?;
    file.write_all(&version.to_be_bytes())?;
    Ok(())
}
