use thiserror::Error;

/// Errors surfaced by the storage engine, its WAL, and the in-memory catalog/heap.
///
/// Kinds map 1:1 onto the taxonomy the upstream wire layer translates into
/// SQLSTATE codes; this crate only carries the structured fields, not the
/// mapping itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    #[error("column already exists: {table}.{column}")]
    ColumnExists { table: String, column: String },

    #[error("index already exists: {table}.{index}")]
    IndexExists { table: String, index: String },

    #[error("index not found: {table}.{index}")]
    IndexNotFound { table: String, index: String },

    #[error("value count mismatch: expected {expected}, got {got}")]
    ValueCount { expected: usize, got: usize },

    #[error("cannot drop primary key column: {table}.{column}")]
    CannotDropPk { table: String, column: String },

    #[error("cannot drop the last remaining column: {table}.{column}")]
    CannotDropLastColumn { table: String, column: String },

    #[error("unique constraint violated on {table}.{column}{}", value.as_ref().map(|v| format!(" (value {v})")).unwrap_or_default())]
    UniqueViolation {
        table: String,
        column: String,
        value: Option<String>,
        index: Option<String>,
    },

    #[error("NOT NULL constraint violated on {table}.{column}")]
    NotNullViolation { table: String, column: String },

    #[error("type mismatch on column {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("invalid timestamp literal: {input}")]
    BadTimestamp { input: String },

    #[error("WAL I/O error: {0}")]
    WalIo(String),

    #[error("WAL frame too short (total_len={total_len} < 9)")]
    WalShortFrame { total_len: u32 },

    #[error("WAL CRC mismatch at offset {offset}")]
    WalCrcMismatch { offset: u64 },

    #[error("WAL unknown op code {op} at offset {offset}")]
    WalUnknownOp { op: u8, offset: u64 },

    #[error("WAL decode error: {0}")]
    WalDecode(String),

    #[error("WAL migration required: current={current}, required={required}")]
    MigrationNeeded { current: u16, required: u16 },

    #[error("WAL file has unsupported future version {found} (supported up to {current})")]
    FutureVersion { found: u16, current: u16 },

    #[error("insufficient free disk space to migrate WAL")]
    InsufficientDiskSpace,
}

pub type EngineResult<T> = Result<T, EngineError>;
