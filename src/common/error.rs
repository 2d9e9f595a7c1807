//! Error types for InterchangeDB.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in InterchangeDB.
///
/// Low-level buffer-pool errors (`PageNotFound`, `NoFreeFrames`, ...) sit
/// alongside the engine-level kinds from the error-handling design: table and
/// transaction errors are returned to the executor, page/WAL corruption is
/// fatal to the operation but recoverable across restarts.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    /// The provided page ID is invalid (e.g., exceeds max pages).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// Buffer pool is at maximum capacity.
    #[error("buffer pool is full")]
    BufferPoolFull,

    /// Attempted to unpin a page that wasn't pinned.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),

    /// Page checksum did not match its stored CRC.
    #[error("page {0} failed CRC verification")]
    PageCorrupt(u32),

    /// WAL record checksum mismatch; recovery truncates at the last good offset.
    #[error("WAL corrupt at offset {0}")]
    WalCorrupt(u64),

    /// `(tenant, table)` pair requested by `get`/`drop` does not exist.
    #[error("table '{tenant}.{table}' not found")]
    TableNotFound { tenant: String, table: String },

    /// `put` called for a table that already exists.
    #[error("table '{tenant}.{table}' already exists")]
    TableExists { tenant: String, table: String },

    /// Commit or abort issued against a transaction that already finished.
    #[error("transaction {0} is not active")]
    TxNotActive(u64),

    /// Serializable-isolation commit conflict; caller may retry.
    #[error("serialization conflict, transaction must retry")]
    Serialization,

    /// Update/delete referenced a row id that does not exist.
    #[error("row {0} not found")]
    RowNotFound(u64),

    /// Buffer-pool insertion exceeded the configured memory budget with
    /// eviction disabled (or no evictable victim existed).
    #[error("memory limit exceeded ({used} > {budget} bytes)")]
    MemoryLimit { used: u64, budget: u64 },

    /// Worker-pool submission was rejected because the queue stayed full
    /// past the submission timeout.
    #[error("worker queue full")]
    QueueFull,

    /// Column, table, or schema declaration was malformed.
    #[error("schema error: {0}")]
    Schema(String),

    /// (De)serialization of a row, table, or WAL record failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
