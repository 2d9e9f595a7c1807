//! InterchangeDB - A database with runtime-swappable buffer pool eviction policies.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         InterchangeDB                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Query Layer (execution/)                    │   │
//! │  │         SQL Parser → Planner → Executor                  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Transaction Layer (concurrency/)               │   │
//! │  │      TransactionManager + MVCC + ConcurrencyControl      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Index Layer (index/)  [Compile-Time Swappable]    │   │
//! │  │              B-tree  ←─OR─→  LSM-tree                    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Buffer Pool (buffer/)  [Runtime Swappable]        │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │  Eviction Policies: LRU | CLOCK | LRU-K | 2Q    │   │   │
//! │  │   │            (hot-swappable at runtime)            │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      BufferPoolManager + Frame + Statistics              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     DiskManager + Page + PageHeader + recovery/WAL       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - Index structures (B-tree)
//! - [`recovery`] - Write-ahead logging and crash recovery
//! - [`concurrency`] - Transaction management and MVCC
//! - [`execution`] - Query execution
//!
//! # Quick Start
//! ```no_run
//! use interchangedb::storage::DiskManager;
//! use interchangedb::common::PageId;
//!
//! // Create a new database file
//! let mut dm = DiskManager::create("my_database.db", 4096).unwrap();
//!
//! // Allocate and write a page
//! let page_id = dm.allocate_page().unwrap();
//! ```
//!
//! Most callers go through [`Database`] rather than the storage primitives
//! directly:
//! ```no_run
//! use interchangedb::{Database, DatabaseConfig};
//! use interchangedb::model::{Column, ColumnType, Table};
//!
//! let db = Database::open(DatabaseConfig::memory()).unwrap();
//! let table = Table::new("widgets", vec![Column::new("id", ColumnType::Int)]).unwrap();
//! db.put("acme", table).unwrap();
//! let widgets = db.get("acme", "widgets").unwrap();
//! ```

// Core modules
pub mod buffer;
pub mod common;
pub mod storage;

pub mod backend;
pub mod concurrency;
pub mod model;
pub mod recovery;

pub mod index;

mod database;

// `execution` is an integration point for the SQL parser/planner/executor
// that lives outside this crate; kept as a placeholder module so that
// collaborator crate can slot in without restructuring module paths.
pub mod execution;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DatabaseConfig, IsolationLevel, StorageMode, PAGE_SIZE};
pub use common::{Counter, Error, FrameId, Lsn, PageId, Result, Timestamp, TxnId};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use database::Database;
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;
