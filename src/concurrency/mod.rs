//! Transaction ids, MVCC snapshots, the row-version visibility predicate,
//! and watermark-driven version-chain GC.
//!
//! - [`mvcc`] — [`MvccManager`], the component's single entry point
//! - [`transaction`] — [`TxHandle`], [`RowKey`], transaction bookkeeping
//! - [`version`] — chain GC, kept separate so it's testable without a manager
//!
//! The buffer pool and B+Tree below this module have no notion of
//! transactions; everything here operates purely on [`crate::model::Row`]
//! data handed to it by a storage backend.

mod mvcc;
mod transaction;
mod version;

pub use mvcc::MvccManager;
pub use transaction::{RowKey, TxHandle, TxState, TxStatus};
