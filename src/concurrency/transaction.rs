//! Transaction handles and the mutable state the manager tracks per
//! transaction.

use std::collections::HashSet;

use crate::common::config::IsolationLevel;
use crate::common::{Timestamp, TxnId};

/// A row's identity scoped across tenants: `(tenant, table, row id)`. Used as
/// the key for both version chains and read/write sets.
pub type RowKey = (String, String, u64);

/// Where a transaction stands relative to the commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    InProgress,
    Committed(Timestamp),
    /// Either explicitly rolled back, or a txid that was never begun — both
    /// mean "this version's creator/deleter never took effect".
    Aborted,
}

/// Immutable handle returned from `begin_tx`. Every `MvccManager` method that
/// needs to know which transaction is acting takes one of these by value.
#[derive(Debug, Clone, Copy)]
pub struct TxHandle {
    pub txid: TxnId,
    pub start_ts: Timestamp,
    pub isolation: IsolationLevel,
}

/// Read/write sets accumulated over a transaction's lifetime, consulted by
/// the serializable-conflict check at commit.
#[derive(Debug, Default, Clone)]
pub struct TxState {
    pub read_set: HashSet<RowKey>,
    pub write_set: HashSet<RowKey>,
}
