//! The write-ahead log: durability and crash recovery for every backend.
//!
//! Two flavors share the framing, checksum, and checkpoint-trigger plumbing
//! in [`engine`] but differ in what they log:
//! - [`LogicalWal`] — per-transaction row diffs, for the memory and
//!   per-file-backed backends.
//! - [`PhysiologicalWal`] — full page after-images, for the paged backend.
//!
//! Both expose `log_begin`/`log_commit`/`log_abort`/`checkpoint`/
//! `should_checkpoint`/`recover`; only the mutation-logging call differs
//! (`log_insert`/`log_update`/`log_delete` vs. `log_write_page`).

mod engine;
mod logical;
mod physiological;
mod record;

pub use logical::{LogicalOp, LogicalWal};
pub use physiological::{PageWrite, PhysiologicalWal};
pub use record::{WalEntry, WalRecord};
