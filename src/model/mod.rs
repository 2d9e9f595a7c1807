//! The data model: tenants' tables, their column schemas, and row data.
//!
//! - [`column`] — [`Column`], [`ColumnType`], constraint kinds
//! - [`row`] — [`Value`]/[`Cell`], [`Row`], and the MVCC [`RowVersion`]
//! - [`table`] — [`Table`], the durable flat row store a backend persists
//!
//! Transaction-scoped version chains are layered on top of `Table` by the
//! MVCC manager; `Table` itself only ever holds the current materialized
//! row set.

pub mod column;
pub mod row;
pub mod table;

pub use column::{Column, ColumnType, ConstraintKind, ForeignKeyRef};
pub use row::{Cell, Row, RowVersion, Value};
pub use table::Table;
