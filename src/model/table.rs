//! Table schema and materialized row storage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::model::column::Column;
use crate::model::row::{Cell, Row};

/// A named collection of rows sharing a column schema.
///
/// `Table` holds the durable, flat view of a table's rows — what a backend
/// persists and reloads. Transaction-scoped version chains are layered on
/// top by the MVCC manager, keyed by `(table name, row id)`; `Table` itself
/// has no notion of `xmin`/`xmax`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    /// Bumped on every mutation; backends use this to detect a table needs
    /// re-saving without a byte-for-byte comparison.
    version: u64,
    /// Excluded from persistence when set.
    temporary: bool,
    rows: HashMap<u64, Row>,
    next_row_id: u64,
}

impl Table {
    /// Create an empty table. Column names must be unique, case-insensitive.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            column.validate()?;
            if !seen.insert(column.name.to_lowercase()) {
                return Err(Error::Schema(format!(
                    "table '{}' declares column '{}' more than once",
                    name, column.name
                )));
            }
        }
        Ok(Self {
            name,
            columns,
            version: 0,
            temporary: false,
            rows: HashMap::new(),
            next_row_id: 1,
        })
    }

    /// Reconstruct a table from its stored parts, preserving row ids and the
    /// row-id counter exactly as a backend persisted them. Skips the
    /// `new`/`insert_row` path, which would reassign ids instead of
    /// restoring them.
    pub fn from_parts(
        name: impl Into<String>,
        columns: Vec<Column>,
        rows: HashMap<u64, Row>,
        next_row_id: u64,
        version: u64,
        temporary: bool,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            version,
            temporary,
            rows,
            next_row_id,
        }
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn next_row_id(&self) -> u64 {
        self.next_row_id
    }

    /// Case-insensitive column lookup, matching the schema invariant that
    /// column names are unique up to case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.columns.iter().position(|c| c.name.to_lowercase() == lower)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get_row(&self, id: u64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn row_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Insert a new row, assigning it the next row id. Returns the assigned
    /// id.
    pub fn insert_row(&mut self, cells: Vec<Cell>) -> Result<u64> {
        let id = self.next_row_id;
        let row = Row::new(id, cells);
        row.validate_against(&self.columns)?;
        self.rows.insert(id, row);
        self.next_row_id += 1;
        self.version += 1;
        Ok(id)
    }

    /// Overwrite an existing row's cells in place.
    pub fn update_row(&mut self, id: u64, cells: Vec<Cell>) -> Result<()> {
        if !self.rows.contains_key(&id) {
            return Err(Error::RowNotFound(id));
        }
        let row = Row::new(id, cells);
        row.validate_against(&self.columns)?;
        self.rows.insert(id, row);
        self.version += 1;
        Ok(())
    }

    pub fn delete_row(&mut self, id: u64) -> Result<()> {
        if self.rows.remove(&id).is_none() {
            return Err(Error::RowNotFound(id));
        }
        self.version += 1;
        Ok(())
    }

    /// Insert or overwrite a row at its own id, rather than assigning the
    /// next one, advancing `next_row_id` past it if needed. Used to replay a
    /// previously assigned id — from a WAL record or a reloaded backend —
    /// without perturbing the id sequence.
    pub fn put_row(&mut self, row: Row) {
        self.next_row_id = self.next_row_id.max(row.id + 1);
        self.rows.insert(row.id, row);
        self.version += 1;
    }
}
