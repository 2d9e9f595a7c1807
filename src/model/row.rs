//! Row data, cell values, and MVCC row versions.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result, Timestamp, TxnId};
use crate::model::column::{Column, ColumnType};

/// A single cell's value. `Cell` (a bare `Option<Value>`) represents the
/// nullable slot a row carries per column; `Value` is never null itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Json(serde_json::Value),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Duration(#[serde(with = "duration_millis")] chrono::Duration),
    /// A complex number, carried as (real, imaginary).
    Complex(f64, f64),
    /// A row id in the column's declared pointer target table.
    Pointer(i64),
}

impl Value {
    /// The [`ColumnType`] this value belongs to, for schema validation.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Text(_) => ColumnType::Text,
            Value::Bool(_) => ColumnType::Bool,
            Value::Json(_) => ColumnType::Json,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Duration(_) => ColumnType::Duration,
            Value::Complex(_, _) => ColumnType::Complex,
            Value::Pointer(_) => ColumnType::Pointer,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &chrono::Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<chrono::Duration, D::Error> {
        Ok(chrono::Duration::milliseconds(i64::deserialize(d)?))
    }
}

/// A nullable cell: `None` is SQL `NULL`, `Some(v)` is a typed value.
pub type Cell = Option<Value>;

/// An ordered tuple of cells matching a table's column schema, plus the
/// integer id identifying it within the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: u64,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(id: u64, cells: Vec<Cell>) -> Self {
        Self { id, cells }
    }

    /// Check that every non-null cell's type matches the corresponding
    /// column's declared type, and that the cell count matches.
    pub fn validate_against(&self, columns: &[Column]) -> Result<()> {
        if self.cells.len() != columns.len() {
            return Err(Error::Schema(format!(
                "row {} has {} cells, expected {}",
                self.id,
                self.cells.len(),
                columns.len()
            )));
        }
        for (cell, column) in self.cells.iter().zip(columns) {
            if let Some(value) = cell {
                if value.column_type() != column.column_type {
                    return Err(Error::Schema(format!(
                        "row {} column '{}' expected {:?}, got {:?}",
                        self.id,
                        column.name,
                        column.column_type,
                        value.column_type()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// An MVCC-versioned row: a row payload plus the creator/deleter
/// transaction ids and timestamps that determine its visibility, and a
/// back-pointer to the version it superseded.
///
/// `xmax`/`deleted_at` are set in place on an existing version when it's
/// deleted or superseded by an update (mirroring how a live tuple's xmax is
/// stamped rather than copied to a new tuple); `prev` is only ever set at
/// construction and never mutated afterward. The chain is ordered
/// newest-to-oldest by following `prev`.
#[derive(Debug, Clone)]
pub struct RowVersion {
    pub xmin: TxnId,
    pub xmax: Option<TxnId>,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
    pub data: Row,
    pub prev: Option<Arc<RowVersion>>,
}

impl RowVersion {
    /// A brand-new, live version created by `xmin` at `created_at`.
    pub fn new(xmin: TxnId, created_at: Timestamp, data: Row, prev: Option<Arc<RowVersion>>) -> Self {
        Self {
            xmin,
            xmax: None,
            created_at,
            deleted_at: None,
            data,
            prev,
        }
    }

    /// Whether this version has no deleter recorded, independent of whether
    /// that deleter (if any) has actually committed — full visibility needs
    /// the MVCC manager's snapshot.
    pub fn is_live(&self) -> bool {
        self.xmax.is_none()
    }

    /// Return a copy of this version with `xmax`/`deleted_at` stamped,
    /// keeping the same `data` and `prev` pointer. The caller swaps this in
    /// as the new chain head.
    pub fn mark_deleted(&self, xmax: TxnId, deleted_at: Timestamp) -> RowVersion {
        RowVersion {
            xmax: Some(xmax),
            deleted_at: Some(deleted_at),
            prev: self.prev.clone(),
            xmin: self.xmin,
            created_at: self.created_at,
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::column::ColumnType;

    fn row(cells: Vec<Cell>) -> Row {
        Row::new(1, cells)
    }

    #[test]
    fn test_value_column_type() {
        assert_eq!(Value::Int(1).column_type(), ColumnType::Int);
        assert_eq!(Value::Complex(1.0, 2.0).column_type(), ColumnType::Complex);
    }

    #[test]
    fn test_row_validate_against_matches() {
        let columns = vec![Column::new("id", ColumnType::Int), Column::new("name", ColumnType::Text)];
        let r = row(vec![Some(Value::Int(1)), Some(Value::Text("Alice".into()))]);
        assert!(r.validate_against(&columns).is_ok());
    }

    #[test]
    fn test_row_validate_against_rejects_type_mismatch() {
        let columns = vec![Column::new("id", ColumnType::Int)];
        let r = row(vec![Some(Value::Text("oops".into()))]);
        assert!(r.validate_against(&columns).is_err());
    }

    #[test]
    fn test_row_validate_allows_null() {
        let columns = vec![Column::new("id", ColumnType::Int)];
        let r = row(vec![None]);
        assert!(r.validate_against(&columns).is_ok());
    }

    #[test]
    fn test_row_validate_rejects_wrong_arity() {
        let columns = vec![Column::new("id", ColumnType::Int), Column::new("name", ColumnType::Text)];
        let r = row(vec![Some(Value::Int(1))]);
        assert!(r.validate_against(&columns).is_err());
    }

    #[test]
    fn test_row_version_chain_and_delete() {
        let r1 = Row::new(1, vec![Some(Value::Int(1))]);
        let v1 = Arc::new(RowVersion::new(TxnId::new(1), Timestamp::new(1), r1, None));
        assert!(v1.is_live());

        let deleted = v1.mark_deleted(TxnId::new(2), Timestamp::new(2));
        assert!(!deleted.is_live());
        assert_eq!(deleted.xmin, TxnId::new(1));
        assert_eq!(deleted.data, v1.data);

        let r2 = Row::new(1, vec![Some(Value::Int(2))]);
        let v2 = RowVersion::new(TxnId::new(2), Timestamp::new(2), r2, Some(Arc::new(deleted)));
        assert!(v2.prev.is_some());
        assert_eq!(v2.prev.as_ref().unwrap().xmin, TxnId::new(1));
    }

    #[test]
    fn test_duration_value_serde_roundtrip() {
        let v = Value::Duration(chrono::Duration::milliseconds(1500));
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
