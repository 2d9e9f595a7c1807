//! Column schema declarations.

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Declared type of a column. Closed set, matched exactly to the value kinds
/// a [`crate::model::Value`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    Json,
    Date,
    DateTime,
    Duration,
    /// A complex number (real, imaginary), carried through unchanged from a
    /// source language with a native complex type.
    Complex,
    /// A reference to a row in another table.
    Pointer,
}

/// Constraint attached to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    None,
    PrimaryKey,
    Unique,
    ForeignKey,
}

/// Target of a foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// A single column in a table's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub constraint: ConstraintKind,
    /// Set only when `constraint == ForeignKey`.
    pub foreign_key: Option<ForeignKeyRef>,
    /// Set only when `column_type == Pointer`; names the table a pointer
    /// value in this column addresses.
    pub pointer_target: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            constraint: ConstraintKind::None,
            foreign_key: None,
            pointer_target: None,
        }
    }

    pub fn with_constraint(mut self, constraint: ConstraintKind) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.constraint = ConstraintKind::ForeignKey;
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn with_pointer_target(mut self, table: impl Into<String>) -> Self {
        self.pointer_target = Some(table.into());
        self
    }

    /// Validate that this column is internally consistent: a `ForeignKey`
    /// constraint must carry a target, and only `Pointer` columns may carry
    /// a pointer target.
    pub fn validate(&self) -> Result<()> {
        if self.constraint == ConstraintKind::ForeignKey && self.foreign_key.is_none() {
            return Err(Error::Schema(format!(
                "column '{}' declares a foreign key constraint with no target",
                self.name
            )));
        }
        if self.pointer_target.is_some() && self.column_type != ColumnType::Pointer {
            return Err(Error::Schema(format!(
                "column '{}' has a pointer target but is not a pointer column",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_roundtrip() {
        let col = Column::new("id", ColumnType::Int).with_constraint(ConstraintKind::PrimaryKey);
        assert_eq!(col.name, "id");
        assert_eq!(col.constraint, ConstraintKind::PrimaryKey);
        assert!(col.validate().is_ok());
    }

    #[test]
    fn test_foreign_key_requires_target() {
        let mut col = Column::new("owner_id", ColumnType::Int);
        col.constraint = ConstraintKind::ForeignKey;
        assert!(col.validate().is_err());

        let col = col.with_foreign_key("users", "id");
        assert!(col.validate().is_ok());
    }

    #[test]
    fn test_pointer_target_requires_pointer_type() {
        let col = Column::new("next", ColumnType::Int).with_pointer_target("nodes");
        assert!(col.validate().is_err());

        let col = Column::new("next", ColumnType::Pointer).with_pointer_target("nodes");
        assert!(col.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let col = Column::new("amount", ColumnType::Float);
        let json = serde_json::to_string(&col).unwrap();
        let back: Column = serde_json::from_str(&json).unwrap();
        assert_eq!(col, back);
    }
}
