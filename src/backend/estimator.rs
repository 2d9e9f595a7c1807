//! Per-table memory estimate, used by the hybrid backend's row cache to
//! decide when it's over budget.

use crate::model::{Cell, Column, ColumnType, Row, Table};

const TABLE_HEADER_BYTES: u64 = 128;
const JSON_CELL_BYTES: u64 = 128;
const STRING_OVERHEAD_BYTES: u64 = 16;
const SAMPLE_SIZE: usize = 32;

/// Estimates a table's resident footprint as
/// `header + (sampled row size * row count) + 10% overhead`, sampling a
/// bounded number of rows for variable-width columns rather than walking
/// every row of a large table.
pub struct Estimator;

impl Estimator {
    pub fn estimate(table: &Table) -> u64 {
        let row_count = table.row_count() as u64;
        if row_count == 0 {
            return TABLE_HEADER_BYTES;
        }

        let sample: Vec<&Row> = table.rows().take(SAMPLE_SIZE).collect();
        let sampled_bytes: u64 = sample.iter().map(|row| Self::row_size(row, table.columns())).sum();
        let avg_row_size = sampled_bytes / sample.len() as u64;

        let body = avg_row_size * row_count;
        TABLE_HEADER_BYTES + body + body / 10
    }

    fn row_size(row: &Row, columns: &[Column]) -> u64 {
        row.cells
            .iter()
            .zip(columns)
            .map(|(cell, column)| Self::cell_size(cell, column.column_type))
            .sum()
    }

    fn cell_size(cell: &Cell, column_type: ColumnType) -> u64 {
        let Some(value) = cell else {
            return 1;
        };
        match column_type {
            ColumnType::Bool => 1,
            ColumnType::Date => 4,
            ColumnType::Int | ColumnType::Float | ColumnType::Duration | ColumnType::Pointer => 8,
            ColumnType::DateTime => 12,
            ColumnType::Complex => 16,
            ColumnType::Json => JSON_CELL_BYTES,
            ColumnType::Text => match value {
                crate::model::Value::Text(s) => s.len() as u64 + STRING_OVERHEAD_BYTES,
                _ => STRING_OVERHEAD_BYTES,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_empty_table_is_just_header() {
        let t = Table::new("t", vec![Column::new("id", ColumnType::Int)]).unwrap();
        assert_eq!(Estimator::estimate(&t), TABLE_HEADER_BYTES);
    }

    #[test]
    fn test_estimate_scales_with_row_count() {
        let mut t = Table::new("t", vec![Column::new("id", ColumnType::Int)]).unwrap();
        t.insert_row(vec![Some(Value::Int(1))]).unwrap();
        let one_row = Estimator::estimate(&t);

        for i in 2..=100 {
            t.insert_row(vec![Some(Value::Int(i))]).unwrap();
        }
        let hundred_rows = Estimator::estimate(&t);
        assert!(hundred_rows > one_row * 50);
    }

    #[test]
    fn test_text_cells_grow_with_content_length() {
        let cols = vec![Column::new("name", ColumnType::Text)];
        let mut short = Table::new("t", cols.clone()).unwrap();
        short.insert_row(vec![Some(Value::Text("hi".into()))]).unwrap();

        let mut long = Table::new("t", cols).unwrap();
        long.insert_row(vec![Some(Value::Text("a".repeat(1000)))]).unwrap();

        assert!(Estimator::estimate(&long) > Estimator::estimate(&short));
    }
}
