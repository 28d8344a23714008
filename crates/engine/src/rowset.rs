//! Materialized SQL query results.

use duckdb::types::Value;

/// A small, fully materialized query result.
///
/// Row values are kept in column order; `columns` gives the header. Intended
/// for analysis outputs that fit comfortably in memory, not for bulk data
/// movement (that goes through datasets).
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (row, column-name). `None` when either is out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use duckdb::types::Value;

    use super::RowSet;

    #[test]
    fn lookup_by_column_name() {
        let rs = RowSet {
            columns: vec!["session_id".to_string(), "turns".to_string()],
            rows: vec![vec![Value::Text("s1".to_string()), Value::BigInt(3)]],
        };
        assert_eq!(rs.num_rows(), 1);
        assert_eq!(rs.value(0, "turns"), Some(&Value::BigInt(3)));
        assert_eq!(rs.value(0, "missing"), None);
        assert_eq!(rs.value(1, "turns"), None);
    }
}
