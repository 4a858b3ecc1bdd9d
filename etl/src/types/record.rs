use std::collections::{HashMap, HashSet};

/// One flattened item: column name to raw string value. Missing columns are nulls.
pub type Record = HashMap<String, String>;

/// Rows of one or more pages with the union of their columns.
///
/// Columns keep the order in which they were first seen. Concatenating batches behaves like an
/// outer join on column names, rows of one batch simply lack the columns only the other has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from records, collecting their columns in order of appearance.
    ///
    /// Keys of a single record have no defined order, so they are sorted per record.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut batch = RecordBatch::new();
        for record in records {
            batch.push(record);
        }

        batch
    }

    pub fn push(&mut self, record: Record) {
        let mut new_columns: Vec<&String> = record
            .keys()
            .filter(|column| !self.columns.contains(column))
            .collect();
        new_columns.sort();

        let new_columns: Vec<String> = new_columns.into_iter().cloned().collect();
        self.columns.extend(new_columns);
        self.rows.push(record);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends the rows of `other`, extending the column set with its unseen columns.
    pub fn concat(&mut self, other: RecordBatch) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }

        self.rows.extend(other.rows);
    }

    /// Keeps only the given columns, in the given order, dropping every other value.
    ///
    /// Columns that never appeared in the batch are not added.
    pub fn retain_columns(&mut self, declared: &[String]) {
        let declared_set: HashSet<&str> = declared.iter().map(String::as_str).collect();

        self.columns = declared
            .iter()
            .filter(|column| self.columns.contains(column))
            .cloned()
            .collect();

        for row in &mut self.rows {
            row.retain(|column, _| declared_set.contains(column.as_str()));
        }
    }

    /// Sets `column` to `value` on every row, overwriting existing values.
    pub fn stamp(&mut self, column: &str, value: &str) {
        if self.rows.is_empty() {
            return;
        }

        if !self.columns.iter().any(|existing| existing == column) {
            self.columns.push(column.to_string());
        }

        for row in &mut self.rows {
            row.insert(column.to_string(), value.to_string());
        }
    }

    /// Distinct non-empty values of `column`, in row order.
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let mut seen = HashSet::new();

        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|value| !value.is_empty())
            .filter(|value| seen.insert(value.as_str()))
            .cloned()
            .collect()
    }
}
