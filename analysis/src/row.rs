use std::cmp::Ordering;
use thiserror::Error;

/// Leading columns forming the sort key, the first one also groups the rows
pub const KEY_COLUMNS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("expected at least {expected} columns, found {0}", expected = KEY_COLUMNS)]
    TooFewColumns(usize),
    #[error("column {column} ({value:?}) is not a number")]
    NotANumber { column: usize, value: String },
}

/// Numeric value of the key columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey([f64; KEY_COLUMNS]);

impl SortKey {
    pub fn new(columns: [f64; KEY_COLUMNS]) -> Self {
        Self(columns)
    }

    pub fn columns(&self) -> &[f64; KEY_COLUMNS] {
        &self.0
    }

    /// total order over all key columns, column 0 first
    pub fn compare(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(left, right)| left.total_cmp(right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Identity of the group a row belongs to
    ///
    /// Uses the bit pattern so grouping agrees with `total_cmp` in `compare`.
    pub fn group(&self) -> u64 {
        self.0[0].to_bits()
    }
}

/// One whitespace separated line of a result dump
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    fields: Vec<String>,
    key: SortKey,
}

impl ResultRow {
    /// Parse a non-blank line; the original text of every field is kept
    pub fn parse(line: &str) -> Result<Self, RowError> {
        let fields = line
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();

        if fields.len() < KEY_COLUMNS {
            return Err(RowError::TooFewColumns(fields.len()));
        }

        let mut key = [0.0; KEY_COLUMNS];
        for (column, (slot, field)) in key.iter_mut().zip(fields.iter()).enumerate() {
            let value: f64 = field.parse().map_err(|_| RowError::NotANumber {
                column,
                value: field.clone(),
            })?;
            // -0 and 0 are the same key, total_cmp and to_bits would split them
            *slot = if value == 0.0 { 0.0 } else { value };
        }

        Ok(Self {
            fields,
            key: SortKey(key),
        })
    }

    pub fn key(&self) -> &SortKey {
        &self.key
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn render(&self) -> String {
        self.fields.join(" ")
    }
}
