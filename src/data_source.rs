//! CSV-backed variable rows for template substitution.
//!
//! Each CSV data row becomes one `VariableRow`; the run pulls rows in
//! order and wraps back to the first when they run out, so the row set is
//! a cyclic sequence. A run without a CSV uses an empty source whose rows
//! carry no columns.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when loading variable data. Load failures are
/// fatal and reported before a run starts.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Failed to read CSV data: {0}")]
    CsvReadError(#[from] csv::Error),

    #[error("Failed to open file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV has a header row but no data rows")]
    EmptyData,

    #[error("CSV has no header row")]
    NoHeaders,
}

/// One iteration's variable values, keyed by column name. Ephemeral: built
/// per pull and dropped after substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableRow {
    values: HashMap<String, String>,
}

impl VariableRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Cyclic source of `VariableRow`s loaded from CSV.
///
/// The row set is fixed for the lifetime of a run; only the cursor moves.
/// Clones share the cursor, so concurrent pulls still walk the sequence in
/// order.
///
/// # Example CSV
/// ```csv
/// id,path
/// 42,users/42
/// 43,users/43
/// ```
#[derive(Clone)]
pub struct RowSource {
    rows: Arc<Vec<VariableRow>>,
    headers: Vec<String>,
    cursor: Arc<AtomicUsize>,
}

impl RowSource {
    /// A source with no rows; every pull yields an empty `VariableRow`.
    pub fn empty() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            headers: Vec::new(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load a CSV file from the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file (header row required)
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, has no header row, or
    /// has no data rows
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DataSourceError> {
        let path = path.as_ref();
        info!(path = ?path, "Loading CSV variable file");

        let source = Self::from_reader(File::open(path)?)?;

        info!(
            path = ?path,
            rows = source.row_count(),
            columns = source.headers.len(),
            "CSV variable data loaded"
        );

        Ok(source)
    }

    /// Load CSV content from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataSourceError> {
        let mut reader = csv::Reader::from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        if headers.is_empty() {
            return Err(DataSourceError::NoHeaders);
        }

        debug!(headers = ?headers, "CSV headers loaded");

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row = VariableRow::from_pairs(
                headers
                    .iter()
                    .enumerate()
                    .filter_map(|(i, header)| {
                        record.get(i).map(|value| (header.clone(), value.to_string()))
                    }),
            );
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(DataSourceError::EmptyData);
        }

        Ok(Self {
            rows: Arc::new(rows),
            headers,
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Load CSV content from a string.
    pub fn from_string(content: &str) -> Result<Self, DataSourceError> {
        Self::from_reader(content.as_bytes())
    }

    /// Pull the next row, wrapping back to the first after the last. An
    /// empty source yields an empty row.
    pub fn next_row(&self) -> VariableRow {
        if self.rows.is_empty() {
            return VariableRow::default();
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.rows.len();
        debug!(index, row_count = self.rows.len(), "Retrieved variable row");
        self.rows[index].clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}
