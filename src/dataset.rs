//! In-memory tabular dataset.
//!
//! [`TabularDataset`] is an ordered table of nullable [`Value`] cells with
//! named columns. Raw inputs are read with every cell as text; reshapers cast
//! the columns they consume. Row order is always the input order, which the
//! deduplication policies ("keep first") depend on.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::{ColumnType, Value, coerce_value},
    error::PipelineError,
    io_utils,
};

pub type Row = Vec<Option<Value>>;

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TabularDataset {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: Vec<S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<S: Into<String>>(
        name: impl Into<String>,
        columns: Vec<S>,
        rows: Vec<Row>,
    ) -> Result<Self> {
        let mut dataset = Self::new(name, columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Reads a delimited file with a header row. Every non-empty cell is kept
    /// as text; empty cells are null.
    pub fn load(path: &Path, options: &ReadOptions) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, options.encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut dataset = Self::new(name, headers);
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
            let decoded = io_utils::decode_record(&record, options.encoding)?;
            let row = decoded
                .into_iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        None
                    } else {
                        Some(Value::Text(cell))
                    }
                })
                .collect();
            dataset.rows.push(row);
        }
        debug!(
            "Loaded {} row(s) x {} column(s) from {:?}",
            dataset.rows.len(),
            dataset.columns.len(),
            path
        );
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, PipelineError> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                dataset: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>, PipelineError> {
        names.iter().map(|name| self.require_column(name)).collect()
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "Row has {} cell(s) but dataset '{}' has {} column(s)",
            row.len(),
            self.name,
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Iterates over one column's cells in row order.
    pub fn column_values<'a>(
        &'a self,
        column: &str,
    ) -> Result<impl Iterator<Item = Option<&'a Value>> + 'a, PipelineError> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(move |row| row[idx].as_ref()))
    }

    /// Re-types the named columns, failing on the first unparseable cell.
    pub fn cast(mut self, columns: &[(&str, ColumnType)]) -> Result<Self> {
        for (column, ty) in columns {
            let idx = self.require_column(column)?;
            for (row_idx, row) in self.rows.iter_mut().enumerate() {
                if let Some(value) = row[idx].take() {
                    row[idx] = coerce_value(&value, *ty).with_context(|| {
                        format!(
                            "Dataset '{}' row {} column '{}'",
                            self.name,
                            row_idx + 1,
                            column
                        )
                    })?;
                }
            }
        }
        Ok(self)
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>, Vec<Row>) {
        (self.name, self.columns, self.rows)
    }

    pub(crate) fn from_parts(name: String, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name,
            columns,
            rows,
        }
    }

    /// Writes the dataset as a header-first CSV file. Null cells render as
    /// empty fields. Returns the number of data rows written.
    pub fn write_csv(&self, path: &Path) -> Result<usize> {
        let mut writer = io_utils::open_csv_writer(path)?;
        writer
            .write_record(&self.columns)
            .with_context(|| format!("Writing headers to {path:?}"))?;
        for (row_idx, row) in self.rows.iter().enumerate() {
            let cells = row
                .iter()
                .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default());
            writer
                .write_record(cells)
                .with_context(|| format!("Writing row {} to {path:?}", row_idx + 2))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {path:?}"))?;
        Ok(self.rows.len())
    }

    /// Renders rows as display strings for console output.
    pub fn display_rows(&self, limit: Option<usize>) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Convenience for tests and fixed enumerations.
pub fn text(value: &str) -> Option<Value> {
    Some(Value::Text(value.to_string()))
}

pub fn int(value: i64) -> Option<Value> {
    Some(Value::Integer(value))
}

pub fn float(value: f64) -> Option<Value> {
    Some(Value::Float(value))
}
