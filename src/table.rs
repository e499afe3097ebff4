//! Time-indexed feature table
//!
//! Rows are retained epochs indexed by their start time (milliseconds since
//! the Unix epoch), columns are named feature series. Missing values are NaN.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;

use crate::error::{PipelineError, Result};
use crate::types::{FeatureSeries, ValueKind};

/// Feature series joined on epoch start time
///
/// Every column holds exactly one value per index entry; deserialized tables
/// are checked the same way as tables built with [`FeatureTable::push_column`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableParts")]
pub struct FeatureTable {
    index: Vec<i64>,
    columns: Vec<FeatureSeries>,
}

#[derive(Deserialize)]
struct TableParts {
    index: Vec<i64>,
    columns: Vec<FeatureSeries>,
}

impl TryFrom<TableParts> for FeatureTable {
    type Error = PipelineError;

    fn try_from(parts: TableParts) -> Result<Self> {
        let mut table = Self::with_index(parts.index);
        for column in parts.columns {
            table.push_column(column)?;
        }
        Ok(table)
    }
}

impl FeatureTable {
    /// Table with an index and no columns
    pub fn with_index(index: Vec<i64>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Join series by position; shorter series are padded with NaN.
    ///
    /// The index must provide exactly one timestamp per resulting row.
    pub fn from_series(index: Vec<i64>, series: Vec<FeatureSeries>) -> Result<Self> {
        let rows = series.iter().map(FeatureSeries::len).max().unwrap_or(index.len());
        if index.len() != rows {
            return Err(PipelineError::Shape(format!(
                "{} timestamps for {} feature rows",
                index.len(),
                rows
            )));
        }

        let mut table = Self::with_index(index);
        for mut s in series {
            s.values.resize(rows, f64::NAN);
            table.push_column(s)?;
        }
        Ok(table)
    }

    /// Append a column with one value per row
    pub fn push_column(&mut self, series: FeatureSeries) -> Result<()> {
        if series.len() != self.n_rows() {
            return Err(PipelineError::Shape(format!(
                "column {} has {} values for {} rows",
                series.name,
                series.len(),
                self.n_rows()
            )));
        }
        if self.column(&series.name).is_some() {
            return Err(PipelineError::Configuration(format!(
                "duplicate column name {}",
                series.name
            )));
        }
        self.columns.push(series);
        Ok(())
    }

    /// Epoch start times in milliseconds
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Epoch start times as UTC datetimes
    pub fn timestamps(&self) -> Vec<Option<DateTime<Utc>>> {
        self.index
            .iter()
            .map(|&ms| DateTime::<Utc>::from_timestamp_millis(ms))
            .collect()
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[FeatureSeries] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&FeatureSeries> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [FeatureSeries] {
        &mut self.columns
    }

    /// Remove a column by name, returning it
    pub(crate) fn take_column(&mut self, name: &str) -> Option<FeatureSeries> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(position))
    }

    /// Column lookup failing with `MissingColumn`
    pub fn series(&self, name: &str) -> Result<&FeatureSeries> {
        self.column(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    /// True when any column of `row` holds a missing value
    pub fn row_has_missing(&self, row: usize) -> bool {
        self.columns.iter().any(|c| c.values[row].is_nan())
    }

    /// Keep the rows for which `keep(row)` is true
    pub fn filter_rows<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        self.select_rows(&(0..self.n_rows()).filter(|&r| keep(r)).collect::<Vec<_>>())
    }

    /// New table made of `rows`, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureSeries {
                    name: c.name.clone(),
                    values: rows.iter().map(|&r| c.values[r]).collect(),
                    kind: c.kind,
                    unit: c.unit.clone(),
                })
                .collect(),
        }
    }

    /// Sort rows by index and keep the first row of every duplicated
    /// timestamp; with `drop_missing`, rows holding any NaN are removed first.
    pub fn sort_dedupe(&self, drop_missing: bool) -> Self {
        let mut rows: Vec<usize> = (0..self.n_rows())
            .filter(|&r| !(drop_missing && self.row_has_missing(r)))
            .collect();
        rows.sort_by_key(|&r| self.index[r]);

        let mut seen = HashSet::with_capacity(rows.len());
        rows.retain(|&r| seen.insert(self.index[r]));
        self.select_rows(&rows)
    }

    /// True when every timestamp is greater than the previous one
    pub fn is_strictly_increasing(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }

    /// Write the table as comma-separated text with a `timestamp` column
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut header = vec!["timestamp".to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        writeln!(writer, "{}", header.join(","))?;

        for (row, &ms) in self.index.iter().enumerate() {
            let mut fields = Vec::with_capacity(self.columns.len() + 1);
            fields.push(format_timestamp(ms));
            for column in &self.columns {
                fields.push(format_value(column.values[row], column.kind));
            }
            writeln!(writer, "{}", fields.join(","))?;
        }
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PipelineError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn format_timestamp(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

fn format_value(value: f64, kind: ValueKind) -> String {
    if value.is_nan() {
        return String::new();
    }
    match kind {
        ValueKind::Integer => format!("{}", value as i64),
        ValueKind::Float => format!("{}", value),
    }
}
