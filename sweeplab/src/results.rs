// src/results.rs
//
// Results file: CSV, one row appended per completed run.
//
// Header: `experiment_index,<metric columns...>`, fixed per batch. Every
// append writes one complete row, flushes it and syncs it to disk before
// returning, so the file is loadable after any prefix of rows.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::ResultsError;
use crate::report::MetricRecord;
use crate::sweep::EXPERIMENT_INDEX;

/// Append-only results file writer.
pub struct ResultsWriter {
    path: PathBuf,
    columns: Vec<String>,
    writer: csv::Writer<File>,
}

impl ResultsWriter {
    /// Create (truncate) the results file and write the header.
    pub fn create<P: AsRef<Path>>(path: P, columns: &[String]) -> Result<Self, ResultsError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| io_err(&path, e))?;
        let mut out = Self::wrap(path, columns, file);
        let header = out.header();
        out.write_row(&header)?;
        Ok(out)
    }

    /// Reopen an existing results file for appending (resume).
    ///
    /// The existing header must match exactly; a missing file is created.
    pub fn open_append<P: AsRef<Path>>(path: P, columns: &[String]) -> Result<Self, ResultsError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Self::create(&path, columns);
        }

        let found = read_header(&path)?;
        let mut expected = vec![EXPERIMENT_INDEX.to_string()];
        expected.extend(columns.iter().cloned());
        if found != expected {
            return Err(ResultsError::HeaderMismatch {
                path: path.display().to_string(),
                expected,
                found,
            });
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        Ok(Self::wrap(path, columns, file))
    }

    fn wrap(path: PathBuf, columns: &[String], file: File) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        Self {
            path,
            columns: columns.to_vec(),
            writer,
        }
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec![EXPERIMENT_INDEX.to_string()];
        header.extend(self.columns.iter().cloned());
        header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append one run's metrics.
    ///
    /// The record's columns must equal the file's columns; otherwise nothing
    /// is written.
    pub fn append(&mut self, experiment_index: usize, record: &MetricRecord) -> Result<(), ResultsError> {
        if !record.columns().eq(self.columns.iter().map(String::as_str)) {
            return Err(ResultsError::ColumnMismatch {
                expected: self.columns.clone(),
                found: record.columns().map(str::to_string).collect(),
            });
        }

        let mut row = Vec::with_capacity(record.len() + 1);
        row.push(experiment_index.to_string());
        row.extend(record.entries().iter().map(|(_, v)| v.to_string()));
        self.write_row(&row)
    }

    fn write_row(&mut self, row: &[String]) -> Result<(), ResultsError> {
        self.writer.write_record(row)?;
        self.writer.flush().map_err(|e| io_err(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn read_header(path: &Path) -> Result<Vec<String>, ResultsError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|e| io_err(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(first.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Load every row of a results file.
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<(usize, MetricRecord)>, ResultsError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();

    if headers.get(0) != Some(EXPERIMENT_INDEX) {
        return Err(ResultsError::MalformedRow {
            row: 0,
            message: format!("first column must be '{}'", EXPERIMENT_INDEX),
        });
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row_no = i + 1;
        let index = record
            .get(0)
            .and_then(|c| c.parse::<usize>().ok())
            .ok_or_else(|| ResultsError::MalformedRow {
                row: row_no,
                message: "experiment_index is not an integer".to_string(),
            })?;

        let mut entries = Vec::with_capacity(headers.len() - 1);
        for (name, cell) in headers.iter().zip(record.iter()).skip(1) {
            let value = cell.parse::<f64>().map_err(|_| ResultsError::MalformedRow {
                row: row_no,
                message: format!("column '{}' value '{}' is not a number", name, cell),
            })?;
            entries.push((name.to_string(), value));
        }
        rows.push((index, MetricRecord::new(entries)));
    }
    Ok(rows)
}

fn io_err(path: &Path, source: std::io::Error) -> ResultsError {
    ResultsError::Io {
        path: path.display().to_string(),
        source,
    }
}
