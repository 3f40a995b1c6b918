use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::row::{VoyageRow, VOYAGE_COLUMNS};

/// Append-only destination for confirmed rows.
pub trait RowSink {
    fn append(&mut self, row: &VoyageRow) -> Result<(), SinkError>;

    /// Makes every appended row durable (or at least visible to readers).
    fn flush(&mut self) -> Result<(), SinkError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create row output at {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open row input at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("row output i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("row csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

/// CSV sink writing the fixed voyage schema.
///
/// The header is written on construction, so a run that confirms no rows
/// still leaves a readable file behind.
pub struct CsvRowSink<W: Write> {
    writer: csv::Writer<W>,
    rows_written: u64,
}

impl CsvRowSink<File> {
    /// Creates (truncating) the file at `path`.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_writer(file)
    }
}

impl<W: Write> CsvRowSink<W> {
    pub fn from_writer(inner: W) -> Result<Self, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(VOYAGE_COLUMNS)?;
        writer.flush()?;
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn append(&mut self, row: &VoyageRow) -> Result<(), SinkError> {
        self.writer.serialize(row)?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink that keeps rows in memory. Used by tests and by callers that post-process
/// rows before writing them anywhere.
#[derive(Debug, Default)]
pub struct MemoryRowSink {
    rows: Vec<VoyageRow>,
    flushes: usize,
}

impl MemoryRowSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[VoyageRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<VoyageRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl RowSink for MemoryRowSink {
    fn append(&mut self, row: &VoyageRow) -> Result<(), SinkError> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}

/// Parses rows previously written by [`CsvRowSink`].
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<VoyageRow>, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn read_rows_from_path(path: &Path) -> Result<Vec<VoyageRow>, SinkError> {
    let file = File::open(path).map_err(|source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_rows(file)
}
