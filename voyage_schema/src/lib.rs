//! Row contract shared by the dataset pipeline and its consumers.
//!
//! A [`VoyageRow`] is the finished, immutable output record of the
//! guaranteed-yield pipeline. Rows are handed to a [`RowSink`]; the CSV sink
//! writes the fixed 19-column schema consumed by the training scripts.

mod row;
mod sink;

pub use row::{Season, VoyageRow, VOYAGE_COLUMNS};
pub use sink::{read_rows, read_rows_from_path, CsvRowSink, MemoryRowSink, RowSink, SinkError};
