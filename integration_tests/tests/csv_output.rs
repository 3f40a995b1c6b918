mod common;

use std::fs;
use std::sync::Arc;

use common::{small_config, two_port_registry, StubSource};
use voyage_core::{RunOutcome, YieldController};
use voyage_schema::{read_rows_from_path, CsvRowSink, MemoryRowSink, VOYAGE_COLUMNS};

#[test]
fn csv_run_matches_in_memory_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("maritime_delays.csv");

    let mut controller = YieldController::new(
        Arc::new(small_config(25)),
        two_port_registry(),
        StubSource::always_valid(),
    )
    .unwrap();
    let mut sink = CsvRowSink::create(&path).unwrap();
    let summary = controller.run(&mut sink).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Done);
    drop(sink);

    let mut reference = YieldController::new(
        Arc::new(small_config(25)),
        two_port_registry(),
        StubSource::always_valid(),
    )
    .unwrap();
    let mut memory = MemoryRowSink::new();
    reference.run(&mut memory).unwrap();

    let parsed = read_rows_from_path(&path).unwrap();
    assert_eq!(parsed.len(), 25);
    assert_eq!(parsed, memory.into_rows());

    let text = fs::read_to_string(&path).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(header, VOYAGE_COLUMNS.join(","));
    for line in text.lines().skip(1) {
        assert_eq!(line.split(',').count(), VOYAGE_COLUMNS.len());
    }
}

#[test]
fn exhausted_run_leaves_a_readable_header_only_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");

    let mut controller = YieldController::new(
        Arc::new(small_config(10)),
        two_port_registry(),
        StubSource::marine_absent(),
    )
    .unwrap();
    let mut sink = CsvRowSink::create(&path).unwrap();
    let summary = controller.run(&mut sink).unwrap();
    drop(sink);

    assert_eq!(summary.outcome, RunOutcome::BudgetExhausted);
    assert!(read_rows_from_path(&path).unwrap().is_empty());
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[test]
fn existing_output_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale.csv");
    fs::write(&path, "stale,content\n1,2\n3,4\n").unwrap();

    let mut controller = YieldController::new(
        Arc::new(small_config(5)),
        two_port_registry(),
        StubSource::always_valid(),
    )
    .unwrap();
    let mut sink = CsvRowSink::create(&path).unwrap();
    controller.run(&mut sink).unwrap();
    drop(sink);

    assert_eq!(read_rows_from_path(&path).unwrap().len(), 5);
}
