//! Tabular source and sink interfaces.
//!
//! The warehouse services themselves are external collaborators; only their
//! interfaces live here. `RecordSource` answers the two named queries the
//! builder stage needs, `ResultSink` appends result rows to a named table.
//! File-backed implementations serve the stage binaries, in-memory ones the
//! tests.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::corpus::{DatasetRecord, parse_dataset, parse_vocabulary};
use crate::errors::PipelineError;
use crate::results::{TopicAssignment, render_table};
use crate::types::{TableName, Token};

/// Source of the two builder queries: the full token vocabulary and the
/// per-record token fields.
pub trait RecordSource: Send + Sync {
    /// All vocabulary tokens, in source row order.
    fn vocabulary(&self) -> Result<Vec<Token>, PipelineError>;
    /// All dataset records, in source row order.
    fn dataset(&self) -> Result<Vec<DatasetRecord>, PipelineError>;
}

/// Append-only destination table for topic assignments.
///
/// Append semantics are deliberate: re-publishing the same artifact appends
/// its rows again; deduplication is the external scheduler's concern.
pub trait ResultSink: Send + Sync {
    /// Append `rows` to `table`, returning the number of rows written.
    fn append(&self, table: &str, rows: &[TopicAssignment]) -> Result<usize, PipelineError>;
}

impl<T: RecordSource + ?Sized> RecordSource for std::sync::Arc<T> {
    fn vocabulary(&self) -> Result<Vec<Token>, PipelineError> {
        (**self).vocabulary()
    }

    fn dataset(&self) -> Result<Vec<DatasetRecord>, PipelineError> {
        (**self).dataset()
    }
}

impl<T: ResultSink + ?Sized> ResultSink for std::sync::Arc<T> {
    fn append(&self, table: &str, rows: &[TopicAssignment]) -> Result<usize, PipelineError> {
        (**self).append(table, rows)
    }
}

/// In-memory source preloaded with query results.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordSource {
    vocabulary: Vec<Token>,
    dataset: Vec<DatasetRecord>,
}

impl MemoryRecordSource {
    /// Source answering the two queries from fixed data.
    pub fn new(vocabulary: Vec<Token>, dataset: Vec<DatasetRecord>) -> Self {
        Self {
            vocabulary,
            dataset,
        }
    }
}

impl RecordSource for MemoryRecordSource {
    fn vocabulary(&self) -> Result<Vec<Token>, PipelineError> {
        Ok(self.vocabulary.clone())
    }

    fn dataset(&self) -> Result<Vec<DatasetRecord>, PipelineError> {
        Ok(self.dataset.clone())
    }
}

/// Source reading both queries from local CSV exports.
pub struct CsvRecordSource {
    vocabulary_path: PathBuf,
    dataset_path: PathBuf,
}

impl CsvRecordSource {
    /// Source backed by a one-column vocabulary CSV and an `id,fields...`
    /// dataset CSV.
    pub fn new(vocabulary_path: impl Into<PathBuf>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            vocabulary_path: vocabulary_path.into(),
            dataset_path: dataset_path.into(),
        }
    }
}

impl RecordSource for CsvRecordSource {
    fn vocabulary(&self) -> Result<Vec<Token>, PipelineError> {
        let bytes = fs::read(&self.vocabulary_path).map_err(|err| PipelineError::Source {
            query: self.vocabulary_path.display().to_string(),
            reason: err.to_string(),
        })?;
        parse_vocabulary(&bytes)
    }

    fn dataset(&self) -> Result<Vec<DatasetRecord>, PipelineError> {
        let bytes = fs::read(&self.dataset_path).map_err(|err| PipelineError::Source {
            query: self.dataset_path.display().to_string(),
            reason: err.to_string(),
        })?;
        parse_dataset(&bytes)
    }
}

/// In-memory sink collecting appended rows per table.
#[derive(Default)]
pub struct MemoryResultSink {
    tables: RwLock<HashMap<TableName, Vec<TopicAssignment>>>,
}

impl MemoryResultSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows appended to `table` so far, in append order.
    pub fn rows(&self, table: &str) -> Vec<TopicAssignment> {
        self.tables
            .read()
            .expect("result sink poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

impl ResultSink for MemoryResultSink {
    fn append(&self, table: &str, rows: &[TopicAssignment]) -> Result<usize, PipelineError> {
        let mut tables = self.tables.write().expect("result sink poisoned");
        tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len())
    }
}

/// Sink appending rows to one CSV file per table under a directory.
pub struct CsvResultSink {
    dir: PathBuf,
}

impl CsvResultSink {
    /// Sink writing `<dir>/<table>.csv` files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResultSink for CsvResultSink {
    fn append(&self, table: &str, rows: &[TopicAssignment]) -> Result<usize, PipelineError> {
        let sink_err = |reason: String| PipelineError::Sink {
            table: table.to_string(),
            reason,
        };
        fs::create_dir_all(&self.dir).map_err(|err| sink_err(err.to_string()))?;
        let rendered = render_table(rows)?;
        let path = self.dir.join(format!("{table}.csv"));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| sink_err(err.to_string()))?;
        file.write_all(rendered.as_bytes())
            .map_err(|err| sink_err(err.to_string()))?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn row(id: &str) -> TopicAssignment {
        TopicAssignment {
            date: NaiveDate::from_ymd_opt(2026, 8, 4).unwrap(),
            id: id.to_string(),
            fields: vec!["alpha".to_string()],
            topics: vec![1.0],
            execution_time: "2026-08-05 09:00:00".to_string(),
            pipeline_version: "v1".to_string(),
        }
    }

    #[test]
    fn memory_sink_appends_without_deduplication() {
        let sink = MemoryResultSink::new();
        sink.append("TOPIC_TRY", &[row("1")]).unwrap();
        sink.append("TOPIC_TRY", &[row("1")]).unwrap();
        assert_eq!(sink.rows("TOPIC_TRY").len(), 2);
    }

    #[test]
    fn csv_sink_appends_across_calls() {
        let dir = tempdir().unwrap();
        let sink = CsvResultSink::new(dir.path());
        sink.append("TOPIC_TRY", &[row("1")]).unwrap();
        sink.append("TOPIC_TRY", &[row("2")]).unwrap();
        let contents = fs::read_to_string(dir.path().join("TOPIC_TRY.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn csv_source_reads_both_queries() {
        let dir = tempdir().unwrap();
        let vocab = dir.path().join("vocab.csv");
        let dataset = dir.path().join("dataset.csv");
        fs::write(&vocab, "alpha\nbeta\n").unwrap();
        fs::write(&dataset, "1,alpha,beta\n").unwrap();

        let source = CsvRecordSource::new(&vocab, &dataset);
        assert_eq!(source.vocabulary().unwrap(), vec!["alpha", "beta"]);
        assert_eq!(
            source.dataset().unwrap(),
            vec![DatasetRecord {
                id: "1".to_string(),
                fields: vec!["alpha".to_string(), "beta".to_string()],
            }]
        );
    }

    #[test]
    fn missing_source_file_is_a_source_error() {
        let source = CsvRecordSource::new("/nonexistent/vocab.csv", "/nonexistent/data.csv");
        assert!(matches!(
            source.vocabulary().unwrap_err(),
            PipelineError::Source { .. }
        ));
    }
}
