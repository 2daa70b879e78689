use std::io;

use thiserror::Error;

use crate::lifecycle::TrainPhase;
use crate::types::{LogicalPath, TableName};

/// Error type for configuration, artifact I/O, and consistency failures.
///
/// No variant is retried inside the pipeline; every error aborts the current
/// run and propagates to the invoking stage binary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("artifact '{path}' unavailable: {reason}")]
    Artifact { path: LogicalPath, reason: String },
    #[error("source query '{query}' failed: {reason}")]
    Source { query: String, reason: String },
    #[error("sink append to '{table}' failed: {reason}")]
    Sink { table: TableName, reason: String },
    #[error("model bundle at '{path}' is incomplete or corrupt: {reason}")]
    Bundle { path: LogicalPath, reason: String },
    #[error("result schema mismatch: {0}")]
    Schema(String),
    #[error("train phase '{phase}' failed: {source}")]
    Phase {
        phase: TrainPhase,
        #[source]
        source: Box<PipelineError>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Tag an error with the train phase it surfaced in.
    ///
    /// Already-tagged errors keep their original phase.
    pub fn in_phase(self, phase: TrainPhase) -> Self {
        match self {
            PipelineError::Phase { .. } => self,
            other => PipelineError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }
}
