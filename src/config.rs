use std::fmt;
use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate};

use crate::constants::defaults;
use crate::errors::PipelineError;
use crate::types::{LogicalPath, TableName, VersionTag};

/// Model-bundle provenance for the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LearningMode {
    /// Train a fresh model from scratch.
    Reset,
    /// Incrementally update the previous run's persisted model.
    Update,
}

impl fmt::Display for LearningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearningMode::Reset => write!(f, "reset"),
            LearningMode::Update => write!(f, "update"),
        }
    }
}

/// Connection labels for the artifact store and warehouse services.
///
/// The services themselves are external collaborators; these labels scope
/// logging and store construction, nothing else.
#[derive(Clone, Debug)]
pub struct Connection {
    /// Project identifier of the backing services.
    pub project: String,
    /// Bucket-equivalent name of the artifact store.
    pub bucket: String,
}

/// Numeric hyperparameters for the model capability.
#[derive(Clone, Copy, Debug)]
pub struct TrainingParams {
    /// Topic count `K`.
    pub num_topics: usize,
    /// Mini-batch size for online updates.
    pub chunk_size: usize,
    /// Passes over the corpus per fit/update.
    pub num_passes: usize,
    /// Worker threads for the parallel inner loop.
    pub workers: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_topics: defaults::NUM_TOPICS,
            chunk_size: defaults::CHUNK_SIZE,
            num_passes: defaults::NUM_PASSES,
            workers: defaults::WORKERS,
        }
    }
}

impl TrainingParams {
    /// Validate that every parameter is usable before any I/O happens.
    pub fn validated(self) -> Result<Self, PipelineError> {
        if self.num_topics == 0 {
            return Err(PipelineError::Configuration(
                "num_topics must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(PipelineError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.num_passes == 0 {
            return Err(PipelineError::Configuration(
                "num_pass must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::Configuration(
                "workers must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Configuration for the vocabulary/corpus builder stage.
#[derive(Clone, Debug)]
pub struct PreprocessConfig {
    pub connection: Connection,
    /// Run date keying every artifact path.
    pub date: NaiveDate,
    /// Vocabulary artifact name (without `.csv`).
    pub dict_file: String,
    /// Dataset artifact name (without `.csv`).
    pub dataset_file: String,
    /// Scratch directory for local staging.
    pub tmp_dir: PathBuf,
    /// Logical output root under which `run_<date>/...` trees are written.
    pub output_root: LogicalPath,
}

/// Configuration for the model lifecycle (train) stage.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub connection: Connection,
    pub date: NaiveDate,
    /// Prior run date whose bundle seeds an `update` run.
    pub prev_date: Option<NaiveDate>,
    pub learning: LearningMode,
    /// Logical directory holding the preprocess artifacts for this run.
    pub preprocess_output: LogicalPath,
    pub dict_file: String,
    pub dataset_file: String,
    /// Result table name; also names the result artifact.
    pub table: TableName,
    pub tmp_dir: PathBuf,
    pub output_root: LogicalPath,
    pub params: TrainingParams,
    /// Version tag stamped into every result row.
    pub pipeline_version: VersionTag,
}

impl TrainConfig {
    /// Check every precondition that must hold before storage is touched.
    ///
    /// `update` without a previous run date is fatal here, not downstream.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.learning == LearningMode::Update && self.prev_date.is_none() {
            return Err(PipelineError::Configuration(
                "updating the model requires a previous run date (--prev-date)".to_string(),
            ));
        }
        self.params.validated()?;
        Ok(())
    }
}

/// Configuration for the result publisher stage.
#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub connection: Connection,
    pub date: NaiveDate,
    /// Logical directory holding the train-stage result artifact.
    pub training_output: LogicalPath,
    pub table: TableName,
    pub output_root: LogicalPath,
    /// Token-field count of the dataset schema, fixed per deployment.
    pub token_fields: usize,
    /// Topic count `K` of the current hyperparameters.
    pub num_topics: usize,
}

/// Resolve a raw `--date` value: empty or missing defaults to yesterday
/// relative to invocation time.
pub fn resolve_run_date(raw: Option<&str>) -> Result<NaiveDate, PipelineError> {
    match raw {
        None | Some("") => Ok(Local::now().date_naive() - Duration::days(1)),
        Some(value) => parse_date(value),
    }
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| PipelineError::Configuration(format!("invalid date '{raw}': {err}")))
}
