//! Result publisher stage.
//!
//! Reads the train-stage result artifact and appends its rows to the durable
//! result table. Append-only by design: re-running the stage on the same
//! artifact appends the rows again. Schema mismatch and sink unavailability
//! are fatal and not retried.

use tracing::info;

use crate::config::PublishConfig;
use crate::constants::paths::{CSV_SUFFIX, STAGE_POSTPROCESS};
use crate::errors::PipelineError;
use crate::paths::{RunPaths, StageOutput, join_path, write_signal};
use crate::results::parse_table;
use crate::store::ArtifactStore;
use crate::warehouse::ResultSink;

/// The postprocess stage over an injected store and sink.
pub struct PublishStage<'a> {
    store: &'a dyn ArtifactStore,
    sink: &'a dyn ResultSink,
    config: &'a PublishConfig,
}

impl<'a> PublishStage<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        sink: &'a dyn ResultSink,
        config: &'a PublishConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Run the stage: download, type-check, append, hand off.
    pub fn run(&self) -> Result<StageOutput, PipelineError> {
        let artifact_path = join_path(
            &self.config.training_output,
            &format!("{}{CSV_SUFFIX}", self.config.table),
        );
        info!(path = %artifact_path, "downloading results");
        let bytes = self.store.get(&artifact_path)?;
        let rows = parse_table(&bytes, self.config.token_fields, self.config.num_topics)?;

        info!(table = %self.config.table, rows = rows.len(), "appending results to the sink");
        let appended = self.sink.append(&self.config.table, &rows)?;

        let paths = RunPaths::new(self.config.output_root.clone(), self.config.date);
        let output = StageOutput::for_stage(&paths, STAGE_POSTPROCESS);
        write_signal(self.store, &paths, &output);
        info!(rows = appended, "postprocessing done");
        Ok(output)
    }
}
