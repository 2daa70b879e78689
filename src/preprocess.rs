//! Vocabulary & corpus builder stage.
//!
//! Pulls the token vocabulary and the per-record dataset from the tabular
//! source and writes both as run-scoped CSV artifacts. The handoff is only
//! emitted after both artifacts are durably written, so a source failure
//! never leaves partial artifacts referenced by a signal.

use tracing::info;

use crate::config::PreprocessConfig;
use crate::constants::paths::{CSV_SUFFIX, STAGE_PREPROCESS};
use crate::corpus::{render_dataset, render_vocabulary};
use crate::errors::PipelineError;
use crate::paths::{RunPaths, StageOutput, write_signal};
use crate::store::ArtifactStore;
use crate::warehouse::RecordSource;

/// The preprocess stage over an injected store and source.
pub struct PreprocessStage<'a> {
    store: &'a dyn ArtifactStore,
    source: &'a dyn RecordSource,
    config: &'a PreprocessConfig,
}

impl<'a> PreprocessStage<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        source: &'a dyn RecordSource,
        config: &'a PreprocessConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Run the stage: two queries, two artifacts, one handoff.
    pub fn run(&self) -> Result<StageOutput, PipelineError> {
        info!(
            project = %self.config.connection.project,
            bucket = %self.config.connection.bucket,
            date = %self.config.date,
            "loading vocabulary and dataset from the tabular source"
        );
        let vocabulary = self.source.vocabulary()?;
        let dataset = self.source.dataset()?;

        let paths = RunPaths::new(self.config.output_root.clone(), self.config.date);
        let dict_path = paths.artifact(
            STAGE_PREPROCESS,
            &format!("{}{CSV_SUFFIX}", self.config.dict_file),
        );
        let dataset_path = paths.artifact(
            STAGE_PREPROCESS,
            &format!("{}{CSV_SUFFIX}", self.config.dataset_file),
        );
        self.store
            .put(&dict_path, render_vocabulary(&vocabulary)?.as_bytes())?;
        self.store
            .put(&dataset_path, render_dataset(&dataset)?.as_bytes())?;
        info!(
            tokens = vocabulary.len(),
            records = dataset.len(),
            dir = %paths.stage_dir(STAGE_PREPROCESS),
            "preprocessing done"
        );

        let output = StageOutput::for_stage(&paths, STAGE_PREPROCESS);
        write_signal(self.store, &paths, &output);
        Ok(output)
    }
}
