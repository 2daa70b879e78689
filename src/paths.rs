//! Run-scoped artifact path conventions and the stage handoff contract.
//!
//! Artifacts live at `<output_root>/run_<date>/<stage>/<name>`, model bundle
//! files at `<output_root>/run_<date>/model/<file>`. The producer→consumer
//! contract is the typed [`StageOutput`] value returned by each stage; the
//! small signal artifact is a best-effort shim for external schedulers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::paths;
use crate::errors::PipelineError;
use crate::store::ArtifactStore;
use crate::types::LogicalPath;

/// Path builder for one run's artifact tree.
#[derive(Clone, Debug)]
pub struct RunPaths {
    output_root: LogicalPath,
    date: NaiveDate,
}

impl RunPaths {
    /// Create a builder for `date` under `output_root` (may be empty).
    pub fn new(output_root: impl Into<LogicalPath>, date: NaiveDate) -> Self {
        Self {
            output_root: output_root.into(),
            date,
        }
    }

    /// The run date this tree is keyed by.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    fn run_dir(&self) -> LogicalPath {
        let run = format!("{}{}", paths::RUN_DIR_PREFIX, self.date);
        join_path(&self.output_root, &run)
    }

    /// Directory of one stage's artifacts, e.g. `run_2026-08-04/train`.
    pub fn stage_dir(&self, stage: &str) -> LogicalPath {
        join_path(&self.run_dir(), stage)
    }

    /// Full path of a named artifact within a stage.
    pub fn artifact(&self, stage: &str, name: &str) -> LogicalPath {
        join_path(&self.stage_dir(stage), name)
    }

    /// Directory of the run's model bundle.
    pub fn model_dir(&self) -> LogicalPath {
        join_path(&self.run_dir(), paths::MODEL_DIR)
    }

    /// Full path of one model bundle file (`model<suffix>`).
    pub fn model_file(&self, suffix: &str) -> LogicalPath {
        let name = format!("{}{suffix}", crate::constants::bundle::BASE_NAME);
        join_path(&self.model_dir(), &name)
    }

    /// Conventional fixed path of the completion signal artifact.
    pub fn signal(&self) -> LogicalPath {
        join_path(&self.output_root, paths::SIGNAL_NAME)
    }
}

/// Join a logical path segment onto a (possibly empty) base.
pub fn join_path(base: &str, name: &str) -> LogicalPath {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Typed handoff emitted by a completed stage and consumed by the next one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Name of the producing stage.
    pub stage: String,
    /// Run date the artifacts belong to.
    pub run_date: NaiveDate,
    /// Logical directory holding the produced artifacts.
    pub output_dir: LogicalPath,
}

impl StageOutput {
    /// Handoff for `stage` under the given run tree.
    pub fn for_stage(paths: &RunPaths, stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            run_date: paths.date(),
            output_dir: paths.stage_dir(stage),
        }
    }
}

/// Best-effort write of the completion signal artifact.
///
/// Absence or failure of the signal must not fail the producing stage; the
/// consumer fails fast later if the referenced path is unusable.
pub fn write_signal(store: &dyn ArtifactStore, paths: &RunPaths, output: &StageOutput) {
    let signal_path = paths.signal();
    match store.put(&signal_path, output.output_dir.as_bytes()) {
        Ok(()) => debug!(stage = %output.stage, path = %signal_path, "wrote completion signal"),
        Err(err) => warn!(
            stage = %output.stage,
            path = %signal_path,
            "completion signal write failed (ignored): {err}"
        ),
    }
}

/// Read the signal artifact back as a logical directory string.
///
/// Only used at the external-scheduler boundary; in-process orchestration
/// passes [`StageOutput`] values directly.
pub fn read_signal(store: &dyn ArtifactStore, paths: &RunPaths) -> Result<LogicalPath, PipelineError> {
    let signal_path = paths.signal();
    let bytes = store.get(&signal_path)?;
    String::from_utf8(bytes).map_err(|err| PipelineError::Artifact {
        path: signal_path,
        reason: format!("signal is not utf-8: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;

    fn run_paths(root: &str) -> RunPaths {
        RunPaths::new(root, NaiveDate::from_ymd_opt(2026, 8, 4).unwrap())
    }

    #[test]
    fn paths_follow_the_run_scoped_convention() {
        let paths = run_paths("out");
        assert_eq!(paths.stage_dir("preprocess"), "out/run_2026-08-04/preprocess");
        assert_eq!(
            paths.artifact("train", "TOPIC_TRY.csv"),
            "out/run_2026-08-04/train/TOPIC_TRY.csv"
        );
        assert_eq!(paths.model_file(".state"), "out/run_2026-08-04/model/model.state");
        assert_eq!(paths.signal(), "out/output.txt");
    }

    #[test]
    fn empty_root_produces_relative_paths() {
        let paths = run_paths("");
        assert_eq!(paths.stage_dir("train"), "run_2026-08-04/train");
        assert_eq!(paths.signal(), "output.txt");
    }

    #[test]
    fn signal_roundtrip_carries_the_output_dir() {
        let store = MemoryArtifactStore::new();
        let paths = run_paths("");
        let output = StageOutput::for_stage(&paths, "train");
        write_signal(&store, &paths, &output);
        assert_eq!(read_signal(&store, &paths).unwrap(), "run_2026-08-04/train");
    }

    #[test]
    fn missing_signal_is_an_artifact_error() {
        let store = MemoryArtifactStore::new();
        let paths = run_paths("");
        assert!(matches!(
            read_signal(&store, &paths),
            Err(PipelineError::Artifact { .. })
        ));
    }
}
