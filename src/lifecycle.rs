//! Model lifecycle manager — the train-stage state machine.
//!
//! One run walks `START → VOCAB_LOADED → CORPUS_BUILT → MODEL_RESOLVED →
//! MODEL_PERSISTED → RESULTS_COMPUTED → RESULTS_PERSISTED → DONE`. Any
//! transition failure aborts the run with the failing phase attached; there
//! is no retry and no rollback of artifacts already written.
//!
//! The `MODEL_RESOLVED` transition is the core decision point: a `reset` run
//! fits a fresh model over the run's own dictionary, an `update` run loads
//! the previous run's verified bundle and treats the bundle's stored
//! vocabulary as authoritative, re-encoding the current corpus against it.

use std::fmt;

use tracing::info;

use crate::bundle;
use crate::config::{LearningMode, TrainConfig};
use crate::constants::defaults::MODEL_SEED;
use crate::constants::paths::{CSV_SUFFIX, STAGE_TRAIN, VIS_FILE};
use crate::corpus::{Corpus, parse_dataset, parse_vocabulary};
use crate::dictionary::{BowDocument, Dictionary};
use crate::errors::PipelineError;
use crate::model::{OnlineLda, worker_pool};
use crate::paths::{RunPaths, StageOutput, join_path, write_signal};
use crate::results::{TopicAssignment, execution_timestamp, render_table};
use crate::store::ArtifactStore;
use crate::viz::TopicVis;

/// Transitions of the train-stage state machine, used to tag failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainPhase {
    LoadVocabulary,
    BuildCorpus,
    ResolveModel,
    PersistModel,
    ComputeResults,
    PersistResults,
}

impl fmt::Display for TrainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainPhase::LoadVocabulary => "load_vocabulary",
            TrainPhase::BuildCorpus => "build_corpus",
            TrainPhase::ResolveModel => "resolve_model",
            TrainPhase::PersistModel => "persist_model",
            TrainPhase::ComputeResults => "compute_results",
            TrainPhase::PersistResults => "persist_results",
        };
        write!(f, "{name}")
    }
}

/// Successful train-run summary.
#[derive(Clone, Debug)]
pub struct TrainOutcome {
    /// Handoff for the postprocess stage.
    pub output: StageOutput,
    /// Result rows written (equals the number of input records).
    pub rows: usize,
    /// Topic count of the resolved model.
    pub num_topics: usize,
}

/// The train stage over an injected store.
pub struct TrainStage<'a> {
    store: &'a dyn ArtifactStore,
    config: &'a TrainConfig,
}

impl<'a> TrainStage<'a> {
    pub fn new(store: &'a dyn ArtifactStore, config: &'a TrainConfig) -> Self {
        Self { store, config }
    }

    /// Execute the full state machine for one run.
    pub fn run(&self) -> Result<TrainOutcome, PipelineError> {
        // Precondition failures terminate before any I/O.
        self.config.validate()?;
        let pool = worker_pool(self.config.params.workers)?;
        let execution_time = execution_timestamp();
        let paths = RunPaths::new(self.config.output_root.clone(), self.config.date);

        info!(date = %self.config.date, mode = %self.config.learning, "generating dictionary");
        let dictionary = self
            .load_vocabulary()
            .map_err(|err| err.in_phase(TrainPhase::LoadVocabulary))?;
        info!(tokens = dictionary.len(), "dictionary ready");

        info!("loading dataset");
        let corpus = self
            .build_corpus(&dictionary)
            .map_err(|err| err.in_phase(TrainPhase::BuildCorpus))?;
        info!(documents = corpus.len(), "corpus built");

        let (model, docs) = self
            .resolve_model(&dictionary, &corpus, &pool)
            .map_err(|err| err.in_phase(TrainPhase::ResolveModel))?;

        bundle::save(&model, self.store, &paths, &self.config.tmp_dir)
            .map_err(|err| err.in_phase(TrainPhase::PersistModel))?;

        info!("concatenating dataset and allocated topic distributions");
        let (rows, distributions) = self
            .compute_results(&model, &corpus, &docs, &pool, &execution_time)
            .map_err(|err| err.in_phase(TrainPhase::ComputeResults))?;

        info!("saving result and visualization files");
        self.persist_results(&paths, &model, &corpus, &rows, &distributions)
            .map_err(|err| err.in_phase(TrainPhase::PersistResults))?;

        let output = StageOutput::for_stage(&paths, STAGE_TRAIN);
        write_signal(self.store, &paths, &output);
        info!(rows = rows.len(), "training done");
        Ok(TrainOutcome {
            output,
            rows: rows.len(),
            num_topics: model.num_topics(),
        })
    }

    /// `START → VOCAB_LOADED`: ids follow vocabulary row order exactly.
    fn load_vocabulary(&self) -> Result<Dictionary, PipelineError> {
        let path = join_path(
            &self.config.preprocess_output,
            &format!("{}{CSV_SUFFIX}", self.config.dict_file),
        );
        let bytes = self.store.get(&path)?;
        let tokens = parse_vocabulary(&bytes)?;
        Ok(Dictionary::from_ordered_tokens(tokens))
    }

    /// `VOCAB_LOADED → CORPUS_BUILT`: unknown tokens are dropped, record
    /// identifiers are retained out-of-band.
    fn build_corpus(&self, dictionary: &Dictionary) -> Result<Corpus, PipelineError> {
        let path = join_path(
            &self.config.preprocess_output,
            &format!("{}{CSV_SUFFIX}", self.config.dataset_file),
        );
        let bytes = self.store.get(&path)?;
        let records = parse_dataset(&bytes)?;
        Ok(Corpus::build(dictionary, records))
    }

    /// `CORPUS_BUILT → MODEL_RESOLVED`: either branch yields one loaded
    /// model plus the documents encoded against that model's vocabulary.
    fn resolve_model(
        &self,
        dictionary: &Dictionary,
        corpus: &Corpus,
        pool: &rayon::ThreadPool,
    ) -> Result<(OnlineLda, Vec<BowDocument>), PipelineError> {
        match self.config.learning {
            LearningMode::Reset => {
                info!("running the model (reset)");
                let model =
                    OnlineLda::fit(dictionary, &corpus.docs, self.config.params, MODEL_SEED, pool);
                Ok((model, corpus.docs.clone()))
            }
            LearningMode::Update => {
                let prev_date = self.config.prev_date.ok_or_else(|| {
                    PipelineError::Configuration("update requires a previous run date".to_string())
                })?;
                info!(prev_date = %prev_date, "updating the model");
                let prev_paths = RunPaths::new(self.config.output_root.clone(), prev_date);
                let mut model = bundle::load(self.store, &prev_paths)?;
                // The persisted mapping is authoritative; the run's fresh
                // dictionary never replaces it. Tokens the stored model has
                // not seen are dropped by re-encoding.
                let stored = Dictionary::from_ordered_tokens(model.vocab().iter().cloned());
                let docs: Vec<BowDocument> = corpus
                    .records
                    .iter()
                    .map(|record| stored.doc_to_bow(&record.tokens()))
                    .collect();
                model.update(&docs, pool);
                Ok((model, docs))
            }
        }
    }

    /// `MODEL_PERSISTED → RESULTS_COMPUTED`: one row per record, all topic
    /// slots explicit.
    fn compute_results(
        &self,
        model: &OnlineLda,
        corpus: &Corpus,
        docs: &[BowDocument],
        pool: &rayon::ThreadPool,
        execution_time: &str,
    ) -> Result<(Vec<TopicAssignment>, Vec<Vec<f64>>), PipelineError> {
        let distributions = model.infer_all(docs, pool);
        let rows = corpus
            .records
            .iter()
            .zip(&distributions)
            .map(|(record, distribution)| TopicAssignment {
                date: self.config.date,
                id: record.id.clone(),
                fields: record.fields.clone(),
                topics: distribution.iter().map(|&score| score as f32).collect(),
                execution_time: execution_time.to_string(),
                pipeline_version: self.config.pipeline_version.clone(),
            })
            .collect();
        Ok((rows, distributions))
    }

    /// `RESULTS_COMPUTED → RESULTS_PERSISTED`: result table plus the
    /// visualization summary, both under the run's train path.
    fn persist_results(
        &self,
        paths: &RunPaths,
        model: &OnlineLda,
        corpus: &Corpus,
        rows: &[TopicAssignment],
        distributions: &[Vec<f64>],
    ) -> Result<(), PipelineError> {
        let table_path = paths.artifact(
            STAGE_TRAIN,
            &format!("{}{CSV_SUFFIX}", self.config.table),
        );
        self.store
            .put(&table_path, render_table(rows)?.as_bytes())?;

        let record_ids: Vec<String> = corpus
            .records
            .iter()
            .map(|record| record.id.clone())
            .collect();
        let vis = TopicVis::prepare(model, &record_ids, distributions);
        let vis_path = paths.artifact(STAGE_TRAIN, VIS_FILE);
        self.store.put(&vis_path, &vis.to_json()?)?;
        Ok(())
    }
}
