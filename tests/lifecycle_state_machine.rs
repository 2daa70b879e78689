use std::path::PathBuf;

use chrono::NaiveDate;
use tempfile::TempDir;

use topics::config::{Connection, LearningMode, TrainConfig, TrainingParams};
use topics::lifecycle::{TrainPhase, TrainStage};
use topics::store::{ArtifactStore, MemoryArtifactStore};
use topics::{PipelineError, results};

struct Fixture {
    store: MemoryArtifactStore,
    _tmp: TempDir,
    tmp_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let tmp_dir = tmp.path().to_path_buf();
        Self {
            store: MemoryArtifactStore::new(),
            _tmp: tmp,
            tmp_dir,
        }
    }

    fn seed_preprocess(&self, date: &str, vocabulary: &str, dataset: &str) {
        self.store
            .put(&format!("run_{date}/preprocess/dict.csv"), vocabulary.as_bytes())
            .unwrap();
        self.store
            .put(
                &format!("run_{date}/preprocess/dataset.csv"),
                dataset.as_bytes(),
            )
            .unwrap();
    }

    fn config(&self, date: &str, learning: LearningMode, prev_date: Option<&str>) -> TrainConfig {
        TrainConfig {
            connection: Connection {
                project: "demo".to_string(),
                bucket: "topics".to_string(),
            },
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            prev_date: prev_date.map(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()),
            learning,
            preprocess_output: format!("run_{date}/preprocess"),
            dict_file: "dict".to_string(),
            dataset_file: "dataset".to_string(),
            table: "TOPIC_TRY".to_string(),
            tmp_dir: self.tmp_dir.clone(),
            output_root: String::new(),
            params: TrainingParams {
                num_topics: 3,
                chunk_size: 16,
                num_passes: 4,
                workers: 2,
            },
            pipeline_version: "v1".to_string(),
        }
    }
}

#[test]
fn update_without_prev_date_fails_before_any_io() {
    let fixture = Fixture::new();
    let config = fixture.config("2026-08-01", LearningMode::Update, None);
    let err = TrainStage::new(&fixture.store, &config).run().unwrap_err();

    assert!(matches!(err, PipelineError::Configuration(_)));
    // Nothing was read or written: the store never had to exist.
    assert!(fixture.store.is_empty());
}

#[test]
fn result_rows_match_input_records_with_full_topic_width() {
    let fixture = Fixture::new();
    fixture.seed_preprocess(
        "2026-08-01",
        "alpha\nbeta\ngamma\n",
        "1,alpha,beta,alpha\n2,gamma,gamma,beta\n3,alpha,,\n",
    );
    let config = fixture.config("2026-08-01", LearningMode::Reset, None);
    let outcome = TrainStage::new(&fixture.store, &config).run().unwrap();

    assert_eq!(outcome.rows, 3);
    let artifact = fixture
        .store
        .get("run_2026-08-01/train/TOPIC_TRY.csv")
        .unwrap();
    let rows = results::parse_table(&artifact, 3, 3).unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.topics.len(), 3);
        assert!(row.topics.iter().all(|&score| score >= 0.0));
        assert_eq!(row.pipeline_version, "v1");
    }
    assert_eq!(rows[2].id, "3");
    assert_eq!(rows[2].fields, vec!["alpha", "", ""]);
}

#[test]
fn rerunning_training_reproduces_the_stored_vocabulary_mapping() {
    let fixture = Fixture::new();
    fixture.seed_preprocess(
        "2026-08-01",
        "frost\nember\ngale\n",
        "1,frost,ember,gale\n",
    );
    let config = fixture.config("2026-08-01", LearningMode::Reset, None);
    TrainStage::new(&fixture.store, &config).run().unwrap();
    let first = fixture
        .store
        .get("run_2026-08-01/model/model.id2word")
        .unwrap();

    TrainStage::new(&fixture.store, &config).run().unwrap();
    let second = fixture
        .store
        .get("run_2026-08-01/model/model.id2word")
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn update_uses_the_stored_vocabulary_and_drops_new_tokens() {
    let fixture = Fixture::new();
    fixture.seed_preprocess("2026-08-01", "alpha\nbeta\n", "1,alpha,beta,alpha\n");
    let reset = fixture.config("2026-08-01", LearningMode::Reset, None);
    TrainStage::new(&fixture.store, &reset).run().unwrap();

    // The next run observes a wider vocabulary; the stored mapping wins.
    fixture.seed_preprocess(
        "2026-08-02",
        "alpha\nbeta\nnova\n",
        "2,nova,alpha,nova\n",
    );
    let update = fixture.config("2026-08-02", LearningMode::Update, Some("2026-08-01"));
    let outcome = TrainStage::new(&fixture.store, &update).run().unwrap();
    assert_eq!(outcome.rows, 1);

    // The updated bundle still carries the two-token vocabulary.
    let prev_id2word = fixture
        .store
        .get("run_2026-08-01/model/model.id2word")
        .unwrap();
    let new_id2word = fixture
        .store
        .get("run_2026-08-02/model/model.id2word")
        .unwrap();
    assert_eq!(prev_id2word, new_id2word);

    // The unseen token contributed nothing, but the row keeps full width.
    let artifact = fixture
        .store
        .get("run_2026-08-02/train/TOPIC_TRY.csv")
        .unwrap();
    let rows = results::parse_table(&artifact, 3, 3).unwrap();
    assert_eq!(rows[0].id, "2");
    assert_eq!(rows[0].topics.len(), 3);
}

#[test]
fn missing_vocabulary_artifact_is_tagged_with_its_phase() {
    let fixture = Fixture::new();
    let config = fixture.config("2026-08-01", LearningMode::Reset, None);
    let err = TrainStage::new(&fixture.store, &config).run().unwrap_err();
    match err {
        PipelineError::Phase { phase, source } => {
            assert_eq!(phase, TrainPhase::LoadVocabulary);
            assert!(matches!(*source, PipelineError::Artifact { .. }));
        }
        other => panic!("expected a phase-tagged error, got {other}"),
    }
}

#[test]
fn update_with_no_prior_bundle_fails_in_resolve_model() {
    let fixture = Fixture::new();
    fixture.seed_preprocess("2026-08-02", "alpha\n", "1,alpha,alpha,alpha\n");
    let config = fixture.config("2026-08-02", LearningMode::Update, Some("2026-08-01"));
    let err = TrainStage::new(&fixture.store, &config).run().unwrap_err();
    match err {
        PipelineError::Phase { phase, source } => {
            assert_eq!(phase, TrainPhase::ResolveModel);
            assert!(matches!(*source, PipelineError::Bundle { .. }));
        }
        other => panic!("expected a phase-tagged error, got {other}"),
    }
}

#[test]
fn visualization_artifact_summarizes_the_run() {
    let fixture = Fixture::new();
    fixture.seed_preprocess(
        "2026-08-01",
        "alpha\nbeta\n",
        "1,alpha,beta,alpha\n2,beta,beta,alpha\n",
    );
    let config = fixture.config("2026-08-01", LearningMode::Reset, None);
    TrainStage::new(&fixture.store, &config).run().unwrap();

    let bytes = fixture
        .store
        .get("run_2026-08-01/train/topic_vis.json")
        .unwrap();
    let vis: topics::TopicVis = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(vis.topics.len(), 3);
    assert_eq!(vis.documents.len(), 2);
    assert_eq!(vis.documents[0].id, "1");
}
