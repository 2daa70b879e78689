use std::error::Error;
use std::sync::Arc;

use tempfile::tempdir;

use topics::apps::run_pipeline;
use topics::corpus::DatasetRecord;
use topics::store::{ArtifactStore, MemoryArtifactStore};
use topics::warehouse::{MemoryRecordSource, MemoryResultSink};

fn record(id: &str, fields: &[&str]) -> DatasetRecord {
    DatasetRecord {
        id: id.to_string(),
        fields: fields.iter().map(|field| (*field).to_string()).collect(),
    }
}

fn base_args(date: &str, tmp_dir: &str, extra: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--project",
        "demo",
        "--bucket",
        "topics",
        "--date",
        date,
        "--table",
        "TOPIC_TRY",
        "--tmp-dir",
        tmp_dir,
        "--output",
        "mem",
        "--num-topics",
        "2",
        "--chunk-size",
        "10",
        "--num-pass",
        "5",
        "--workers",
        "2",
        "--token-fields",
        "3",
        "--pipeline-version",
        "v1",
    ];
    args.extend_from_slice(extra);
    args.into_iter().map(|arg| arg.to_string()).collect()
}

fn run(
    store: &Arc<MemoryArtifactStore>,
    sink: &Arc<MemoryResultSink>,
    source: MemoryRecordSource,
    args: Vec<String>,
) -> Result<Option<topics::apps::PipelineOutcome>, Box<dyn Error>> {
    let store = Arc::clone(store);
    let sink = Arc::clone(sink);
    run_pipeline(
        args.into_iter(),
        move |_| Ok(store),
        move |_| Ok(source),
        move |_| Ok(sink),
    )
}

#[test]
fn reset_then_update_runs_chain_through_the_persisted_bundle() {
    let store = Arc::new(MemoryArtifactStore::new());
    let sink = Arc::new(MemoryResultSink::new());
    let tmp = tempdir().unwrap();
    let tmp_dir = tmp.path().to_string_lossy().into_owned();

    // Scenario A: reset run over a two-token vocabulary and one record.
    let source_a = MemoryRecordSource::new(
        vec!["alpha".to_string(), "beta".to_string()],
        vec![record("1", &["alpha", "alpha", "beta"])],
    );
    let outcome_a = run(
        &store,
        &sink,
        source_a,
        base_args("2026-08-01", &tmp_dir, &["--learning-type", "reset"]),
    )
    .unwrap()
    .unwrap();

    assert_eq!(outcome_a.train.rows, 1);
    assert_eq!(outcome_a.train.num_topics, 2);

    let rows = sink.rows("TOPIC_TRY");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "1");
    assert_eq!(rows[0].topics.len(), 2);
    assert!(rows[0].topics.iter().all(|&score| score >= 0.0));
    let total: f32 = rows[0].topics.iter().sum();
    assert!(total > 0.5 && total < 1.5, "degenerate distribution: {total}");

    let bundle_files = store.list("run_2026-08-01/model/").unwrap();
    assert_eq!(
        bundle_files,
        vec![
            "run_2026-08-01/model/model.elogbeta".to_string(),
            "run_2026-08-01/model/model.id2word".to_string(),
            "run_2026-08-01/model/model.lambda".to_string(),
            "run_2026-08-01/model/model.manifest".to_string(),
            "run_2026-08-01/model/model.state".to_string(),
        ]
    );

    // Scenario B: update run loads A's bundle and emits only the new record.
    let source_b = MemoryRecordSource::new(
        vec!["alpha".to_string(), "beta".to_string()],
        vec![record("2", &["beta", "beta", "alpha"])],
    );
    let outcome_b = run(
        &store,
        &sink,
        source_b,
        base_args(
            "2026-08-02",
            &tmp_dir,
            &["--learning-type", "update", "--prev-date", "2026-08-01"],
        ),
    )
    .unwrap()
    .unwrap();

    assert_eq!(outcome_b.train.rows, 1);

    let result_artifact = store
        .get("run_2026-08-02/train/TOPIC_TRY.csv")
        .map(|bytes| String::from_utf8(bytes).unwrap())
        .unwrap();
    assert_eq!(result_artifact.lines().count(), 1);
    assert!(result_artifact.starts_with("2026-08-02,2,"));

    // The sink accumulated one row per run; no re-emission of record 1.
    let rows = sink.rows("TOPIC_TRY");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "1");
    assert_eq!(rows[1].id, "2");
    assert_eq!(rows[1].date.to_string(), "2026-08-02");

    // The update run persisted its own bundle under the new run's path.
    assert!(store.exists("run_2026-08-02/model/model.manifest").unwrap());
}

#[test]
fn reset_runs_are_reproducible_for_fixed_inputs() {
    let tmp = tempdir().unwrap();
    let tmp_dir = tmp.path().to_string_lossy().into_owned();
    let mut lambdas = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryArtifactStore::new());
        let sink = Arc::new(MemoryResultSink::new());
        let source = MemoryRecordSource::new(
            vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
            vec![
                record("1", &["alpha", "beta", "beta"]),
                record("2", &["gamma", "alpha", "gamma"]),
            ],
        );
        run(
            &store,
            &sink,
            source,
            base_args("2026-08-01", &tmp_dir, &["--learning-type", "reset"]),
        )
        .unwrap()
        .unwrap();
        lambdas.push(store.get("run_2026-08-01/model/model.lambda").unwrap());
    }
    assert_eq!(lambdas[0], lambdas[1]);
}

#[test]
fn update_against_a_gutted_bundle_fails_with_a_consistency_error() {
    let store = Arc::new(MemoryArtifactStore::new());
    let sink = Arc::new(MemoryResultSink::new());
    let tmp = tempdir().unwrap();
    let tmp_dir = tmp.path().to_string_lossy().into_owned();

    let source = MemoryRecordSource::new(
        vec!["alpha".to_string(), "beta".to_string()],
        vec![record("1", &["alpha", "beta", "beta"])],
    );
    run(
        &store,
        &sink,
        source.clone(),
        base_args("2026-08-01", &tmp_dir, &["--learning-type", "reset"]),
    )
    .unwrap()
    .unwrap();

    // Simulate a crash mid-upload on the prior run.
    store.remove("run_2026-08-01/model/model.lambda");

    let err = run(
        &store,
        &sink,
        source,
        base_args(
            "2026-08-02",
            &tmp_dir,
            &["--learning-type", "update", "--prev-date", "2026-08-01"],
        ),
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("resolve_model"), "{message}");
    assert!(message.contains("incomplete or corrupt"), "{message}");
}

#[test]
fn each_stage_writes_its_completion_signal() {
    let store = Arc::new(MemoryArtifactStore::new());
    let sink = Arc::new(MemoryResultSink::new());
    let tmp = tempdir().unwrap();
    let tmp_dir = tmp.path().to_string_lossy().into_owned();

    let source = MemoryRecordSource::new(
        vec!["alpha".to_string()],
        vec![record("1", &["alpha", "alpha", "alpha"])],
    );
    run(
        &store,
        &sink,
        source,
        base_args("2026-08-01", &tmp_dir, &["--learning-type", "reset"]),
    )
    .unwrap()
    .unwrap();

    // Stages share the conventional fixed path; the last writer wins.
    assert_eq!(
        store.get("output.txt").unwrap(),
        b"run_2026-08-01/postprocess".to_vec()
    );
}
