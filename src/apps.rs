//! Stage entry points used by the binaries and by integration tests.
//!
//! Each `run_*` function parses a stage CLI from an explicit argument
//! iterator and receives its external collaborators (artifact store, record
//! source, result sink) through builder closures, so tests drive complete
//! stage invocations against in-memory fakes while the binaries inject
//! filesystem-backed implementations.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};

use crate::config::{
    Connection, LearningMode, PreprocessConfig, PublishConfig, TrainConfig, TrainingParams,
    parse_date, resolve_run_date,
};
use crate::constants::defaults;
use crate::lifecycle::{TrainOutcome, TrainStage};
use crate::paths::StageOutput;
use crate::preprocess::PreprocessStage;
use crate::publish::PublishStage;
use crate::store::ArtifactStore;
use crate::warehouse::{RecordSource, ResultSink};

/// Source export locations taken from the CLI and handed to the source
/// builder closure.
#[derive(Clone, Debug, Default)]
pub struct SourceLocations {
    pub vocabulary_csv: Option<PathBuf>,
    pub dataset_csv: Option<PathBuf>,
}

/// Outputs of one full in-process pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub preprocess: StageOutput,
    pub train: TrainOutcome,
    pub postprocess: StageOutput,
}

#[derive(Debug, Parser)]
#[command(
    name = "preprocess",
    disable_help_subcommand = true,
    about = "Pull vocabulary and dataset rows into run-scoped artifacts"
)]
struct PreprocessCli {
    #[arg(long, help = "Project identifier of the backing services")]
    project: String,
    #[arg(long, help = "Artifact store bucket name")]
    bucket: String,
    #[arg(
        long,
        default_value = "",
        help = "Run date (YYYY-MM-DD); empty means yesterday"
    )]
    date: String,
    #[arg(
        long = "dict-file",
        default_value = defaults::DICT_FILE,
        help = "Vocabulary artifact name (without .csv)"
    )]
    dict_file: String,
    #[arg(
        long = "dataset-file",
        default_value = defaults::DATASET_FILE,
        help = "Dataset artifact name (without .csv)"
    )]
    dataset_file: String,
    #[arg(long = "tmp-dir", help = "Directory for temporary result files")]
    tmp_dir: PathBuf,
    #[arg(long, help = "Artifact store output location")]
    output: String,
    #[arg(
        long = "vocabulary-csv",
        value_name = "PATH",
        help = "Local vocabulary export consumed by the file-backed source"
    )]
    vocabulary_csv: Option<PathBuf>,
    #[arg(
        long = "dataset-csv",
        value_name = "PATH",
        help = "Local dataset export consumed by the file-backed source"
    )]
    dataset_csv: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "train",
    disable_help_subcommand = true,
    about = "Resolve, fit or update, and persist the run's topic model"
)]
struct TrainCli {
    #[arg(long = "preprocess-output", help = "Logical directory of the preprocess artifacts")]
    preprocess_output: String,
    #[arg(long, help = "Project identifier of the backing services")]
    project: String,
    #[arg(long, help = "Artifact store bucket name")]
    bucket: String,
    #[arg(long, default_value = defaults::TABLE, help = "Result table name")]
    table: String,
    #[arg(
        long = "prev-date",
        default_value = "",
        help = "Previous run date; required when updating the model"
    )]
    prev_date: String,
    #[arg(
        long,
        default_value = "",
        help = "Run date (YYYY-MM-DD); empty means yesterday"
    )]
    date: String,
    #[arg(
        long = "dict-file",
        default_value = defaults::DICT_FILE,
        help = "Vocabulary artifact name (without .csv)"
    )]
    dict_file: String,
    #[arg(
        long = "dataset-file",
        default_value = defaults::DATASET_FILE,
        help = "Dataset artifact name (without .csv)"
    )]
    dataset_file: String,
    #[arg(long = "tmp-dir", help = "Directory for temporary result files")]
    tmp_dir: PathBuf,
    #[arg(
        long = "learning-type",
        value_enum,
        default_value_t = LearningMode::Update,
        help = "Reset or update the model"
    )]
    learning_type: LearningMode,
    #[arg(
        long = "num-topics",
        default_value_t = defaults::NUM_TOPICS,
        value_parser = parse_positive_usize,
        help = "Topic count"
    )]
    num_topics: usize,
    #[arg(
        long = "chunk-size",
        default_value_t = defaults::CHUNK_SIZE,
        value_parser = parse_positive_usize,
        help = "Mini-batch size for model fitting"
    )]
    chunk_size: usize,
    #[arg(
        long = "num-pass",
        default_value_t = defaults::NUM_PASSES,
        value_parser = parse_positive_usize,
        help = "Passes over the corpus"
    )]
    num_pass: usize,
    #[arg(
        long,
        default_value_t = defaults::WORKERS,
        value_parser = parse_positive_usize,
        help = "Worker threads for model fitting"
    )]
    workers: usize,
    #[arg(
        long = "pipeline-version",
        default_value = "",
        help = "Version tag stamped into result rows"
    )]
    pipeline_version: String,
    #[arg(long, help = "Artifact store output location")]
    output: String,
}

#[derive(Debug, Parser)]
#[command(
    name = "postprocess",
    disable_help_subcommand = true,
    about = "Append the run's result rows to the durable table"
)]
struct PostprocessCli {
    #[arg(long = "training-output", help = "Logical directory of the train artifacts")]
    training_output: String,
    #[arg(long, help = "Project identifier of the backing services")]
    project: String,
    #[arg(long, help = "Artifact store bucket name")]
    bucket: String,
    #[arg(long, default_value = defaults::TABLE, help = "Result table name")]
    table: String,
    #[arg(
        long,
        default_value = "",
        help = "Run date (YYYY-MM-DD); empty means yesterday"
    )]
    date: String,
    #[arg(long, help = "Artifact store output location")]
    output: String,
    #[arg(
        long = "sink-dir",
        default_value = "warehouse",
        help = "Directory of the file-backed result sink"
    )]
    sink_dir: String,
    #[arg(
        long = "token-fields",
        default_value_t = defaults::TOKEN_FIELDS,
        value_parser = parse_positive_usize,
        help = "Token-field count of the dataset schema"
    )]
    token_fields: usize,
    #[arg(
        long = "num-topics",
        default_value_t = defaults::NUM_TOPICS,
        value_parser = parse_positive_usize,
        help = "Topic count of the result schema"
    )]
    num_topics: usize,
}

#[derive(Debug, Parser)]
#[command(
    name = "pipeline",
    disable_help_subcommand = true,
    about = "Run preprocess, train, and postprocess in sequence",
    long_about = "Run all three stages in-process, threading each stage's typed output into the next stage's input."
)]
struct PipelineCli {
    #[arg(long, help = "Project identifier of the backing services")]
    project: String,
    #[arg(long, help = "Artifact store bucket name")]
    bucket: String,
    #[arg(
        long,
        default_value = "",
        help = "Run date (YYYY-MM-DD); empty means yesterday"
    )]
    date: String,
    #[arg(
        long = "prev-date",
        default_value = "",
        help = "Previous run date; required when updating the model"
    )]
    prev_date: String,
    #[arg(
        long = "dict-file",
        default_value = defaults::DICT_FILE,
        help = "Vocabulary artifact name (without .csv)"
    )]
    dict_file: String,
    #[arg(
        long = "dataset-file",
        default_value = defaults::DATASET_FILE,
        help = "Dataset artifact name (without .csv)"
    )]
    dataset_file: String,
    #[arg(long, default_value = defaults::TABLE, help = "Result table name")]
    table: String,
    #[arg(long = "tmp-dir", help = "Directory for temporary result files")]
    tmp_dir: PathBuf,
    #[arg(long, help = "Artifact store output location")]
    output: String,
    #[arg(
        long = "learning-type",
        value_enum,
        default_value_t = LearningMode::Update,
        help = "Reset or update the model"
    )]
    learning_type: LearningMode,
    #[arg(
        long = "num-topics",
        default_value_t = defaults::NUM_TOPICS,
        value_parser = parse_positive_usize,
        help = "Topic count"
    )]
    num_topics: usize,
    #[arg(
        long = "chunk-size",
        default_value_t = defaults::CHUNK_SIZE,
        value_parser = parse_positive_usize,
        help = "Mini-batch size for model fitting"
    )]
    chunk_size: usize,
    #[arg(
        long = "num-pass",
        default_value_t = defaults::NUM_PASSES,
        value_parser = parse_positive_usize,
        help = "Passes over the corpus"
    )]
    num_pass: usize,
    #[arg(
        long,
        default_value_t = defaults::WORKERS,
        value_parser = parse_positive_usize,
        help = "Worker threads for model fitting"
    )]
    workers: usize,
    #[arg(
        long = "pipeline-version",
        default_value = "",
        help = "Version tag stamped into result rows"
    )]
    pipeline_version: String,
    #[arg(
        long = "vocabulary-csv",
        value_name = "PATH",
        help = "Local vocabulary export consumed by the file-backed source"
    )]
    vocabulary_csv: Option<PathBuf>,
    #[arg(
        long = "dataset-csv",
        value_name = "PATH",
        help = "Local dataset export consumed by the file-backed source"
    )]
    dataset_csv: Option<PathBuf>,
    #[arg(
        long = "sink-dir",
        default_value = "warehouse",
        help = "Directory of the file-backed result sink"
    )]
    sink_dir: String,
    #[arg(
        long = "token-fields",
        default_value_t = defaults::TOKEN_FIELDS,
        value_parser = parse_positive_usize,
        help = "Token-field count of the dataset schema"
    )]
    token_fields: usize,
}

/// Run the preprocess stage from CLI arguments.
pub fn run_preprocess<S, R, BuildStore, BuildSource, I>(
    args_iter: I,
    build_store: BuildStore,
    build_source: BuildSource,
) -> Result<Option<StageOutput>, Box<dyn Error>>
where
    S: ArtifactStore,
    R: RecordSource,
    BuildStore: FnOnce(&str) -> Result<S, Box<dyn Error>>,
    BuildSource: FnOnce(&SourceLocations) -> Result<R, Box<dyn Error>>,
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<PreprocessCli, _>(std::iter::once("preprocess".to_string()).chain(args_iter))?
    else {
        return Ok(None);
    };

    let store = build_store(&cli.output)?;
    let locations = SourceLocations {
        vocabulary_csv: cli.vocabulary_csv,
        dataset_csv: cli.dataset_csv,
    };
    let source = build_source(&locations)?;
    let config = PreprocessConfig {
        connection: Connection {
            project: cli.project,
            bucket: cli.bucket,
        },
        date: resolve_run_date(Some(&cli.date))?,
        dict_file: cli.dict_file,
        dataset_file: cli.dataset_file,
        tmp_dir: cli.tmp_dir,
        output_root: String::new(),
    };

    let output = PreprocessStage::new(&store, &source, &config).run()?;
    println!("preprocess output: {}", output.output_dir);
    Ok(Some(output))
}

/// Run the train stage from CLI arguments.
pub fn run_train<S, BuildStore, I>(
    args_iter: I,
    build_store: BuildStore,
) -> Result<Option<TrainOutcome>, Box<dyn Error>>
where
    S: ArtifactStore,
    BuildStore: FnOnce(&str) -> Result<S, Box<dyn Error>>,
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<TrainCli, _>(std::iter::once("train".to_string()).chain(args_iter))?
    else {
        return Ok(None);
    };

    let store = build_store(&cli.output)?;
    let config = TrainConfig {
        connection: Connection {
            project: cli.project,
            bucket: cli.bucket,
        },
        date: resolve_run_date(Some(&cli.date))?,
        prev_date: parse_optional_date(&cli.prev_date)?,
        learning: cli.learning_type,
        preprocess_output: cli.preprocess_output,
        dict_file: cli.dict_file,
        dataset_file: cli.dataset_file,
        table: cli.table,
        tmp_dir: cli.tmp_dir,
        output_root: String::new(),
        params: TrainingParams {
            num_topics: cli.num_topics,
            chunk_size: cli.chunk_size,
            num_passes: cli.num_pass,
            workers: cli.workers,
        },
        pipeline_version: cli.pipeline_version,
    };

    let outcome = TrainStage::new(&store, &config).run()?;
    println!("train output: {}", outcome.output.output_dir);
    Ok(Some(outcome))
}

/// Run the postprocess stage from CLI arguments.
pub fn run_postprocess<S, K, BuildStore, BuildSink, I>(
    args_iter: I,
    build_store: BuildStore,
    build_sink: BuildSink,
) -> Result<Option<StageOutput>, Box<dyn Error>>
where
    S: ArtifactStore,
    K: ResultSink,
    BuildStore: FnOnce(&str) -> Result<S, Box<dyn Error>>,
    BuildSink: FnOnce(&str) -> Result<K, Box<dyn Error>>,
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<PostprocessCli, _>(std::iter::once("postprocess".to_string()).chain(args_iter))?
    else {
        return Ok(None);
    };

    let store = build_store(&cli.output)?;
    let sink = build_sink(&cli.sink_dir)?;
    let config = PublishConfig {
        connection: Connection {
            project: cli.project,
            bucket: cli.bucket,
        },
        date: resolve_run_date(Some(&cli.date))?,
        training_output: cli.training_output,
        table: cli.table,
        output_root: String::new(),
        token_fields: cli.token_fields,
        num_topics: cli.num_topics,
    };

    let output = PublishStage::new(&store, &sink, &config).run()?;
    println!("postprocess output: {}", output.output_dir);
    Ok(Some(output))
}

/// Run all three stages in sequence, threading each stage's typed output
/// into the next stage's input.
pub fn run_pipeline<S, R, K, BuildStore, BuildSource, BuildSink, I>(
    args_iter: I,
    build_store: BuildStore,
    build_source: BuildSource,
    build_sink: BuildSink,
) -> Result<Option<PipelineOutcome>, Box<dyn Error>>
where
    S: ArtifactStore,
    R: RecordSource,
    K: ResultSink,
    BuildStore: FnOnce(&str) -> Result<S, Box<dyn Error>>,
    BuildSource: FnOnce(&SourceLocations) -> Result<R, Box<dyn Error>>,
    BuildSink: FnOnce(&str) -> Result<K, Box<dyn Error>>,
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<PipelineCli, _>(std::iter::once("pipeline".to_string()).chain(args_iter))?
    else {
        return Ok(None);
    };

    let connection = Connection {
        project: cli.project,
        bucket: cli.bucket,
    };
    let date = resolve_run_date(Some(&cli.date))?;
    let store = build_store(&cli.output)?;
    let locations = SourceLocations {
        vocabulary_csv: cli.vocabulary_csv,
        dataset_csv: cli.dataset_csv,
    };
    let source = build_source(&locations)?;
    let sink = build_sink(&cli.sink_dir)?;

    let preprocess_config = PreprocessConfig {
        connection: connection.clone(),
        date,
        dict_file: cli.dict_file.clone(),
        dataset_file: cli.dataset_file.clone(),
        tmp_dir: cli.tmp_dir.clone(),
        output_root: String::new(),
    };
    let preprocess = PreprocessStage::new(&store, &source, &preprocess_config).run()?;

    let train_config = TrainConfig {
        connection: connection.clone(),
        date,
        prev_date: parse_optional_date(&cli.prev_date)?,
        learning: cli.learning_type,
        preprocess_output: preprocess.output_dir.clone(),
        dict_file: cli.dict_file,
        dataset_file: cli.dataset_file,
        table: cli.table.clone(),
        tmp_dir: cli.tmp_dir,
        output_root: String::new(),
        params: TrainingParams {
            num_topics: cli.num_topics,
            chunk_size: cli.chunk_size,
            num_passes: cli.num_pass,
            workers: cli.workers,
        },
        pipeline_version: cli.pipeline_version,
    };
    let train = TrainStage::new(&store, &train_config).run()?;

    let publish_config = PublishConfig {
        connection,
        date,
        training_output: train.output.output_dir.clone(),
        table: cli.table,
        output_root: String::new(),
        token_fields: cli.token_fields,
        // The resolved model, not the CLI, fixes the result schema width.
        num_topics: train.num_topics,
    };
    let postprocess = PublishStage::new(&store, &sink, &publish_config).run()?;

    println!("pipeline output: {}", postprocess.output_dir);
    Ok(Some(PipelineOutcome {
        preprocess,
        train,
        postprocess,
    }))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn parse_optional_date(raw: &str) -> Result<Option<chrono::NaiveDate>, Box<dyn Error>> {
    if raw.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parse_date(raw)?))
    }
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse value '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
