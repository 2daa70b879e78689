#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Stage entry points for binaries and integration tests.
pub mod apps;
/// Model bundle persistence with manifest-marked completeness.
pub mod bundle;
/// Stage configurations, learning mode, and run-date resolution.
pub mod config;
/// Centralized constants used across paths, bundles, and defaults.
pub mod constants;
/// Dataset/vocabulary row shapes, CSV codecs, and corpus assembly.
pub mod corpus;
/// Token dictionary with deterministic first-seen id assignment.
pub mod dictionary;
/// Model lifecycle manager (the train-stage state machine).
pub mod lifecycle;
/// Online variational LDA capability.
pub mod model;
/// Artifact path conventions and the stage handoff contract.
pub mod paths;
/// Vocabulary & corpus builder stage.
pub mod preprocess;
/// Result publisher stage.
pub mod publish;
/// Result-row assembly and the result table codec.
pub mod results;
/// Artifact store interfaces and backends.
pub mod store;
/// Shared type aliases.
pub mod types;
/// Topic visualization summary artifact.
pub mod viz;
/// Tabular source/sink interfaces and implementations.
pub mod warehouse;

mod errors;

pub use config::{
    Connection, LearningMode, PreprocessConfig, PublishConfig, TrainConfig, TrainingParams,
};
pub use corpus::{Corpus, DatasetRecord};
pub use dictionary::{BowDocument, Dictionary};
pub use errors::PipelineError;
pub use lifecycle::{TrainOutcome, TrainPhase, TrainStage};
pub use model::OnlineLda;
pub use paths::{RunPaths, StageOutput};
pub use preprocess::PreprocessStage;
pub use publish::PublishStage;
pub use results::TopicAssignment;
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use types::{LogicalPath, RecordKey, TableName, Token, TokenId, VersionTag};
pub use viz::TopicVis;
pub use warehouse::{
    CsvRecordSource, CsvResultSink, MemoryRecordSource, MemoryResultSink, RecordSource,
    ResultSink,
};
