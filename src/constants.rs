/// Constants used by artifact path conventions and stage naming.
pub mod paths {
    /// Directory prefix for one run's artifact tree (`run_<date>/...`).
    pub const RUN_DIR_PREFIX: &str = "run_";
    /// Stage directory name for the vocabulary/corpus builder.
    pub const STAGE_PREPROCESS: &str = "preprocess";
    /// Stage directory name for the model lifecycle manager.
    pub const STAGE_TRAIN: &str = "train";
    /// Stage directory name for the result publisher.
    pub const STAGE_POSTPROCESS: &str = "postprocess";
    /// Directory name for the persisted model bundle within a run.
    pub const MODEL_DIR: &str = "model";
    /// Conventional fixed path of the best-effort completion signal artifact.
    pub const SIGNAL_NAME: &str = "output.txt";
    /// File name of the topic/term visualization summary artifact.
    pub const VIS_FILE: &str = "topic_vis.json";
    /// Suffix appended to tabular artifact names.
    pub const CSV_SUFFIX: &str = ".csv";
}

/// Constants used by model bundle persistence and wire encoding.
pub mod bundle {
    /// Shared base name of every bundle file.
    pub const BASE_NAME: &str = "model";
    /// Suffix of the fitted topic-word parameter file.
    pub const SUFFIX_LAMBDA: &str = ".lambda";
    /// Suffix of the auxiliary expected log-beta array file.
    pub const SUFFIX_ELOGBETA: &str = ".elogbeta";
    /// Suffix of the id-to-token mapping file.
    pub const SUFFIX_ID2WORD: &str = ".id2word";
    /// Suffix of the internal update-state file.
    pub const SUFFIX_STATE: &str = ".state";
    /// Suffix of the manifest artifact written last as the completeness marker.
    pub const MANIFEST_SUFFIX: &str = ".manifest";
    /// The fixed co-versioned file set; a bundle is loadable only when all
    /// four are present and the manifest agrees.
    pub const ALL_SUFFIXES: [&str; 4] =
        [SUFFIX_LAMBDA, SUFFIX_ELOGBETA, SUFFIX_ID2WORD, SUFFIX_STATE];
    /// Version tag for persisted bundle record payloads.
    pub const RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
}

/// Default stage parameters.
pub mod defaults {
    /// Default topic count `K`.
    pub const NUM_TOPICS: usize = 6;
    /// Default mini-batch size for model fitting.
    pub const CHUNK_SIZE: usize = 1000;
    /// Default number of passes over the corpus.
    pub const NUM_PASSES: usize = 30;
    /// Default worker count for the model's parallel inner loop.
    pub const WORKERS: usize = 3;
    /// Default vocabulary artifact name (without `.csv`).
    pub const DICT_FILE: &str = "dict";
    /// Default dataset artifact name (without `.csv`).
    pub const DATASET_FILE: &str = "dataset";
    /// Default result table name.
    pub const TABLE: &str = "TOPIC_TRY";
    /// Number of token fields per dataset record.
    pub const TOKEN_FIELDS: usize = 4;
    /// Fixed RNG seed for reproducible model initialization.
    pub const MODEL_SEED: u64 = 1;
}

/// Constants used by the online-LDA capability.
pub mod model {
    /// Learning-rate decay exponent for online updates.
    pub const DECAY: f64 = 0.5;
    /// Learning-rate offset; keeps early updates bounded.
    pub const OFFSET: f64 = 1.0;
    /// Mean absolute gamma change below which a document E-step stops.
    pub const GAMMA_CONVERGENCE: f64 = 1e-3;
    /// Hard cap on E-step iterations per document.
    pub const MAX_GAMMA_ITERATIONS: usize = 100;
    /// Additive floor that keeps phi normalizers nonzero.
    pub const PHI_EPSILON: f64 = 1e-100;
    /// Number of top terms reported per topic in the visualization summary.
    pub const VIS_TOP_TERMS: usize = 10;
}

/// Constants used by result-row assembly.
pub mod results {
    /// Fixed UTC offset (seconds) of the execution-time clock.
    pub const CLOCK_OFFSET_SECS: i32 = 9 * 3600;
    /// Execution-time format stamped into result rows.
    pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
}
