//! Model bundle persistence.
//!
//! A bundle is the fixed four-file set `model.lambda`, `model.elogbeta`,
//! `model.id2word`, `model.state`, co-versioned under one run's `model/`
//! directory. Files are staged into the stage's scratch directory, uploaded
//! one by one, and a manifest is written **last**: the manifest is the
//! completeness marker, so a crash mid-upload leaves a bundle the next
//! `update` run rejects up front instead of failing deep inside decoding.
//!
//! Payload wire format: one version byte, one bitcode prefix byte, then the
//! bitcode-encoded record.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::bundle::{
    ALL_SUFFIXES, BITCODE_PREFIX, MANIFEST_SUFFIX, RECORD_VERSION, SUFFIX_ELOGBETA,
    SUFFIX_ID2WORD, SUFFIX_LAMBDA, SUFFIX_STATE,
};
use crate::errors::PipelineError;
use crate::model::{ModelState, OnlineLda};
use crate::paths::RunPaths;
use crate::store::ArtifactStore;
use crate::types::LogicalPath;

/// Manifest listing the expected bundle file set; written after every file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Run date the bundle belongs to.
    pub run_date: String,
    /// Expected files with their uploaded byte lengths.
    pub files: Vec<ManifestEntry>,
    /// Upload completion time (RFC 3339).
    pub created_at: String,
}

/// One expected bundle file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub bytes: u64,
}

#[derive(bitcode::Encode, bitcode::Decode)]
struct MatrixRecord {
    num_topics: u32,
    vocab_size: u32,
    values: Vec<f64>,
}

#[derive(bitcode::Encode, bitcode::Decode)]
struct VocabRecord {
    tokens: Vec<String>,
}

#[derive(bitcode::Encode, bitcode::Decode)]
struct StateRecord {
    alpha: f64,
    eta: f64,
    decay: f64,
    offset: f64,
    chunk_size: u64,
    num_passes: u64,
    updates: u64,
    seed: u64,
}

/// Serialize the full bundle file set into `tmp_dir`, upload every file to
/// the run's model path, then write the manifest.
pub fn save(
    model: &OnlineLda,
    store: &dyn ArtifactStore,
    paths: &RunPaths,
    tmp_dir: &Path,
) -> Result<(), PipelineError> {
    fs::create_dir_all(tmp_dir)?;
    for suffix in ALL_SUFFIXES {
        let staged = tmp_dir.join(format!("model{suffix}"));
        fs::write(&staged, encode_file(model, suffix))?;
    }

    let mut entries = Vec::with_capacity(ALL_SUFFIXES.len());
    for suffix in ALL_SUFFIXES {
        let staged = tmp_dir.join(format!("model{suffix}"));
        let bytes = fs::read(&staged)?;
        let target = paths.model_file(suffix);
        store.put(&target, &bytes)?;
        debug!(path = %target, bytes = bytes.len(), "uploaded bundle file");
        entries.push(ManifestEntry {
            name: format!("model{suffix}"),
            bytes: bytes.len() as u64,
        });
    }

    let manifest = BundleManifest {
        run_date: paths.date().to_string(),
        files: entries,
        created_at: Utc::now().to_rfc3339(),
    };
    let manifest_path = paths.model_file(MANIFEST_SUFFIX);
    let payload = serde_json::to_vec_pretty(&manifest)
        .map_err(|err| bundle_err(&manifest_path, format!("manifest encoding: {err}")))?;
    store.put(&manifest_path, &payload)?;
    info!(path = %paths.model_dir(), files = ALL_SUFFIXES.len(), "persisted model bundle");
    Ok(())
}

/// Download and verify the bundle persisted under `paths`, then reassemble
/// the model.
///
/// Verification order: manifest first, then presence and size of every listed
/// file, then payload decoding. An incomplete bundle never reaches decoding.
pub fn load(store: &dyn ArtifactStore, paths: &RunPaths) -> Result<OnlineLda, PipelineError> {
    let manifest = read_manifest(store, paths)?;
    verify_file_set(store, paths, &manifest)?;

    let lambda = decode_matrix(&fetch(store, paths, SUFFIX_LAMBDA)?, paths, SUFFIX_LAMBDA)?;
    let elogbeta = decode_matrix(&fetch(store, paths, SUFFIX_ELOGBETA)?, paths, SUFFIX_ELOGBETA)?;
    let vocab = decode_vocab(&fetch(store, paths, SUFFIX_ID2WORD)?, paths)?;
    let state = decode_state(&fetch(store, paths, SUFFIX_STATE)?, paths)?;

    if elogbeta.num_topics != lambda.num_topics || elogbeta.vocab_size != lambda.vocab_size {
        return Err(bundle_err(
            &paths.model_dir(),
            "auxiliary array dimensions disagree with the parameter matrix",
        ));
    }
    if vocab.len() != lambda.vocab_size as usize {
        return Err(bundle_err(
            &paths.model_dir(),
            format!(
                "id2word holds {} tokens but the parameter matrix expects {}",
                vocab.len(),
                lambda.vocab_size
            ),
        ));
    }

    OnlineLda::from_saved(state, lambda.num_topics as usize, vocab, lambda.values)
        .map_err(|err| bundle_err(&paths.model_dir(), err.to_string()))
}

fn read_manifest(
    store: &dyn ArtifactStore,
    paths: &RunPaths,
) -> Result<BundleManifest, PipelineError> {
    let manifest_path = paths.model_file(MANIFEST_SUFFIX);
    let bytes = store.get(&manifest_path).map_err(|err| {
        bundle_err(
            &paths.model_dir(),
            format!("manifest unreadable (bundle incomplete or never completed): {err}"),
        )
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| bundle_err(&manifest_path, format!("manifest decoding: {err}")))
}

fn verify_file_set(
    store: &dyn ArtifactStore,
    paths: &RunPaths,
    manifest: &BundleManifest,
) -> Result<(), PipelineError> {
    let expected: Vec<String> = ALL_SUFFIXES
        .iter()
        .map(|suffix| format!("model{suffix}"))
        .collect();
    let mut listed: Vec<String> = manifest.files.iter().map(|entry| entry.name.clone()).collect();
    listed.sort();
    let mut expected_sorted = expected.clone();
    expected_sorted.sort();
    if listed != expected_sorted {
        return Err(bundle_err(
            &paths.model_dir(),
            format!("manifest lists [{}], expected [{}]", listed.join(", "), expected_sorted.join(", ")),
        ));
    }
    for entry in &manifest.files {
        let suffix = entry
            .name
            .strip_prefix("model")
            .unwrap_or_default();
        let path = paths.model_file(suffix);
        let bytes = store.get(&path).map_err(|err| {
            bundle_err(&paths.model_dir(), format!("listed file '{}' missing: {err}", entry.name))
        })?;
        if bytes.len() as u64 != entry.bytes {
            return Err(bundle_err(
                &path,
                format!(
                    "size {} disagrees with manifest ({} bytes)",
                    bytes.len(),
                    entry.bytes
                ),
            ));
        }
    }
    Ok(())
}

fn fetch(
    store: &dyn ArtifactStore,
    paths: &RunPaths,
    suffix: &str,
) -> Result<Vec<u8>, PipelineError> {
    store.get(&paths.model_file(suffix))
}

fn encode_file(model: &OnlineLda, suffix: &str) -> Vec<u8> {
    match suffix {
        SUFFIX_LAMBDA => encode_payload(&bitcode::encode(&MatrixRecord {
            num_topics: model.num_topics() as u32,
            vocab_size: model.vocab().len() as u32,
            values: model.lambda().to_vec(),
        })),
        SUFFIX_ELOGBETA => encode_payload(&bitcode::encode(&MatrixRecord {
            num_topics: model.num_topics() as u32,
            vocab_size: model.vocab().len() as u32,
            values: model.expected_log_beta(),
        })),
        SUFFIX_ID2WORD => encode_payload(&bitcode::encode(&VocabRecord {
            tokens: model.vocab().to_vec(),
        })),
        SUFFIX_STATE => {
            let state = model.state();
            encode_payload(&bitcode::encode(&StateRecord {
                alpha: state.alpha,
                eta: state.eta,
                decay: state.decay,
                offset: state.offset,
                chunk_size: state.chunk_size as u64,
                num_passes: state.num_passes as u64,
                updates: state.updates,
                seed: state.seed,
            }))
        }
        other => unreachable!("unknown bundle suffix '{other}'"),
    }
}

fn decode_matrix(
    bytes: &[u8],
    paths: &RunPaths,
    suffix: &str,
) -> Result<MatrixRecord, PipelineError> {
    let raw = decode_payload(bytes, &paths.model_file(suffix))?;
    let record: MatrixRecord = bitcode::decode(&raw)
        .map_err(|err| bundle_err(&paths.model_file(suffix), format!("corrupt record: {err}")))?;
    if record.values.len() != record.num_topics as usize * record.vocab_size as usize {
        return Err(bundle_err(
            &paths.model_file(suffix),
            "matrix length disagrees with its declared dimensions",
        ));
    }
    Ok(record)
}

fn decode_vocab(bytes: &[u8], paths: &RunPaths) -> Result<Vec<String>, PipelineError> {
    let raw = decode_payload(bytes, &paths.model_file(SUFFIX_ID2WORD))?;
    let record: VocabRecord = bitcode::decode(&raw).map_err(|err| {
        bundle_err(
            &paths.model_file(SUFFIX_ID2WORD),
            format!("corrupt record: {err}"),
        )
    })?;
    Ok(record.tokens)
}

fn decode_state(bytes: &[u8], paths: &RunPaths) -> Result<ModelState, PipelineError> {
    let raw = decode_payload(bytes, &paths.model_file(SUFFIX_STATE))?;
    let record: StateRecord = bitcode::decode(&raw).map_err(|err| {
        bundle_err(
            &paths.model_file(SUFFIX_STATE),
            format!("corrupt record: {err}"),
        )
    })?;
    Ok(ModelState {
        alpha: record.alpha,
        eta: record.eta,
        decay: record.decay,
        offset: record.offset,
        chunk_size: record.chunk_size as usize,
        num_passes: record.num_passes as usize,
        updates: record.updates,
        seed: record.seed,
    })
}

fn encode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.push(RECORD_VERSION);
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_payload(bytes: &[u8], path: &str) -> Result<Vec<u8>, PipelineError> {
    if bytes.first().copied() != Some(RECORD_VERSION) {
        return Err(bundle_err(path, "record version mismatch"));
    }
    if bytes.get(1).copied() != Some(BITCODE_PREFIX) {
        return Err(bundle_err(path, "payload missing expected prefix"));
    }
    Ok(bytes[2..].to_vec())
}

fn bundle_err(path: &str, reason: impl ToString) -> PipelineError {
    PipelineError::Bundle {
        path: LogicalPath::from(path),
        reason: reason.to_string(),
    }
}
