use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::errors::PipelineError;
use crate::store::{ArtifactStore, unavailable};
use crate::types::LogicalPath;

/// In-memory artifact store keyed by logical path.
///
/// Backs the end-to-end tests; path semantics match the filesystem store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<BTreeMap<LogicalPath, Vec<u8>>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("artifact store poisoned").len()
    }

    /// True if no blob has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the blob at `path`, if present. Test helper for simulating
    /// partially written bundles.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .write()
            .expect("artifact store poisoned")
            .remove(path)
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn get(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        self.blobs
            .read()
            .expect("artifact store poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| unavailable(path, "no blob at path"))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        if path.is_empty() {
            return Err(unavailable(path, "empty path"));
        }
        self.blobs
            .write()
            .expect("artifact store poisoned")
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        Ok(self
            .blobs
            .read()
            .expect("artifact store poisoned")
            .contains_key(path))
    }

    fn list(&self, prefix: &str) -> Result<Vec<LogicalPath>, PipelineError> {
        Ok(self
            .blobs
            .read()
            .expect("artifact store poisoned")
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip_and_missing_path_errors() {
        let store = MemoryArtifactStore::new();
        store.put("run_2026-08-04/preprocess/dict.csv", b"alpha").unwrap();
        assert_eq!(
            store.get("run_2026-08-04/preprocess/dict.csv").unwrap(),
            b"alpha".to_vec()
        );

        let err = store.get("run_2026-08-04/preprocess/missing.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Artifact { .. }));
    }

    #[test]
    fn list_filters_by_prefix_in_sorted_order() {
        let store = MemoryArtifactStore::new();
        store.put("run_a/model/model.state", b"1").unwrap();
        store.put("run_a/model/model.lambda", b"2").unwrap();
        store.put("run_b/model/model.lambda", b"3").unwrap();

        let listed = store.list("run_a/model/").unwrap();
        assert_eq!(
            listed,
            vec![
                "run_a/model/model.lambda".to_string(),
                "run_a/model/model.state".to_string(),
            ]
        );
    }

    #[test]
    fn empty_paths_are_rejected() {
        let store = MemoryArtifactStore::new();
        assert!(store.put("", b"x").is_err());
    }
}
