use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::PipelineError;
use crate::store::{ArtifactStore, unavailable};
use crate::types::LogicalPath;

/// Filesystem transport mapping logical paths to files under a base directory.
pub struct FsArtifactStore {
    base: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `base`. The directory is created on first write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Filesystem location backing a logical path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let mut resolved = self.base.clone();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            resolved.push(segment);
        }
        resolved
    }

    fn relative_logical(&self, file: &Path) -> Option<LogicalPath> {
        let relative = file.strip_prefix(&self.base).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn get(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        let file = self.resolve(path);
        fs::read(&file).map_err(|err| unavailable(path, err))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        if path.is_empty() {
            return Err(unavailable(path, "empty path"));
        }
        let file = self.resolve(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|err| unavailable(path, err))?;
        }
        fs::write(&file, bytes).map_err(|err| unavailable(path, err))
    }

    fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        Ok(self.resolve(path).is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<LogicalPath>, PipelineError> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<LogicalPath> = WalkDir::new(&self.base)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.relative_logical(entry.path()))
            .filter(|logical| logical.starts_with(prefix))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_creates_parent_directories_and_get_reads_back() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        store
            .put("run_2026-08-04/preprocess/dict.csv", b"alpha\nbeta\n")
            .unwrap();
        assert!(store.exists("run_2026-08-04/preprocess/dict.csv").unwrap());
        assert_eq!(
            store.get("run_2026-08-04/preprocess/dict.csv").unwrap(),
            b"alpha\nbeta\n".to_vec()
        );
        assert!(dir
            .path()
            .join("run_2026-08-04")
            .join("preprocess")
            .join("dict.csv")
            .is_file());
    }

    #[test]
    fn get_on_missing_path_reports_the_path() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let err = store.get("run_x/model/model.state").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Artifact { path, .. } if path == "run_x/model/model.state"
        ));
    }

    #[test]
    fn list_returns_sorted_logical_paths_under_prefix() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.put("run_a/model/model.state", b"1").unwrap();
        store.put("run_a/model/model.lambda", b"2").unwrap();
        store.put("run_a/train/TOPIC_TRY.csv", b"3").unwrap();

        let listed = store.list("run_a/model").unwrap();
        assert_eq!(
            listed,
            vec![
                "run_a/model/model.lambda".to_string(),
                "run_a/model/model.state".to_string(),
            ]
        );
    }

    #[test]
    fn list_on_missing_base_is_empty() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("never_written"));
        assert!(store.list("").unwrap().is_empty());
    }
}
