//! Artifact store interfaces and backends.
//!
//! Ownership model:
//! - `ArtifactStore` is the stage-facing interface for byte blobs at logical
//!   `/`-separated paths; it carries no pipeline logic of its own.
//! - Every component receives its store handle explicitly; there is no
//!   ambient client or credential global.

use crate::errors::PipelineError;
use crate::types::LogicalPath;

/// Filesystem-backed store implementation.
pub mod fs;
/// In-memory store implementation used by tests and dry runs.
pub mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Stage-facing blob store addressed by logical paths.
///
/// Operations are synchronous, blocking I/O. A failed operation aborts the
/// calling run; nothing is retried here.
pub trait ArtifactStore: Send + Sync {
    /// Fetch the blob at `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>, PipelineError>;
    /// Write `bytes` at `path`, replacing any existing blob.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PipelineError>;
    /// True if a blob exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, PipelineError>;
    /// All blob paths under `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> Result<Vec<LogicalPath>, PipelineError>;
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<T> {
    fn get(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        (**self).get(path)
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        (**self).put(path, bytes)
    }

    fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        (**self).exists(path)
    }

    fn list(&self, prefix: &str) -> Result<Vec<LogicalPath>, PipelineError> {
        (**self).list(prefix)
    }
}

pub(crate) fn unavailable(path: &str, reason: impl ToString) -> PipelineError {
    PipelineError::Artifact {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
