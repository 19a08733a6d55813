//! Problem records and the external stores they live in.
//!
//! The pipeline does not care which database or object store sits behind it.
//! [`DocumentStore`] is a keyed get/update/query interface over
//! [`ProblemRecord`]s and [`BlobStore`] is upload/download/delete over
//! files. In-memory and directory-backed implementations are provided for the
//! CLI, tests, and single-node deployments.

use crate::error::PipelineError;
use crate::job::JobStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Processing state of a problem record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<JobStatus> for ProblemStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => ProblemStatus::Pending,
            JobStatus::Processing => ProblemStatus::Processing,
            JobStatus::Completed => ProblemStatus::Completed,
            JobStatus::Failed => ProblemStatus::Failed,
        }
    }
}

impl fmt::Display for ProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(
            &match self {
                ProblemStatus::Pending => JobStatus::Pending,
                ProblemStatus::Processing => JobStatus::Processing,
                ProblemStatus::Completed => JobStatus::Completed,
                ProblemStatus::Failed => JobStatus::Failed,
            },
            f,
        )
    }
}

/// One math problem, usually one page of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub id: String,
    pub user_id: String,
    pub original_filename: String,
    /// Blob key of the upload, or the local path when the blob upload failed.
    pub file_path: String,
    /// Page of the original PDF; `None` for merged documents.
    pub page_number: Option<usize>,
    pub extracted_text: Option<String>,
    pub markdown_content: Option<String>,
    pub math_expressions: Vec<String>,
    pub status: ProblemStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProblemRecord {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        original_filename: impl Into<String>,
        file_path: impl Into<String>,
        page_number: Option<usize>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            original_filename: original_filename.into(),
            file_path: file_path.into(),
            page_number,
            extracted_text: None,
            markdown_content: None,
            math_expressions: Vec::new(),
            status: ProblemStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Markdown is available and processing finished successfully.
    pub fn is_ready_to_solve(&self) -> bool {
        self.markdown_content.is_some() && self.status == ProblemStatus::Completed
    }

    /// Merge the set fields of `update` into this record.
    pub fn apply(&mut self, update: ProblemUpdate) {
        if let Some(text) = update.extracted_text {
            self.extracted_text = Some(text);
        }
        if let Some(md) = update.markdown_content {
            self.markdown_content = Some(md);
        }
        if let Some(exprs) = update.math_expressions {
            self.math_expressions = exprs;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }
}

/// Partial update of a [`ProblemRecord`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemUpdate {
    pub extracted_text: Option<String>,
    pub markdown_content: Option<String>,
    pub math_expressions: Option<Vec<String>>,
    pub status: Option<ProblemStatus>,
    pub error: Option<String>,
}

impl ProblemUpdate {
    pub fn status(status: ProblemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Keyed storage for problem records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record. Fails if the id is taken or the store is down.
    async fn create(&self, record: ProblemRecord) -> Result<(), PipelineError>;

    async fn get(&self, id: &str) -> Result<Option<ProblemRecord>, PipelineError>;

    /// Merge `update` into the record and stamp `updated_at`.
    ///
    /// Returns false instead of failing when the write does not happen.
    async fn update(&self, id: &str, update: ProblemUpdate) -> bool;

    /// A user's records, newest first, optionally filtered by status.
    async fn query_by_user(
        &self,
        user_id: &str,
        status: Option<ProblemStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProblemRecord>, PipelineError>;

    async fn delete(&self, id: &str) -> bool;
}

/// [`DocumentStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    records: RwLock<HashMap<String, ProblemRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, record: ProblemRecord) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(PipelineError::Store(format!(
                "problem '{}' already exists",
                record.id
            )));
        }
        debug!(problem_id = %record.id, "created problem record");
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ProblemRecord>, PipelineError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: ProblemUpdate) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                record.apply(update);
                record.updated_at = Utc::now();
                true
            }
            None => {
                warn!(problem_id = %id, "update for unknown problem");
                false
            }
        }
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        status: Option<ProblemStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProblemRecord>, PipelineError> {
        let records = self.records.read().await;
        let mut matching: Vec<ProblemRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.page_number.cmp(&b.page_number))
        });
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: &str) -> bool {
        self.records.write().await.remove(id).is_some()
    }
}

/// Key prefix of uploads kept in a [`BlobStore`]. A record whose
/// `file_path` lacks it points at a local file instead.
pub const BLOB_PREFIX: &str = "problems/";

/// File storage for uploaded PDFs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `local_path` under `remote_key` and return its URL.
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, PipelineError>;

    async fn download(&self, remote_key: &str, destination: &Path) -> Result<PathBuf, PipelineError>;

    async fn delete(&self, remote_key: &str) -> bool;
}

/// [`BlobStore`] that copies files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote_key: &str) -> Result<PathBuf, PipelineError> {
        if remote_key.split('/').any(|seg| seg == "..") {
            return Err(PipelineError::Blob(format!("invalid key '{remote_key}'")));
        }
        Ok(self.root.join(remote_key.trim_start_matches('/')))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, PipelineError> {
        let target = self.resolve(remote_key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Blob(format!("File upload failed: {e}")))?;
        }
        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| PipelineError::Blob(format!("File upload failed: {e}")))?;
        Ok(format!("file://{}", target.display()))
    }

    async fn download(&self, remote_key: &str, destination: &Path) -> Result<PathBuf, PipelineError> {
        let source = self.resolve(remote_key)?;
        tokio::fs::copy(&source, destination)
            .await
            .map_err(|e| PipelineError::Blob(format!("File download failed: {e}")))?;
        Ok(destination.to_path_buf())
    }

    async fn delete(&self, remote_key: &str) -> bool {
        let Ok(target) = self.resolve(remote_key) else {
            return false;
        };
        match tokio::fs::remove_file(&target).await {
            Ok(()) => true,
            Err(e) => {
                warn!("File deletion failed: {}", e);
                false
            }
        }
    }
}

/// [`BlobStore`] used when no storage is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredBlobStore;

#[async_trait]
impl BlobStore for UnconfiguredBlobStore {
    async fn upload(&self, _local_path: &Path, _remote_key: &str) -> Result<String, PipelineError> {
        Err(PipelineError::Blob("storage not initialized".into()))
    }

    async fn download(&self, _remote_key: &str, _destination: &Path) -> Result<PathBuf, PipelineError> {
        Err(PipelineError::Blob("storage not initialized".into()))
    }

    async fn delete(&self, _remote_key: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_merges_and_stamps() {
        let store = InMemoryDocumentStore::new();
        let record = ProblemRecord::new("p1", "u1", "hw.pdf", "problems/u1/p1.pdf", Some(1));
        let created = record.updated_at;
        store.create(record).await.unwrap();

        let ok = store
            .update(
                "p1",
                ProblemUpdate {
                    markdown_content: Some("## Q".into()),
                    status: Some(ProblemStatus::Completed),
                    ..Default::default()
                },
            )
            .await;
        assert!(ok);

        let got = store.get("p1").await.unwrap().unwrap();
        assert_eq!(got.markdown_content.as_deref(), Some("## Q"));
        assert_eq!(got.original_filename, "hw.pdf");
        assert!(got.updated_at >= created);
        assert!(got.is_ready_to_solve());
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_false() {
        let store = InMemoryDocumentStore::new();
        assert!(!store.update("nope", ProblemUpdate::default()).await);
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = InMemoryDocumentStore::new();
        store
            .create(ProblemRecord::new("p1", "u", "a.pdf", "a", None))
            .await
            .unwrap();
        assert!(store
            .create(ProblemRecord::new("p1", "u", "a.pdf", "a", None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn query_filters_and_paginates() {
        let store = InMemoryDocumentStore::new();
        for page in 1..=4 {
            let mut r = ProblemRecord::new(format!("p{page}"), "u1", "a.pdf", "a", Some(page));
            if page % 2 == 0 {
                r.status = ProblemStatus::Completed;
            }
            store.create(r).await.unwrap();
        }
        store
            .create(ProblemRecord::new("other", "u2", "b.pdf", "b", None))
            .await
            .unwrap();

        let all = store.query_by_user("u1", None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 4);
        let done = store
            .query_by_user("u1", Some(ProblemStatus::Completed), 10, 0)
            .await
            .unwrap();
        assert_eq!(done.len(), 2);
        let page = store.query_by_user("u1", None, 2, 3).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn local_blob_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        tokio::fs::write(&src, b"%PDF-1.4").await.unwrap();

        let blobs = LocalBlobStore::new(dir.path().join("bucket"));
        let url = blobs.upload(&src, "problems/u1/x.pdf").await.unwrap();
        assert!(url.starts_with("file://"));

        let out = dir.path().join("out.pdf");
        blobs.download("problems/u1/x.pdf", &out).await.unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"%PDF-1.4");
        assert!(blobs.delete("problems/u1/x.pdf").await);
        assert!(!blobs.delete("problems/u1/x.pdf").await);
    }

    #[tokio::test]
    async fn blob_keys_cannot_escape_root() {
        let blobs = LocalBlobStore::new("/tmp/bucket");
        assert!(blobs.upload(Path::new("/etc/hosts"), "../escape").await.is_err());
    }

    #[test]
    fn delete_removes_record() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            store
                .create(ProblemRecord::new("p1", "u", "a.pdf", "a", None))
                .await
                .unwrap();
            assert!(store.delete("p1").await);
            assert!(!store.delete("p1").await);
            assert!(store.is_empty().await);
        });
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ProblemStatus::Processing.to_string(), "processing");
        assert_eq!(ProblemStatus::from(JobStatus::Failed), ProblemStatus::Failed);
    }
}
