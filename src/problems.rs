//! Managing a user's problem records after upload: listing, lookup, manual
//! edits, search, retrieval of the original PDF and deletion.
//!
//! Every operation takes the requesting user and the user whose records are
//! addressed. They must be the same, and the record itself must belong to
//! that user, otherwise the call fails with [`PipelineError::AccessDenied`].

use crate::error::PipelineError;
use crate::store::{BlobStore, DocumentStore, ProblemRecord, ProblemStatus, ProblemUpdate, BLOB_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Largest page a listing may return.
pub const MAX_LIST_LIMIT: usize = 100;
/// Largest number of search hits returned.
pub const MAX_SEARCH_LIMIT: usize = 50;
/// Upper bound on records scanned by search and shared-file checks.
const SCAN_LIMIT: usize = 1000;

/// Manual edit of a record. Only these fields may be changed by a user;
/// unknown fields in a deserialized request are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemEdit {
    pub status: Option<ProblemStatus>,
    pub extracted_text: Option<String>,
    pub math_expressions: Option<Vec<String>>,
}

impl ProblemEdit {
    fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.extracted_text.is_some() {
            names.push("extracted_text");
        }
        if self.math_expressions.is_some() {
            names.push("math_expressions");
        }
        names
    }
}

impl From<ProblemEdit> for ProblemUpdate {
    fn from(edit: ProblemEdit) -> Self {
        ProblemUpdate {
            status: edit.status,
            extracted_text: edit.extracted_text,
            math_expressions: edit.math_expressions,
            ..ProblemUpdate::default()
        }
    }
}

/// Outcome of [`update_problem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditReceipt {
    pub problem_id: String,
    pub updated_fields: Vec<String>,
}

/// Outcome of [`delete_problem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub problem_id: String,
    /// The stored PDF was removed along with the record.
    pub file_deleted: bool,
}

fn ensure_self(requesting_user: &str, user_id: &str) -> Result<(), PipelineError> {
    if requesting_user == user_id {
        Ok(())
    } else {
        Err(PipelineError::AccessDenied {
            id: format!("problems of {user_id}"),
        })
    }
}

/// Fetch `problem_id`, checking it exists and belongs to `user_id`.
async fn owned_record(
    store: &dyn DocumentStore,
    user_id: &str,
    problem_id: &str,
) -> Result<ProblemRecord, PipelineError> {
    let record = store
        .get(problem_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound {
            id: problem_id.to_string(),
        })?;
    if record.user_id != user_id {
        return Err(PipelineError::AccessDenied {
            id: problem_id.to_string(),
        });
    }
    Ok(record)
}

/// A page of `user_id`'s records, newest first.
///
/// `limit` must be within `1..=MAX_LIST_LIMIT`.
pub async fn list_problems(
    store: &dyn DocumentStore,
    requesting_user: &str,
    user_id: &str,
    status: Option<ProblemStatus>,
    limit: usize,
    offset: usize,
) -> Result<Vec<ProblemRecord>, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(PipelineError::Validation(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }
    store.query_by_user(user_id, status, limit, offset).await
}

pub async fn get_problem(
    store: &dyn DocumentStore,
    requesting_user: &str,
    user_id: &str,
    problem_id: &str,
) -> Result<ProblemRecord, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    owned_record(store, user_id, problem_id).await
}

/// Apply a manual edit. An edit that sets no field is rejected.
pub async fn update_problem(
    store: &dyn DocumentStore,
    requesting_user: &str,
    user_id: &str,
    problem_id: &str,
    edit: ProblemEdit,
) -> Result<EditReceipt, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    owned_record(store, user_id, problem_id).await?;

    let fields = edit.field_names();
    if fields.is_empty() {
        return Err(PipelineError::Validation("No valid fields to update".into()));
    }
    if !store.update(problem_id, edit.into()).await {
        return Err(PipelineError::Store(
            "Failed to update problem in database".into(),
        ));
    }
    debug!(problem_id, ?fields, "problem edited");
    Ok(EditReceipt {
        problem_id: problem_id.to_string(),
        updated_fields: fields.into_iter().map(String::from).collect(),
    })
}

/// Case-insensitive substring search over filename, extracted text and math
/// expressions. At most `limit` hits, newest first.
pub async fn search_problems(
    store: &dyn DocumentStore,
    requesting_user: &str,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<ProblemRecord>, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(PipelineError::Validation(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}"
        )));
    }

    let needle = query.trim().to_lowercase();
    let records = store.query_by_user(user_id, None, SCAN_LIMIT, 0).await?;
    Ok(records
        .into_iter()
        .filter(|r| matches_query(r, &needle))
        .take(limit)
        .collect())
}

fn matches_query(record: &ProblemRecord, needle: &str) -> bool {
    record.original_filename.to_lowercase().contains(needle)
        || record
            .extracted_text
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle))
        || record.math_expressions.join(" ").to_lowercase().contains(needle)
}

/// Copy the original PDF of a record to `destination`.
///
/// Blob-backed records are downloaded; records that kept a local path are
/// copied from it, which fails once the staged upload has been cleaned up.
pub async fn problem_file(
    store: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    requesting_user: &str,
    user_id: &str,
    problem_id: &str,
    destination: &Path,
) -> Result<PathBuf, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    let record = owned_record(store, user_id, problem_id).await?;

    if record.file_path.starts_with(BLOB_PREFIX) {
        return blobs.download(&record.file_path, destination).await;
    }
    let source = PathBuf::from(&record.file_path);
    match tokio::fs::copy(&source, destination).await {
        Ok(_) => Ok(destination.to_path_buf()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PipelineError::FileNotFound { path: source })
        }
        Err(e) => Err(PipelineError::Internal(format!(
            "Cannot copy {}: {}",
            source.display(),
            e
        ))),
    }
}

/// Delete a record, and its stored PDF once no other record of the user
/// refers to it.
///
/// Failing to remove the file is logged and does not stop the deletion.
pub async fn delete_problem(
    store: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    requesting_user: &str,
    user_id: &str,
    problem_id: &str,
) -> Result<DeleteReceipt, PipelineError> {
    ensure_self(requesting_user, user_id)?;
    let record = owned_record(store, user_id, problem_id).await?;

    let mut file_deleted = false;
    if record.file_path.starts_with(BLOB_PREFIX) {
        let siblings = store.query_by_user(user_id, None, SCAN_LIMIT, 0).await?;
        let shared = siblings
            .iter()
            .any(|r| r.id != record.id && r.file_path == record.file_path);
        if shared {
            debug!(problem_id, "stored file still used by other pages");
        } else {
            file_deleted = blobs.delete(&record.file_path).await;
            if !file_deleted {
                warn!("Failed to delete file from storage: {}", record.file_path);
            }
        }
    }

    if !store.delete(problem_id).await {
        return Err(PipelineError::Store(
            "Failed to delete problem from database".into(),
        ));
    }
    info!(problem_id, file_deleted, "problem deleted");
    Ok(DeleteReceipt {
        problem_id: problem_id.to_string(),
        file_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDocumentStore, LocalBlobStore};

    const KEY: &str = "problems/alice/sheet.pdf";

    async fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for page in 1..=2 {
            let mut r = ProblemRecord::new(format!("a{page}"), "alice", "Algebra.pdf", KEY, Some(page));
            r.status = ProblemStatus::Completed;
            r.extracted_text = Some(format!("Solve page {page}"));
            r.math_expressions = vec![format!("x = {page}")];
            store.create(r).await.unwrap();
        }
        store
            .create(ProblemRecord::new("b1", "bob", "geometry.pdf", "problems/bob/g.pdf", Some(1)))
            .await
            .unwrap();
        store
    }

    async fn bucket_with_key(dir: &tempfile::TempDir) -> LocalBlobStore {
        let blobs = LocalBlobStore::new(dir.path().join("bucket"));
        let src = dir.path().join("sheet.pdf");
        tokio::fs::write(&src, b"%PDF-1.7").await.unwrap();
        blobs.upload(&src, KEY).await.unwrap();
        blobs
    }

    #[tokio::test]
    async fn listing_is_own_only_and_bounded() {
        let store = seeded().await;
        let all = list_problems(&store, "alice", "alice", None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        let paged = list_problems(&store, "alice", "alice", None, 1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
        let pending = list_problems(&store, "alice", "alice", Some(ProblemStatus::Pending), 10, 0)
            .await
            .unwrap();
        assert!(pending.is_empty());

        assert!(matches!(
            list_problems(&store, "alice", "bob", None, 10, 0).await,
            Err(PipelineError::AccessDenied { .. })
        ));
        for bad in [0, MAX_LIST_LIMIT + 1] {
            assert!(matches!(
                list_problems(&store, "alice", "alice", None, bad, 0).await,
                Err(PipelineError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn lookup_checks_record_owner() {
        let store = seeded().await;
        assert_eq!(get_problem(&store, "alice", "alice", "a1").await.unwrap().id, "a1");
        assert!(matches!(
            get_problem(&store, "alice", "alice", "b1").await,
            Err(PipelineError::AccessDenied { .. })
        ));
        assert!(matches!(
            get_problem(&store, "alice", "alice", "nope").await,
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn edit_changes_only_allowed_fields() {
        let store = seeded().await;
        let receipt = update_problem(
            &store,
            "alice",
            "alice",
            "a1",
            ProblemEdit {
                status: Some(ProblemStatus::Pending),
                math_expressions: Some(vec!["y = 2".into()]),
                ..ProblemEdit::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(receipt.updated_fields, vec!["status", "math_expressions"]);

        let r = store.get("a1").await.unwrap().unwrap();
        assert_eq!(r.status, ProblemStatus::Pending);
        assert_eq!(r.math_expressions, vec!["y = 2".to_string()]);
        assert_eq!(r.extracted_text.as_deref(), Some("Solve page 1"));
    }

    #[tokio::test]
    async fn empty_edit_is_rejected() {
        let store = seeded().await;
        let err = update_problem(&store, "alice", "alice", "a1", ProblemEdit::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("No valid fields"));
    }

    #[test]
    fn edit_ignores_unknown_fields() {
        let edit: ProblemEdit =
            serde_json::from_str(r#"{"markdown_content":"x","user_id":"eve"}"#).unwrap();
        assert!(edit.field_names().is_empty());
    }

    #[tokio::test]
    async fn search_covers_filename_text_and_expressions() {
        let store = seeded().await;
        let by_name = search_problems(&store, "alice", "alice", "ALGEBRA", 10).await.unwrap();
        assert_eq!(by_name.len(), 2);
        let by_text = search_problems(&store, "alice", "alice", " page 2 ", 10).await.unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].id, "a2");
        let by_expr = search_problems(&store, "alice", "alice", "x = 1", 10).await.unwrap();
        assert_eq!(by_expr.len(), 1);
        let capped = search_problems(&store, "alice", "alice", "solve", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert!(search_problems(&store, "alice", "alice", "geometry", 10)
            .await
            .unwrap()
            .is_empty());
        assert!(search_problems(&store, "alice", "alice", "x", MAX_SEARCH_LIMIT + 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn original_file_is_downloaded_from_blob_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded().await;
        let blobs = bucket_with_key(&dir).await;

        let out = dir.path().join("copy.pdf");
        problem_file(&store, &blobs, "alice", "alice", "a1", &out).await.unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryDocumentStore::new();
        let gone = dir.path().join("uploads/gone.pdf");
        store
            .create(ProblemRecord::new("l1", "alice", "x.pdf", gone.display().to_string(), None))
            .await
            .unwrap();
        let blobs = LocalBlobStore::new(dir.path().join("bucket"));

        let err = problem_file(&store, &blobs, "alice", "alice", "l1", &dir.path().join("o.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn shared_file_survives_until_last_page_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded().await;
        let blobs = bucket_with_key(&dir).await;
        let stored = dir.path().join("bucket").join(KEY);

        let first = delete_problem(&store, &blobs, "alice", "alice", "a1").await.unwrap();
        assert!(!first.file_deleted);
        assert!(stored.exists());
        assert!(store.get("a1").await.unwrap().is_none());

        let last = delete_problem(&store, &blobs, "alice", "alice", "a2").await.unwrap();
        assert!(last.file_deleted);
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn delete_goes_ahead_when_file_removal_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded().await;
        let blobs = LocalBlobStore::new(dir.path().join("empty-bucket"));

        let receipt = delete_problem(&store, &blobs, "bob", "bob", "b1").await.unwrap();
        assert!(!receipt.file_deleted);
        assert!(store.get("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_checks_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded().await;
        let blobs = bucket_with_key(&dir).await;
        assert!(matches!(
            delete_problem(&store, &blobs, "bob", "bob", "a1").await,
            Err(PipelineError::AccessDenied { .. })
        ));
        assert!(matches!(
            delete_problem(&store, &blobs, "bob", "alice", "a1").await,
            Err(PipelineError::AccessDenied { .. })
        ));
        assert!(store.get("a1").await.unwrap().is_some());
    }
}
