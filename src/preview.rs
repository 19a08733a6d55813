//! Read side: previews of processed problems and per-user statistics.

use crate::error::PipelineError;
use crate::store::{DocumentStore, ProblemRecord, ProblemStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on records scanned for statistics.
const STATS_SCAN_LIMIT: usize = 1000;

/// What a user sees of one processed problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemPreview {
    pub problem_id: String,
    pub original_filename: String,
    pub page_number: Option<usize>,
    pub markdown_content: Option<String>,
    pub status: ProblemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_ready_to_solve: bool,
}

impl From<&ProblemRecord> for ProblemPreview {
    fn from(record: &ProblemRecord) -> Self {
        Self {
            problem_id: record.id.clone(),
            original_filename: record.original_filename.clone(),
            page_number: record.page_number,
            markdown_content: record.markdown_content.clone(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            is_ready_to_solve: record.is_ready_to_solve(),
        }
    }
}

/// Preview or error for one requested id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewEntry {
    Found(ProblemPreview),
    Missing { problem_id: String, error: String },
}

/// Result of previewing several problems at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPreview {
    pub total_requested: usize,
    pub total_found: usize,
    pub problems: Vec<PreviewEntry>,
}

/// Fetch `problem_id` on behalf of `user_id`.
pub async fn preview(
    store: &dyn DocumentStore,
    user_id: &str,
    problem_id: &str,
) -> Result<ProblemPreview, PipelineError> {
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
    Ok(ProblemPreview::from(&record))
}

/// Preview a comma-separated list of ids; failures are reported per id.
pub async fn preview_many(
    store: &dyn DocumentStore,
    user_id: &str,
    problem_ids: &str,
) -> Result<BatchPreview, PipelineError> {
    let ids: Vec<&str> = problem_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(PipelineError::Validation("No problem IDs provided".into()));
    }

    let mut problems = Vec::with_capacity(ids.len());
    for id in &ids {
        let entry = match preview(store, user_id, id).await {
            Ok(p) => PreviewEntry::Found(p),
            Err(PipelineError::NotFound { .. }) => PreviewEntry::Missing {
                problem_id: id.to_string(),
                error: "Problem not found".into(),
            },
            Err(PipelineError::AccessDenied { .. }) => PreviewEntry::Missing {
                problem_id: id.to_string(),
                error: "Access denied".into(),
            },
            Err(e) => PreviewEntry::Missing {
                problem_id: id.to_string(),
                error: e.to_string(),
            },
        };
        problems.push(entry);
    }

    let total_found = problems
        .iter()
        .filter(|p| matches!(p, PreviewEntry::Found(_)))
        .count();
    Ok(BatchPreview {
        total_requested: ids.len(),
        total_found,
        problems,
    })
}

/// Counts by status, for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_problems: usize,
    pub status_counts: StatusCounts,
    /// Created within the last seven days.
    pub recent_problems: usize,
    pub total_math_expressions: usize,
}

/// Statistics over a user's records. Only the user themselves may ask.
pub async fn user_stats(
    store: &dyn DocumentStore,
    requesting_user: &str,
    user_id: &str,
) -> Result<UserStats, PipelineError> {
    if requesting_user != user_id {
        return Err(PipelineError::AccessDenied {
            id: format!("stats of {user_id}"),
        });
    }
    let records = store
        .query_by_user(user_id, None, STATS_SCAN_LIMIT, 0)
        .await?;
    Ok(stats_at(&records, Utc::now()))
}

fn stats_at(records: &[ProblemRecord], now: DateTime<Utc>) -> UserStats {
    let recent_cutoff = now - Duration::days(7);
    let mut stats = UserStats {
        total_problems: records.len(),
        ..UserStats::default()
    };
    for r in records {
        match r.status {
            ProblemStatus::Pending => stats.status_counts.pending += 1,
            ProblemStatus::Processing => stats.status_counts.processing += 1,
            ProblemStatus::Completed => stats.status_counts.completed += 1,
            ProblemStatus::Failed => stats.status_counts.failed += 1,
        }
        if r.created_at > recent_cutoff {
            stats.recent_problems += 1;
        }
        stats.total_math_expressions += r.math_expressions.len();
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDocumentStore, ProblemUpdate};

    async fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store
            .create(ProblemRecord::new("a", "alice", "hw.pdf", "k", Some(1)))
            .await
            .unwrap();
        store
            .create(ProblemRecord::new("b", "bob", "hw.pdf", "k", Some(1)))
            .await
            .unwrap();
        store
            .update(
                "a",
                ProblemUpdate {
                    markdown_content: Some("## Q".into()),
                    math_expressions: Some(vec!["x = 1".into(), "2/3".into()]),
                    status: Some(ProblemStatus::Completed),
                    ..Default::default()
                },
            )
            .await;
        store
    }

    #[tokio::test]
    async fn preview_checks_ownership() {
        let store = seeded().await;
        let p = preview(&store, "alice", "a").await.unwrap();
        assert!(p.is_ready_to_solve);

        assert!(matches!(
            preview(&store, "alice", "b").await,
            Err(PipelineError::AccessDenied { .. })
        ));
        assert!(matches!(
            preview(&store, "alice", "zzz").await,
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn processing_record_is_not_ready() {
        let store = seeded().await;
        let p = preview(&store, "bob", "b").await.unwrap();
        assert!(!p.is_ready_to_solve);
    }

    #[tokio::test]
    async fn batch_reports_per_id_errors() {
        let store = seeded().await;
        let batch = preview_many(&store, "alice", "a, b ,missing,").await.unwrap();
        assert_eq!(batch.total_requested, 3);
        assert_eq!(batch.total_found, 1);
        assert!(matches!(
            &batch.problems[1],
            PreviewEntry::Missing { error, .. } if error == "Access denied"
        ));
        assert!(preview_many(&store, "alice", " , ").await.is_err());
    }

    #[tokio::test]
    async fn stats_are_own_only() {
        let store = seeded().await;
        let stats = user_stats(&store, "alice", "alice").await.unwrap();
        assert_eq!(stats.total_problems, 1);
        assert_eq!(stats.status_counts.completed, 1);
        assert_eq!(stats.recent_problems, 1);
        assert_eq!(stats.total_math_expressions, 2);
        assert!(user_stats(&store, "alice", "bob").await.is_err());
    }

    #[test]
    fn old_records_are_not_recent() {
        let mut r = ProblemRecord::new("a", "u", "f", "k", None);
        r.created_at = Utc::now() - Duration::days(30);
        assert_eq!(stats_at(&[r], Utc::now()).recent_problems, 0);
    }
}
