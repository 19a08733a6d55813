//! Persisting page outcomes to problem records.
//!
//! A failed write never takes the pipeline down. The sink tries one
//! corrective write marking the record `failed`; if that is rejected as well
//! the record is left as it was and the failure is logged.

use crate::job::{JobStatus, PageJob};
use crate::pipeline::classify::extract_math_expressions;
use crate::pipeline::markdown::FAILED_PAGE;
use crate::store::{DocumentStore, ProblemStatus, ProblemUpdate};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Writes terminal [`PageJob`]s to the [`DocumentStore`].
#[derive(Clone)]
pub struct ResultSink {
    store: Arc<dyn DocumentStore>,
}

impl ResultSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Apply a job's terminal outcome to its record.
    ///
    /// Returns true when the outcome was written. On false the record has
    /// either been marked `failed` by the corrective write or, if that also
    /// failed, left untouched.
    pub async fn commit(&self, job: &PageJob) -> bool {
        let update = match outcome_update(job) {
            Some(update) => update,
            None => {
                warn!(
                    problem_id = %job.problem_id,
                    status = %job.status,
                    "refusing to commit a job that has not finished"
                );
                return false;
            }
        };

        if self.store.update(&job.problem_id, update).await {
            debug!(problem_id = %job.problem_id, page = job.page_index, status = %job.status, "committed");
            return true;
        }

        warn!(
            problem_id = %job.problem_id,
            page = job.page_index,
            "Failed to store result, marking problem as failed"
        );
        let corrective = ProblemUpdate {
            status: Some(ProblemStatus::Failed),
            error: Some(format!(
                "Failed to store processing result for page {}",
                job.page_index
            )),
            ..ProblemUpdate::default()
        };
        if !self.store.update(&job.problem_id, corrective).await {
            error!(
                problem_id = %job.problem_id,
                page = job.page_index,
                "Corrective write failed; problem record left unchanged"
            );
        }
        false
    }
}

fn outcome_update(job: &PageJob) -> Option<ProblemUpdate> {
    match job.status {
        JobStatus::Completed => {
            let raw = job.raw_text.clone().unwrap_or_default();
            Some(ProblemUpdate {
                math_expressions: Some(extract_math_expressions(&raw)),
                extracted_text: Some(raw),
                markdown_content: job.markdown.clone(),
                status: Some(ProblemStatus::Completed),
                error: None,
            })
        }
        JobStatus::Failed => Some(ProblemUpdate {
            markdown_content: Some(FAILED_PAGE.to_string()),
            status: Some(ProblemStatus::Failed),
            error: Some(
                job.error
                    .clone()
                    .unwrap_or_else(|| "processing failed".to_string()),
            ),
            ..ProblemUpdate::default()
        }),
        JobStatus::Pending | JobStatus::Processing => None,
    }
}
