//! Page jobs and their state machine.
//!
//! ```text
//! pending ──▶ processing ──▶ completed
//!    │             │
//!    └─────────────┴───────▶ failed
//! ```
//!
//! `completed` and `failed` are terminal: once a job reaches either, every
//! further transition is refused. A job may go straight from `pending` to
//! `failed` when the document it belongs to cannot be opened at all.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one page job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_become(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page {page}: cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub page: usize,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One page's unit of work and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageJob {
    /// 1-indexed page number within the document.
    pub page_index: usize,
    /// Problem record this page is persisted to.
    pub problem_id: String,
    pub raw_text: Option<String>,
    pub markdown: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl PageJob {
    pub fn new(page_index: usize, problem_id: impl Into<String>) -> Self {
        Self {
            page_index,
            problem_id: problem_id.into(),
            raw_text: None,
            markdown: None,
            status: JobStatus::Pending,
            error: None,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_become(to) {
            return Err(InvalidTransition {
                page: self.page_index,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Processing)
    }

    /// Record the page's content. Empty pages complete too, with the sentinel as Markdown.
    pub fn complete(
        &mut self,
        raw_text: String,
        markdown: String,
    ) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed)?;
        self.raw_text = Some(raw_text);
        self.markdown = Some(markdown);
        Ok(())
    }

    pub fn fail(&mut self, error: &PageError) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.to_string());
        Ok(())
    }
}

/// The jobs of one document, indexed by page number.
///
/// Owned by the orchestrator for the duration of a run; each slot is written
/// to its terminal state once.
#[derive(Debug, Clone, Default)]
pub struct JobArena {
    jobs: Vec<PageJob>,
}

impl JobArena {
    /// Build an arena from jobs in any order; they are sorted by page.
    pub fn new(mut jobs: Vec<PageJob>) -> Self {
        jobs.sort_by_key(|j| j.page_index);
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, page_index: usize) -> Option<&PageJob> {
        self.position(page_index).map(|i| &self.jobs[i])
    }

    pub fn get_mut(&mut self, page_index: usize) -> Option<&mut PageJob> {
        self.position(page_index).map(move |i| &mut self.jobs[i])
    }

    fn position(&self, page_index: usize) -> Option<usize> {
        self.jobs
            .binary_search_by_key(&page_index, |j| j.page_index)
            .ok()
    }

    /// Page numbers of jobs that have not started yet.
    pub fn pending_pages(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.page_index)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageJob> {
        self.jobs.iter()
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn into_jobs(self) -> Vec<PageJob> {
        self.jobs
    }
}

/// Summary of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Every job in its final state, in page order.
    pub jobs: Vec<PageJob>,
    pub completed: usize,
    pub failed: usize,
    /// Whether the staged file was removed.
    pub file_removed: bool,
}

impl ProcessingReport {
    pub fn from_arena(arena: JobArena, file_removed: bool) -> Self {
        let completed = arena.count(JobStatus::Completed);
        let failed = arena.count(JobStatus::Failed);
        Self {
            jobs: arena.into_jobs(),
            completed,
            failed,
            file_removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut job = PageJob::new(1, "p-1");
        job.start().unwrap();
        job.complete("raw".into(), "md".into()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.markdown.as_deref(), Some("md"));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = PageJob::new(2, "p-2");
        job.start().unwrap();
        job.fail(&PageError::Internal {
            page: 2,
            detail: "x".into(),
        })
        .unwrap();
        let err = job.complete("raw".into(), "md".into()).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert!(job.markdown.is_none());
    }

    #[test]
    fn pending_can_fail_directly() {
        let mut job = PageJob::new(3, "p-3");
        job.fail(&PageError::Orchestration {
            detail: "cannot open".into(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("cannot open"));
    }

    #[test]
    fn pending_cannot_complete_without_starting() {
        let mut job = PageJob::new(1, "p");
        assert!(job.complete(String::new(), String::new()).is_err());
    }

    #[test]
    fn arena_is_indexed_by_page() {
        let arena = JobArena::new(vec![PageJob::new(3, "c"), PageJob::new(1, "a"), PageJob::new(2, "b")]);
        assert_eq!(arena.get(2).unwrap().problem_id, "b");
        assert_eq!(arena.pending_pages(), vec![1, 2, 3]);
        assert!(arena.get(4).is_none());
        assert!(!arena.all_terminal());
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Completed).unwrap(), "\"completed\"");
    }
}
