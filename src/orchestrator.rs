//! Driving one uploaded document from page jobs to terminal records.
//!
//! ## Multi-problem mode
//!
//! ```text
//! open ──▶ start jobs ──▶ page stream ──▶ settle + commit ──▶ barrier
//!  │                     (completion order)                     │
//!  └─ open failed: every pending job ─▶ failed ─▶ commit ───────┘
//! ```
//!
//! Each page is committed the moment it comes off the stream, so a fast
//! page is never held back by a slow one. A job's arena slot is written to
//! its terminal state exactly once, after the sink has answered.
//!
//! ## Single-document mode
//!
//! All pages are structured, merged with [`assemble_document`], and stored
//! on one record. Any failed page fails that record.
//!
//! In both modes the staged file is removed by the [`CompletionBarrier`]
//! once the last job is terminal, and by a [`CleanupGuard`] on any other
//! way out.

use crate::cleanup::{CleanupGuard, CompletionBarrier, StagedFile};
use crate::config::{PipelineConfig, ProcessingMode};
use crate::error::PageError;
use crate::job::{JobArena, JobStatus, PageJob, ProcessingReport};
use crate::output::PageResult;
use crate::pipeline::document::{DocumentOpener, PdfiumOpener};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::markdown::assemble_document;
use crate::progress::ProgressCallback;
use crate::sink::ResultSink;
use crate::store::DocumentStore;
use crate::stream::structure_stream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs page jobs for one document at a time.
#[derive(Clone)]
pub struct Orchestrator {
    opener: Arc<dyn DocumentOpener>,
    extractor: PageExtractor,
    sink: ResultSink,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        opener: Arc<dyn DocumentOpener>,
        extractor: PageExtractor,
        sink: ResultSink,
        concurrency: usize,
    ) -> Self {
        Self {
            opener,
            extractor,
            sink,
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    /// pdfium and tesseract as configured, persisting to `store`.
    pub fn from_config(config: &PipelineConfig, store: Arc<dyn DocumentStore>) -> Self {
        let mut orchestrator = Self::new(
            Arc::new(PdfiumOpener::new(config.pdfium_dir.clone())),
            PageExtractor::from_config(config),
            ResultSink::new(store),
            config.concurrency,
        );
        orchestrator.progress = config.progress_callback.clone();
        orchestrator
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Dispatch on `mode`. Single-document mode expects exactly one job.
    pub async fn run(
        &self,
        mode: ProcessingMode,
        file: Arc<StagedFile>,
        jobs: Vec<PageJob>,
    ) -> ProcessingReport {
        match mode {
            ProcessingMode::MultiProblem => self.run_multi_problem(file, jobs).await,
            ProcessingMode::SingleDocument if jobs.len() == 1 => {
                let mut jobs = jobs;
                match jobs.pop() {
                    Some(job) => self.run_single_document(file, job).await,
                    None => self.run_multi_problem(file, jobs).await,
                }
            }
            ProcessingMode::SingleDocument => {
                warn!(
                    "Single-document mode got {} jobs; processing them per page",
                    jobs.len()
                );
                self.run_multi_problem(file, jobs).await
            }
        }
    }

    /// Process every page job and persist each outcome as soon as it is known.
    pub async fn run_multi_problem(
        &self,
        file: Arc<StagedFile>,
        jobs: Vec<PageJob>,
    ) -> ProcessingReport {
        let guard = CleanupGuard::new(Arc::clone(&file));
        let barrier = CompletionBarrier::new(jobs.len(), Arc::clone(&file));
        let mut arena = JobArena::new(jobs);
        let start = Instant::now();

        info!(
            "Processing {} page jobs for {}",
            arena.len(),
            file.path().display()
        );

        let source = match self.opener.open(file.path()).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not open {}: {}", file.path().display(), e);
                let error = PageError::Orchestration {
                    detail: e.to_string(),
                };
                self.fail_pending(&mut arena, &barrier, &error).await;
                drop(guard);
                return ProcessingReport::from_arena(arena, file.is_removed());
            }
        };

        let total = source.page_count();
        if let Some(ref cb) = self.progress {
            cb.on_document_start(total);
        }

        let mut runnable = Vec::new();
        for page in arena.pending_pages() {
            if page == 0 || page > total {
                let error = PageError::OutOfRange { page, total };
                self.settle(&mut arena, page, Err(error)).await;
                barrier.arrive();
                continue;
            }
            if let Some(job) = arena.get_mut(page) {
                match job.start() {
                    Ok(()) => runnable.push(page),
                    Err(e) => warn!("{}", e),
                }
            }
        }

        let mut pages = structure_stream(
            source,
            self.extractor.clone(),
            runnable,
            self.concurrency,
            self.progress.clone(),
        );
        while let Some(result) = pages.next().await {
            let page = result.page_num;
            self.settle(&mut arena, page, outcome(result)).await;
            barrier.arrive();
        }

        let completed = arena.count(JobStatus::Completed);
        if let Some(ref cb) = self.progress {
            cb.on_document_complete(total, completed);
        }
        info!(
            "Finished {}: {} completed, {} failed in {}ms",
            file.path().display(),
            completed,
            arena.count(JobStatus::Failed),
            start.elapsed().as_millis()
        );

        drop(guard);
        ProcessingReport::from_arena(arena, file.is_removed())
    }

    /// Structure all pages into one merged document on one record.
    pub async fn run_single_document(&self, file: Arc<StagedFile>, job: PageJob) -> ProcessingReport {
        let guard = CleanupGuard::new(Arc::clone(&file));
        let barrier = CompletionBarrier::new(1, Arc::clone(&file));
        let index = job.page_index;
        let mut arena = JobArena::new(vec![job]);

        let source = match self.opener.open(file.path()).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not open {}: {}", file.path().display(), e);
                let error = PageError::Orchestration {
                    detail: e.to_string(),
                };
                self.fail_pending(&mut arena, &barrier, &error).await;
                drop(guard);
                return ProcessingReport::from_arena(arena, file.is_removed());
            }
        };

        let total = source.page_count();
        if let Some(ref cb) = self.progress {
            cb.on_document_start(total);
        }
        if let Some(job) = arena.get_mut(index) {
            if let Err(e) = job.start() {
                warn!("{}", e);
            }
        }

        let mut results: Vec<PageResult> = structure_stream(
            source,
            self.extractor.clone(),
            (1..=total).collect(),
            self.concurrency,
            self.progress.clone(),
        )
        .collect()
        .await;
        results.sort_by_key(|r| r.page_num);

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let merged = match results.iter().find_map(|r| r.error.clone()) {
            Some(error) => Err(error),
            None => {
                let pages: Vec<(usize, String)> = results
                    .iter()
                    .map(|r| (r.page_num, r.markdown.clone()))
                    .collect();
                let raw = results
                    .iter()
                    .map(|r| r.raw_text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Ok((raw, assemble_document(&pages)))
            }
        };

        self.settle(&mut arena, index, merged).await;
        barrier.arrive();

        if let Some(ref cb) = self.progress {
            cb.on_document_complete(total, succeeded);
        }
        drop(guard);
        ProcessingReport::from_arena(arena, file.is_removed())
    }

    /// Move one job to its terminal state, committing before the arena slot is written.
    async fn settle(
        &self,
        arena: &mut JobArena,
        page: usize,
        outcome: Result<(String, String), PageError>,
    ) {
        let Some(job) = arena.get_mut(page) else {
            warn!("No job for page {}", page);
            return;
        };

        let mut candidate = job.clone();
        let transition = match outcome {
            Ok((raw, markdown)) => candidate.complete(raw, markdown),
            Err(ref error) => candidate.fail(error),
        };
        if let Err(e) = transition {
            warn!("{}", e);
            return;
        }

        if self.sink.commit(&candidate).await {
            debug!(page, status = %candidate.status, "page settled");
            *job = candidate;
        } else {
            let error = PageError::Persistence {
                page,
                detail: format!("could not store result for problem {}", job.problem_id),
            };
            if let Err(e) = job.fail(&error) {
                warn!("{}", e);
            }
        }
    }

    /// Fail every job that never started with the same error.
    async fn fail_pending(&self, arena: &mut JobArena, barrier: &CompletionBarrier, error: &PageError) {
        for page in arena.pending_pages() {
            self.settle(arena, page, Err(error.clone())).await;
            barrier.arrive();
        }
    }
}

fn outcome(result: PageResult) -> Result<(String, String), PageError> {
    match result.error {
        Some(error) => Err(error),
        None => Ok((result.raw_text, result.markdown)),
    }
}
