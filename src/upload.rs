//! Accepting an uploaded PDF and starting its background processing.
//!
//! ```text
//! validate ──▶ stage <uuid>.pdf ──▶ blob upload ──▶ count pages
//!     ──▶ create records ──▶ mark processing ──▶ spawn orchestrator
//! ```
//!
//! [`UploadService::upload`] returns as soon as the records exist. The
//! returned [`UploadHandle`] carries the receipt for the caller and the
//! background task, which may be awaited or simply dropped.

use crate::cleanup::StagedFile;
use crate::config::{PipelineConfig, ProcessingMode};
use crate::error::PipelineError;
use crate::job::{PageJob, ProcessingReport};
use crate::orchestrator::Orchestrator;
use crate::pipeline::document::{Document, DocumentOpener, PdfiumOpener};
use crate::pipeline::extract::PageExtractor;
use crate::sink::ResultSink;
use crate::store::{
    BlobStore, DocumentStore, ProblemRecord, ProblemStatus, ProblemUpdate, BLOB_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One record created for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub page_number: Option<usize>,
    pub status: ProblemStatus,
}

/// What the caller learns immediately after uploading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub original_filename: String,
    pub total_pages: usize,
    pub problems: Vec<ProblemSummary>,
    pub upload_status: ProblemStatus,
    pub mode: ProcessingMode,
    /// Blob key of the stored PDF, or its local path if the blob upload failed.
    pub file_path: String,
}

/// Receipt plus the spawned processing task.
#[derive(Debug)]
pub struct UploadHandle {
    pub receipt: UploadReceipt,
    pub task: JoinHandle<ProcessingReport>,
}

impl UploadHandle {
    /// Wait for background processing to finish.
    pub async fn wait(self) -> Result<ProcessingReport, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Internal(format!("Processing task failed: {}", e)))
    }
}

/// Front door of the pipeline.
pub struct UploadService {
    config: PipelineConfig,
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    opener: Arc<dyn DocumentOpener>,
    orchestrator: Orchestrator,
}

impl UploadService {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        opener: Arc<dyn DocumentOpener>,
        extractor: PageExtractor,
    ) -> Self {
        let mut orchestrator = Orchestrator::new(
            Arc::clone(&opener),
            extractor,
            ResultSink::new(Arc::clone(&store)),
            config.concurrency,
        );
        if let Some(ref cb) = config.progress_callback {
            orchestrator = orchestrator.with_progress(Arc::clone(cb));
        }
        Self {
            config,
            store,
            blobs,
            opener,
            orchestrator,
        }
    }

    /// pdfium for reading pages and the tesseract CLI for OCR.
    pub fn from_config(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let opener = Arc::new(PdfiumOpener::new(config.pdfium_dir.clone()));
        let extractor = PageExtractor::from_config(&config);
        Self::new(config, store, blobs, opener, extractor)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Check the request before anything touches the disk.
    pub fn validate(&self, filename: &str, size: u64) -> Result<(), PipelineError> {
        if filename.trim().is_empty() {
            return Err(PipelineError::Validation("No file provided".into()));
        }
        if !self.config.accepts_extension(filename) {
            return Err(PipelineError::Validation(
                "Only PDF files are allowed".into(),
            ));
        }
        if size > self.config.max_file_size {
            return Err(PipelineError::Validation(format!(
                "File size exceeds maximum allowed size of {} bytes",
                self.config.max_file_size
            )));
        }
        Ok(())
    }

    /// Accept `bytes` as `filename` for `user_id` and start processing.
    ///
    /// Must be called inside a Tokio runtime; processing runs on a spawned task.
    pub async fn upload(
        &self,
        user_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadHandle, PipelineError> {
        self.validate(filename, bytes.len() as u64)?;

        let upload_id = Uuid::new_v4().to_string();
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_else(|| ".pdf".to_string());
        let local_name = format!("{upload_id}{extension}");

        tokio::fs::create_dir_all(&self.config.upload_dir)
            .await
            .map_err(|e| PipelineError::Internal(format!("Cannot create upload dir: {}", e)))?;
        let local_path = self.config.upload_dir.join(&local_name);
        tokio::fs::write(&local_path, bytes)
            .await
            .map_err(|e| PipelineError::Internal(format!("Cannot stage upload: {}", e)))?;
        let staged = StagedFile::new(&local_path);
        debug!("Staged {} as {}", filename, local_path.display());

        let remote_key = format!("{BLOB_PREFIX}{user_id}/{local_name}");
        let uploaded = match self.blobs.upload(&local_path, &remote_key).await {
            Ok(url) => {
                debug!("Uploaded {} to {}", local_name, url);
                Some(remote_key)
            }
            Err(e) => {
                warn!("Blob upload failed, keeping local path: {}", e);
                None
            }
        };
        let file_path = uploaded
            .clone()
            .unwrap_or_else(|| local_path.display().to_string());

        let page_count = match self.opener.open(&local_path).await {
            Ok(source) => source.page_count(),
            Err(e) => {
                self.discard(&staged, uploaded.as_deref()).await;
                return Err(e);
            }
        };
        let document = Document {
            path: local_path.clone(),
            original_filename: filename.to_string(),
            page_count,
        };

        let records = self.records_for(&document, user_id, &file_path);
        if let Err(e) = self.create_all(&records).await {
            self.discard(&staged, uploaded.as_deref()).await;
            return Err(e);
        }

        let mut problems = Vec::with_capacity(records.len());
        let mut jobs = Vec::with_capacity(records.len());
        for record in &records {
            if !self
                .store
                .update(&record.id, ProblemUpdate::status(ProblemStatus::Processing))
                .await
            {
                warn!(problem_id = %record.id, "could not mark problem as processing");
            }
            problems.push(ProblemSummary {
                id: record.id.clone(),
                page_number: record.page_number,
                status: ProblemStatus::Processing,
            });
            jobs.push(PageJob::new(record.page_number.unwrap_or(0), record.id.clone()));
        }

        info!(
            "Accepted {} ({} pages) for user {} as {} problem(s)",
            filename,
            page_count,
            user_id,
            jobs.len()
        );

        let orchestrator = self.orchestrator.clone();
        let mode = self.config.mode;
        let task = tokio::spawn(async move { orchestrator.run(mode, staged, jobs).await });

        Ok(UploadHandle {
            receipt: UploadReceipt {
                original_filename: filename.to_string(),
                total_pages: page_count,
                problems,
                upload_status: ProblemStatus::Processing,
                mode,
                file_path,
            },
            task,
        })
    }

    fn records_for(&self, document: &Document, user_id: &str, file_path: &str) -> Vec<ProblemRecord> {
        let record = |page: Option<usize>| {
            ProblemRecord::new(
                Uuid::new_v4().to_string(),
                user_id,
                document.original_filename.clone(),
                file_path,
                page,
            )
        };
        match self.config.mode {
            ProcessingMode::MultiProblem => (1..=document.page_count).map(|p| record(Some(p))).collect(),
            ProcessingMode::SingleDocument => vec![record(None)],
        }
    }

    /// Create every record or none.
    async fn create_all(&self, records: &[ProblemRecord]) -> Result<(), PipelineError> {
        for (i, record) in records.iter().enumerate() {
            if let Err(e) = self.store.create(record.clone()).await {
                for created in &records[..i] {
                    if !self.store.delete(&created.id).await {
                        warn!(problem_id = %created.id, "rollback could not delete problem record");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo staging and the blob upload of a rejected upload.
    async fn discard(&self, staged: &StagedFile, remote_key: Option<&str>) {
        staged.remove_once();
        if let Some(key) = remote_key {
            if !self.blobs.delete(key).await {
                warn!("Could not delete uploaded blob {}", key);
            }
        }
    }
}
