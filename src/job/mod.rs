//! Relay jobs: one URL downloaded, uploaded to the backup channel and
//! delivered to the requester, narrated on a single status message.

pub mod progress;
pub mod render;

use crate::bot::{StatusHandle, TransferClient, UploadRequest, UploadedHandle};
use crate::config::{Settings, PROGRESS_ENTRY_TTL_SECS};
use crate::error::RelayError;
use crate::retrieval::classify::{classify, UrlClass};
use crate::retrieval::temp_path::remove_quietly;
use crate::retrieval::{MediaInfo, RetrievalRequest, RetrievalResult, RetrievalRouter};
use crate::utils::{format_bytes, sanitize_filename};
use progress::{spawn_progress_pump, ProgressStore, ProgressThrottler, TransferKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

/// Inbound download job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Source URL
    pub url: String,
    /// Requester chat
    pub chat_id: i64,
    /// Message the result replies to
    pub message_id: i32,
    /// Requesting user
    pub user_id: i64,
    /// Display file name
    #[serde(default)]
    pub file_name: Option<String>,
    /// Submission time, unix seconds
    #[serde(default)]
    pub timestamp: i64,
}

impl Job {
    /// Reject jobs that cannot possibly succeed
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Validation` for a missing or non-HTTP URL or a zero chat id.
    pub fn validate(&self) -> Result<(), RelayError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(RelayError::Validation("url is required".to_string()));
        }
        let parsed =
            Url::parse(url).map_err(|e| RelayError::Validation(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RelayError::Validation(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        if self.chat_id == 0 {
            return Err(RelayError::Validation("chatId is required".to_string()));
        }
        Ok(())
    }
}

/// Result of a successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    /// Always `true`
    pub success: bool,
    /// Size of the delivered file
    pub file_size: u64,
    /// Platform identifier of the uploaded file
    pub file_id: String,
}

impl JobOutcome {
    fn new(file_size: u64, file_id: String) -> Self {
        Self {
            success: true,
            file_size,
            file_id,
        }
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    /// Status message sent
    Received,
    /// Retrieval in progress
    DownloadStarted,
    /// File on local disk
    DownloadComplete,
    /// Upload to the backup channel in progress
    UploadStarted,
    /// Backup upload finished
    UploadComplete,
    /// Copy delivered to the requester
    Forwarded,
    /// Final narration sent
    Done,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::DownloadStarted => "download_started",
            Self::DownloadComplete => "download_complete",
            Self::UploadStarted => "upload_started",
            Self::UploadComplete => "upload_complete",
            Self::Forwarded => "forwarded",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Chat every file is uploaded to first
    pub backup_chat_id: i64,
    /// Probe extractor URLs for a title before downloading
    pub probe_metadata: bool,
    /// Idle TTL of progress entries
    pub progress_ttl: Duration,
}

impl OrchestratorConfig {
    /// Extract the relevant settings
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            backup_chat_id: settings.backup_channel_id,
            probe_metadata: settings.probe_metadata,
            progress_ttl: Duration::from_secs(PROGRESS_ENTRY_TTL_SECS),
        }
    }
}

/// Drives jobs from status message to final narration
#[derive(Clone)]
pub struct JobOrchestrator {
    transfer: Arc<dyn TransferClient>,
    router: RetrievalRouter,
    progress: ProgressStore,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        transfer: Arc<dyn TransferClient>,
        router: RetrievalRouter,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            transfer,
            router,
            progress: ProgressStore::new(config.progress_ttl),
            config,
        }
    }

    /// Production orchestrator: reqwest + yt-dlp retrieval over `transfer`
    #[must_use]
    pub fn from_settings(settings: &Settings, transfer: Arc<dyn TransferClient>) -> Self {
        Self::new(
            transfer,
            RetrievalRouter::from_settings(settings),
            OrchestratorConfig::from_settings(settings),
        )
    }

    /// Progress bookkeeping of this orchestrator
    #[must_use]
    pub const fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Run one job to completion.
    ///
    /// Every failure after the first status message is narrated on it before
    /// being returned. The local file is removed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the job.
    pub async fn run(&self, job: Job) -> Result<JobOutcome, RelayError> {
        let span = info_span!(
            "job",
            job_id = %Uuid::new_v4(),
            chat_id = job.chat_id,
            user_id = job.user_id
        );
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, job: Job) -> Result<JobOutcome, RelayError> {
        job.validate()?;
        info!(url = %job.url, file_name = ?job.file_name, "Job received");

        let status = self
            .transfer
            .send_status(job.chat_id, render::RECEIVED, Some(job.message_id))
            .await?;

        let mut stage = JobStage::Received;
        let mut local_file: Option<PathBuf> = None;
        let result = self
            .drive(&job, &status, &mut stage, &mut local_file)
            .await;

        self.progress.clear(TransferKey::from(&status)).await;

        match result {
            Ok(ref outcome) => {
                info!(file_size = outcome.file_size, file_id = %outcome.file_id, "Job done");
            }
            Err(ref e) => {
                error!(stage = %stage, error = %e, "Job failed");
                if !self
                    .transfer
                    .edit_status(&status, &render::failed(&e.to_string()))
                    .await
                {
                    debug!("Failure narration not delivered");
                }
            }
        }

        if let Some(path) = local_file {
            remove_quietly(&path).await;
        }
        result
    }

    async fn drive(
        &self,
        job: &Job,
        status: &StatusHandle,
        stage: &mut JobStage,
        local_file: &mut Option<PathBuf>,
    ) -> Result<JobOutcome, RelayError> {
        *stage = JobStage::DownloadStarted;
        let class = classify(&job.url);
        info!(strategy = class.label(), "URL classified");

        let narration = match self.probe(class, &job.url).await {
            Some(info) => render::probed(class, &info),
            None => render::download_started(class),
        };
        self.transfer.edit_status(status, &narration).await;

        let request = RetrievalRequest::new(job.url.clone(), job.file_name.clone());
        let file = self.router.retrieve_as(class, &request).await?;
        *local_file = Some(file.path.clone());

        *stage = JobStage::DownloadComplete;
        info!(
            path = %file.path.display(),
            size = %format_bytes(file.size),
            "Download complete"
        );
        self.transfer
            .edit_status(status, &render::download_complete(file.size))
            .await;

        *stage = JobStage::UploadStarted;
        let uploaded = self.upload(job, status, &file).await?;

        *stage = JobStage::UploadComplete;
        self.progress.clear(TransferKey::from(status)).await;
        self.transfer
            .edit_status(status, render::UPLOAD_COMPLETE)
            .await;

        self.transfer
            .forward(
                job.chat_id,
                uploaded.chat_id,
                uploaded.message_id,
                Some(job.message_id),
            )
            .await?;
        *stage = JobStage::Forwarded;

        self.transfer
            .edit_status(status, &render::done(file.size))
            .await;
        *stage = JobStage::Done;

        Ok(JobOutcome::new(file.size, uploaded.file_id))
    }

    async fn probe(&self, class: UrlClass, url: &str) -> Option<MediaInfo> {
        if !self.config.probe_metadata || !matches!(class, UrlClass::ExtractorEligible(_)) {
            return None;
        }
        let info = self.router.probe(url).await;
        if let Some(ref info) = info {
            info!(title = ?info.title, duration = ?info.duration_secs, "Metadata probed");
        }
        info
    }

    /// Upload to the backup channel while a side task narrates progress
    async fn upload(
        &self,
        job: &Job,
        status: &StatusHandle,
        file: &RetrievalResult,
    ) -> Result<UploadedHandle, RelayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let pump = spawn_progress_pump(
            Arc::clone(&self.transfer),
            ProgressThrottler::new(self.progress.clone()),
            *status,
            rx,
            stop.clone(),
        );

        let request = UploadRequest {
            chat_id: self.config.backup_chat_id,
            path: file.path.clone(),
            file_name: upload_file_name(job.file_name.as_deref(), file),
            caption: Some(render::caption(&job.url, job.user_id, file.size)),
            size: file.size,
        };
        let result = self.transfer.upload_file(request, Some(tx)).await;

        stop.cancel();
        match pump.await {
            Ok(edits) => debug!(edits, "Progress narration finished"),
            Err(e) => warn!(error = %e, "Progress narration task failed"),
        }
        result
    }
}

/// Name the uploaded file carries: the sanitized display name (given the
/// produced file's extension when it has none), else the local basename.
#[must_use]
pub fn upload_file_name(display: Option<&str>, file: &RetrievalResult) -> String {
    let Some(name) = display
        .map(sanitize_filename)
        .filter(|n| !n.trim_matches(['.', '_', ' ']).is_empty())
    else {
        return file.file_name();
    };

    match (Path::new(&name).extension(), file.extension()) {
        (None, Some(ext)) => format!("{name}.{ext}"),
        _ => name,
    }
}
