use crate::export::options::PdfExportOptions;
use crate::foundation::error::{FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Export job lifecycle. `pending → processing → {completed | failed}`;
/// `cancelled` is the clean non-error stop. Terminal states are immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

/// Persisted export job record. Transitions are the only legal mutations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: JobId,
    pub book_id: String,
    pub state: JobState,
    pub options: PdfExportOptions,
    /// 0–100, bumped after each completed page.
    pub progress: u8,
    pub file_size: Option<u64>,
    /// Present on every `failed` job; never silent.
    pub error: Option<String>,
    /// Recoverable degradations (ICC fallback, skipped images).
    pub warnings: Vec<String>,
    pub downloads: u32,
}

impl ExportJob {
    pub fn new(book_id: impl Into<String>, options: PdfExportOptions) -> Self {
        Self {
            id: JobId::new(),
            book_id: book_id.into(),
            state: JobState::Pending,
            options,
            progress: 0,
            file_size: None,
            error: None,
            warnings: Vec::new(),
            downloads: 0,
        }
    }
}

/// Job record store, as the persistence layer exposes it to the engine.
/// Object-safe so services can hold `Arc<dyn JobStore>`.
pub trait JobStore: Send + Sync {
    fn create(&self, job: ExportJob) -> FolioResult<()>;
    fn get(&self, id: &JobId) -> FolioResult<ExportJob>;
    fn list_for_book(&self, book_id: &str) -> FolioResult<Vec<ExportJob>>;
    /// Apply a state transition; rejects anything the state machine forbids.
    /// `error` is recorded when transitioning to `Failed`.
    fn transition(&self, id: &JobId, to: JobState, error: Option<String>) -> FolioResult<()>;
    fn set_progress(&self, id: &JobId, progress: u8) -> FolioResult<()>;
    fn set_file_size(&self, id: &JobId, size: u64) -> FolioResult<()>;
    fn add_warning(&self, id: &JobId, warning: String) -> FolioResult<()>;
    fn record_download(&self, id: &JobId) -> FolioResult<u32>;
}

/// In-memory store used by the CLI and tests; the production store lives
/// behind the same trait in the API service.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, ExportJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<R>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut ExportJob) -> FolioResult<R>,
    ) -> FolioResult<R> {
        let mut jobs = self.jobs.lock().expect("job store poisoned");
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| FolioError::validation(format!("unknown job {id}")))?;
        f(job)
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: ExportJob) -> FolioResult<()> {
        let mut jobs = self.jobs.lock().expect("job store poisoned");
        if jobs.contains_key(&job.id) {
            return Err(FolioError::validation(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &JobId) -> FolioResult<ExportJob> {
        let jobs = self.jobs.lock().expect("job store poisoned");
        jobs.get(id)
            .cloned()
            .ok_or_else(|| FolioError::validation(format!("unknown job {id}")))
    }

    fn list_for_book(&self, book_id: &str) -> FolioResult<Vec<ExportJob>> {
        let jobs = self.jobs.lock().expect("job store poisoned");
        Ok(jobs
            .values()
            .filter(|j| j.book_id == book_id)
            .cloned()
            .collect())
    }

    fn transition(&self, id: &JobId, to: JobState, error: Option<String>) -> FolioResult<()> {
        self.with_job(id, |job| {
            if !job.state.can_transition(to) {
                return Err(FolioError::validation(format!(
                    "illegal job transition {:?} -> {to:?}",
                    job.state
                )));
            }
            if to == JobState::Failed && error.is_none() {
                return Err(FolioError::validation(
                    "failed jobs must carry an error message",
                ));
            }
            job.state = to;
            job.error = error;
            Ok(())
        })
    }

    fn set_progress(&self, id: &JobId, progress: u8) -> FolioResult<()> {
        self.with_job(id, |job| {
            if job.state.is_terminal() {
                return Err(FolioError::validation("terminal jobs are immutable"));
            }
            job.progress = progress.min(100);
            Ok(())
        })
    }

    fn set_file_size(&self, id: &JobId, size: u64) -> FolioResult<()> {
        self.with_job(id, |job| {
            job.file_size = Some(size);
            Ok(())
        })
    }

    fn add_warning(&self, id: &JobId, warning: String) -> FolioResult<()> {
        self.with_job(id, |job| {
            job.warnings.push(warning);
            Ok(())
        })
    }

    fn record_download(&self, id: &JobId) -> FolioResult<u32> {
        self.with_job(id, |job| {
            job.downloads += 1;
            Ok(job.downloads)
        })
    }
}
