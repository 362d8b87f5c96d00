use crate::export::job::{ExportJob, JobId, JobState, JobStore};
use crate::export::options::{PdfExportOptions, UserRole, check_export_policy};
use crate::foundation::core::page_points;
use crate::foundation::error::{FolioError, FolioResult};
use crate::model::book::BookDef;
use crate::print::pdf::PdfAssembler;
use crate::print::postprocess::{load_icc_profile, process_page};
use crate::render::fetch::{ImageFetcher, resolve_page_images};
use crate::render::headless::HeadlessRenderer;
use crate::render::surface::SurfacePoolOpts;
use crate::theme::palette::PaletteRegistry;
use crate::theme::resolver::ThemeRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub struct ExportConfig {
    /// Finished PDFs land at `<output_dir>/<job_id>.pdf`.
    pub output_dir: PathBuf,
    /// Root for fonts and other bundled assets.
    pub assets_root: PathBuf,
    /// Directory of `<name>.icc` profiles for print exports.
    pub icc_dir: PathBuf,
}

/// Invoked after each completed page with overall progress 0–100.
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// How a render run ended. Cancellation is an outcome, not an error: the
/// job stops cleanly, nothing is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(PathBuf),
    Cancelled,
}

/// Cooperative cancellation handle for one job. The flag is checked between
/// pages; a page that already started rendering finishes first.
#[derive(Clone, Debug)]
pub struct ExportHandle {
    pub job_id: JobId,
    cancel: Arc<AtomicBool>,
}

impl ExportHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Drives exports end to end: policy check, job record, per-page headless
/// render, print post-processing, PDF assembly.
pub struct ExportService {
    config: ExportConfig,
    jobs: Arc<dyn JobStore>,
    fetcher: Arc<dyn ImageFetcher>,
    themes: Arc<ThemeRegistry>,
    palettes: Arc<PaletteRegistry>,
    cancels: Mutex<HashMap<JobId, Arc<AtomicBool>>>,
}

impl ExportService {
    pub fn new(config: ExportConfig, jobs: Arc<dyn JobStore>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            config,
            jobs,
            fetcher,
            themes: Arc::new(ThemeRegistry::builtin()),
            palettes: Arc::new(PaletteRegistry::builtin()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and register an export. Policy violations are rejected here,
    /// before any job record exists or any rendering work starts.
    pub fn start_export(
        &self,
        book: &BookDef,
        options: PdfExportOptions,
        role: UserRole,
    ) -> FolioResult<ExportHandle> {
        check_export_policy(role, &options)?;
        book.validate()?;
        options.pages.resolve(book.pages.len())?;

        let job = ExportJob::new(book.id.clone(), options);
        let job_id = job.id.clone();
        self.jobs.create(job)?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels
            .lock()
            .expect("cancel map poisoned")
            .insert(job_id.clone(), cancel.clone());
        Ok(ExportHandle { job_id, cancel })
    }

    /// Render every selected page of a pending job and assemble the PDF.
    /// Terminal job state and (on success) the file path are recorded on the
    /// job; failures always carry a message.
    pub async fn render_export_pages(
        &self,
        job_id: &JobId,
        book: &BookDef,
        progress: Option<&ProgressFn>,
    ) -> FolioResult<ExportOutcome> {
        let cancel = self
            .cancels
            .lock()
            .expect("cancel map poisoned")
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

        if cancel.load(Ordering::SeqCst) {
            self.jobs.transition(job_id, JobState::Cancelled, None)?;
            self.forget(job_id);
            return Ok(ExportOutcome::Cancelled);
        }

        self.jobs.transition(job_id, JobState::Processing, None)?;
        let out_path = self.config.output_dir.join(format!("{job_id}.pdf"));

        let result = self
            .run_pipeline(job_id, book, &cancel, progress, &out_path)
            .await;
        self.forget(job_id);

        match result {
            Ok(ExportOutcome::Completed(path)) => {
                self.jobs.transition(job_id, JobState::Completed, None)?;
                tracing::info!(job = %job_id, path = %path.display(), "export completed");
                Ok(ExportOutcome::Completed(path))
            }
            Ok(ExportOutcome::Cancelled) => {
                // Clean stop: no failed state, no partial artifact.
                let _ = std::fs::remove_file(&out_path);
                self.jobs.transition(job_id, JobState::Cancelled, None)?;
                tracing::info!(job = %job_id, "export cancelled");
                Ok(ExportOutcome::Cancelled)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&out_path);
                if let Err(te) =
                    self.jobs
                        .transition(job_id, JobState::Failed, Some(e.to_string()))
                {
                    tracing::error!(job = %job_id, error = %te, "failed to record job failure");
                }
                tracing::error!(job = %job_id, error = %e, "export failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        job_id: &JobId,
        book: &BookDef,
        cancel: &AtomicBool,
        progress: Option<&ProgressFn>,
        out_path: &std::path::Path,
    ) -> FolioResult<ExportOutcome> {
        let job = self.jobs.get(job_id)?;
        let options = job.options;
        let indices = options.pages.resolve(book.pages.len())?;

        let icc = if options.cmyk {
            match options.icc_profile.as_deref() {
                Some(name) => {
                    let loaded = load_icc_profile(&self.config.icc_dir, name);
                    if loaded.is_none() {
                        self.jobs.add_warning(
                            job_id,
                            format!("icc profile '{name}' unavailable, cmyk output is uncalibrated"),
                        )?;
                    }
                    loaded
                }
                None => None,
            }
        } else {
            None
        };

        let page_pts = page_points(book.page_format, book.orientation);
        let mut assembler = PdfAssembler::new(page_pts.0, page_pts.1, icc.as_ref())?;

        // The offscreen rendering surface is acquired once per job and
        // reused across its pages; drop releases it on every exit path.
        let mut renderer = HeadlessRenderer::new(
            self.config.assets_root.clone(),
            self.themes.clone(),
            self.palettes.clone(),
            SurfacePoolOpts::default(),
        );

        let book = Arc::new(book.clone());
        let total = indices.len().max(1);
        for (done, &page_index) in indices.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                return Ok(ExportOutcome::Cancelled);
            }

            let (bank, warnings) =
                resolve_page_images(&book.pages[page_index], self.fetcher.as_ref()).await;
            for w in warnings {
                self.jobs.add_warning(job_id, w)?;
            }

            // Raster + resample are CPU-bound; keep them off the runtime.
            // The renderer shuttles through the closure and back.
            let book_ref = book.clone();
            let quality = options.quality;
            let cmyk = options.cmyk;
            let (returned, processed) = tokio::task::spawn_blocking(move || {
                let result = renderer
                    .render_page(&book_ref, page_index, &bank, 1.0)
                    .and_then(|frame| process_page(&frame, page_pts, quality, cmyk));
                (renderer, result)
            })
            .await
            .map_err(|e| FolioError::render(format!("render task panicked: {e}")))?;
            renderer = returned;
            assembler.add_page(&processed?)?;

            let pct = (((done + 1) * 100) / total) as u8;
            self.jobs.set_progress(job_id, pct)?;
            if let Some(cb) = progress {
                cb(pct);
            }
        }

        let bytes = assembler.finish()?;
        tokio::fs::write(out_path, &bytes).await?;
        self.jobs.set_file_size(job_id, bytes.len() as u64)?;
        Ok(ExportOutcome::Completed(out_path.to_path_buf()))
    }

    fn forget(&self, job_id: &JobId) {
        self.cancels
            .lock()
            .expect("cancel map poisoned")
            .remove(job_id);
    }
}
