//! End-to-end export scenarios: book JSON in, PDF out, job lifecycle
//! observed through the store.

use foliopress::export::job::{InMemoryJobStore, JobState, JobStore};
use foliopress::export::options::{PdfExportOptions, QualityTier, UserRole};
use foliopress::export::pipeline::{ExportConfig, ExportOutcome, ExportService};
use foliopress::foundation::core::{MM_PER_PT, Orientation, PageFormat, PageSelection};
use foliopress::foundation::error::{FolioError, FolioResult};
use foliopress::model::book::{BookDef, PageDef};
use foliopress::model::element::{ColorDef, ElementDef, ElementKindDef, StyleOverrideDef};
use foliopress::print::compare::read_pdf_summary;
use foliopress::render::fetch::ImageFetcher;
use foliopress::Rgba8;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct NoFetch;

#[async_trait::async_trait]
impl ImageFetcher for NoFetch {
    async fn fetch(&self, source: &str) -> FolioResult<Vec<u8>> {
        Err(FolioError::resource(format!("unreachable: {source}")))
    }
}

fn stroked_rect(id: &str) -> ElementDef {
    ElementDef {
        id: id.to_owned(),
        kind: ElementKindDef::Rect,
        x: 100.0,
        y: 100.0,
        w: 200.0,
        h: 120.0,
        rotation_deg: 0.0,
        opacity: 1.0,
        z: None,
        style: StyleOverrideDef {
            stroke: Some(ColorDef::literal(Rgba8::opaque(0x1f, 0x29, 0x37))),
            stroke_width: Some(2.0),
            ..StyleOverrideDef::default()
        },
    }
}

fn one_rect_book() -> BookDef {
    BookDef {
        id: "book-e2e".to_owned(),
        title: Some("e2e".to_owned()),
        page_format: PageFormat::A4,
        orientation: Orientation::Portrait,
        theme: None,
        palette: None,
        pages: vec![PageDef {
            elements: vec![stroked_rect("r1")],
            ..PageDef::default()
        }],
    }
}

fn service(dir: &std::path::Path) -> (ExportService, Arc<InMemoryJobStore>) {
    let jobs = Arc::new(InMemoryJobStore::new());
    let service = ExportService::new(
        ExportConfig {
            output_dir: dir.to_path_buf(),
            assets_root: dir.to_path_buf(),
            icc_dir: dir.join("profiles"),
        },
        jobs.clone(),
        Arc::new(NoFetch),
    );
    (service, jobs)
}

fn count_near(img: &image::RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, c: [u8; 3]) -> usize {
    let mut n = 0;
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            let p = img.get_pixel(x, y).0;
            if p.iter().zip(c.iter()).all(|(a, b)| a.abs_diff(*b) <= 60) {
                n += 1;
            }
        }
    }
    n
}

#[tokio::test(flavor = "multi_thread")]
async fn a4_medium_export_produces_correct_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let (service, jobs) = service(dir.path());
    let book = one_rect_book();

    let handle = service
        .start_export(&book, PdfExportOptions::default(), UserRole::Author)
        .unwrap();
    let outcome = service
        .render_export_pages(&handle.job_id, &book, None)
        .await
        .unwrap();
    let ExportOutcome::Completed(path) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(path, dir.path().join(format!("{}.pdf", handle.job_id)));

    let job = jobs.get(&handle.job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.file_size.unwrap() > 0);
    assert!(job.error.is_none());

    // One PDF page, physically 210x297mm within 0.1mm.
    let summary = read_pdf_summary(&path).unwrap();
    assert_eq!(summary.pages.len(), 1);
    let page = &summary.pages[0];
    assert!((page.width_pt * MM_PER_PT - 210.0).abs() < 0.1);
    assert!((page.height_pt * MM_PER_PT - 297.0).abs() < 0.1);

    // Medium tier = 150 dpi.
    let img = page.image.as_ref().expect("embedded page raster");
    assert_eq!((img.width(), img.height()), (1240, 1754));

    // The rect spans (100,100)-(300,220) on a 794px canvas; at 150 dpi that
    // is scaled by 1240/794. Expect stroke pixels along the top edge and a
    // clean unfilled interior.
    let s = 1240.0 / 794.0;
    let (x0, y0) = ((100.0 * s) as u32, (100.0 * s) as u32);
    let (x1, y1) = ((300.0 * s) as u32, (220.0 * s) as u32);
    let stroke = [0x1f, 0x29, 0x37];
    let top_edge = count_near(img, x0.saturating_sub(4), y0.saturating_sub(4), x1 + 4, y0 + 4, stroke);
    assert!(top_edge > 0, "expected stroked top edge");
    let interior = count_near(img, x0 + 20, y0 + 20, x1 - 20, y1 - 20, stroke);
    assert_eq!(interior, 0, "fill must stay transparent");
    let outside = count_near(img, 10, 10, 60, 60, [255, 255, 255]);
    assert!(outside > 0, "page background should be white");
}

#[tokio::test(flavor = "multi_thread")]
async fn printing_tier_as_author_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let (service, jobs) = service(dir.path());
    let book = one_rect_book();

    let err = service
        .start_export(
            &book,
            PdfExportOptions {
                quality: QualityTier::Printing,
                ..PdfExportOptions::default()
            },
            UserRole::Author,
        )
        .unwrap_err();
    assert!(matches!(err, FolioError::Policy(_)));

    // No job record exists, so nothing ever entered processing.
    assert!(jobs.list_for_book("book-e2e").unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_image_degrades_but_export_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (service, jobs) = service(dir.path());
    let mut book = one_rect_book();
    book.pages[0].elements.push(ElementDef {
        id: "photo".to_owned(),
        kind: ElementKindDef::Image {
            source: Some("https://photos.example/missing.jpg".to_owned()),
        },
        x: 400.0,
        y: 400.0,
        w: 200.0,
        h: 150.0,
        rotation_deg: 0.0,
        opacity: 1.0,
        z: None,
        style: StyleOverrideDef::default(),
    });

    let handle = service
        .start_export(&book, PdfExportOptions::default(), UserRole::Owner)
        .unwrap();
    let outcome = service
        .render_export_pages(&handle.job_id, &book, None)
        .await
        .unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));

    let job = jobs.get(&handle.job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(
        job.warnings.iter().any(|w| w.contains("missing.jpg")),
        "expected a degradation warning, got {:?}",
        job.warnings
    );

    // The photo area renders empty (white), not as a failure.
    let ExportOutcome::Completed(path) = outcome else { unreachable!() };
    let summary = read_pdf_summary(&path).unwrap();
    let img = summary.pages[0].image.as_ref().unwrap();
    let s = 1240.0 / 794.0;
    let inside = count_near(
        img,
        (420.0 * s) as u32,
        (420.0 * s) as u32,
        (580.0 * s) as u32,
        (530.0 * s) as u32,
        [255, 255, 255],
    );
    assert!(inside > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_after_first_page_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (service, jobs) = service(dir.path());
    let mut book = one_rect_book();
    book.pages = vec![
        book.pages[0].clone(),
        book.pages[0].clone(),
        book.pages[0].clone(),
    ];

    let handle = service
        .start_export(&book, PdfExportOptions::default(), UserRole::Owner)
        .unwrap();

    let cancelled = AtomicBool::new(false);
    let h = handle.clone();
    let progress = move |_pct: u8| {
        if !cancelled.swap(true, Ordering::SeqCst) {
            h.cancel();
        }
    };
    let outcome = service
        .render_export_pages(&handle.job_id, &book, Some(&progress))
        .await
        .unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);

    let job = jobs.get(&handle.job_id).unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.state.is_terminal());
    assert_ne!(job.state, JobState::Failed);
    assert_ne!(job.state, JobState::Completed);

    // No partial artifact.
    let pdfs = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "pdf"))
        .count();
    assert_eq!(pdfs, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn page_range_controls_pdf_page_count() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _jobs) = service(dir.path());
    let mut book = one_rect_book();
    book.pages = vec![
        book.pages[0].clone(),
        book.pages[0].clone(),
        book.pages[0].clone(),
    ];

    let handle = service
        .start_export(
            &book,
            PdfExportOptions {
                quality: QualityTier::Preview,
                pages: PageSelection::Range { start: 2, end: 3 },
                ..PdfExportOptions::default()
            },
            UserRole::Owner,
        )
        .unwrap();
    let ExportOutcome::Completed(path) = service
        .render_export_pages(&handle.job_id, &book, None)
        .await
        .unwrap()
    else {
        panic!("expected completion")
    };
    assert_eq!(read_pdf_summary(&path).unwrap().pages.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cmyk_without_profile_warns_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (service, jobs) = service(dir.path());
    let book = one_rect_book();

    let handle = service
        .start_export(
            &book,
            PdfExportOptions {
                quality: QualityTier::Printing,
                cmyk: true,
                icc_profile: Some("coated-fogra39".to_owned()),
                ..PdfExportOptions::default()
            },
            UserRole::Publisher,
        )
        .unwrap();
    let outcome = service
        .render_export_pages(&handle.job_id, &book, None)
        .await
        .unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));

    let job = jobs.get(&handle.job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(
        job.warnings
            .iter()
            .any(|w| w.contains("coated-fogra39")),
        "icc fallback should surface as a warning"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_reaches_100_in_page_order() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _jobs) = service(dir.path());
    let mut book = one_rect_book();
    book.pages = vec![book.pages[0].clone(), book.pages[0].clone()];

    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
    let seen_cb = seen.clone();
    let progress = move |pct: u8| seen_cb.lock().unwrap().push(pct);
    let handle = service
        .start_export(
            &book,
            PdfExportOptions {
                quality: QualityTier::Preview,
                ..PdfExportOptions::default()
            },
            UserRole::Owner,
        )
        .unwrap();
    service
        .render_export_pages(&handle.job_id, &book, Some(&progress))
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
}
