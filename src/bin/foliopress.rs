use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use foliopress::export::pipeline::{ExportConfig, ExportOutcome, ExportService};
use foliopress::export::options::{PdfExportOptions, QualityTier, UserRole};
use foliopress::foundation::core::PageSelection;
use foliopress::model::book::BookDef;
use foliopress::print::compare::compare_pdfs;
use foliopress::render::fetch::{FileImageFetcher, HttpImageFetcher, ImageFetcher};
use foliopress::{InMemoryJobStore, JobStore};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "foliopress", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a book JSON file to a print-ready PDF.
    Export(ExportArgs),
    /// Compare two exported PDFs for renderer parity (diagnostic).
    Compare(CompareArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input book JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PDF path.
    #[arg(long)]
    out: PathBuf,

    /// Quality tier: preview, medium, printing, excellent.
    #[arg(long, default_value = "medium")]
    quality: String,

    /// Page selection: "all", "N" or "N-M" (1-based).
    #[arg(long, default_value = "all")]
    pages: String,

    /// Produce CMYK output for print.
    #[arg(long, default_value_t = false)]
    cmyk: bool,

    /// ICC profile name (looked up as <icc-dir>/<name>.icc).
    #[arg(long)]
    icc: Option<String>,

    /// Requesting role: author, publisher, owner.
    #[arg(long, default_value = "owner")]
    role: String,

    /// Assets root (fonts, local images). Defaults to the book's directory.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Directory holding ICC profiles.
    #[arg(long, default_value = "profiles")]
    icc_dir: PathBuf,

    /// Also dump each rendered page as PNG into this directory.
    #[arg(long)]
    png_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    a: PathBuf,
    b: PathBuf,

    /// Physical dimension tolerance in millimetres.
    #[arg(long, default_value_t = 0.1)]
    tolerance_mm: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Compare(args) => cmd_compare(args),
    }
}

fn parse_quality(s: &str) -> anyhow::Result<QualityTier> {
    Ok(match s {
        "preview" => QualityTier::Preview,
        "medium" => QualityTier::Medium,
        "printing" => QualityTier::Printing,
        "excellent" => QualityTier::Excellent,
        other => anyhow::bail!("unknown quality tier '{other}'"),
    })
}

fn parse_role(s: &str) -> anyhow::Result<UserRole> {
    Ok(match s {
        "author" => UserRole::Author,
        "publisher" => UserRole::Publisher,
        "owner" => UserRole::Owner,
        other => anyhow::bail!("unknown role '{other}'"),
    })
}

fn parse_pages(s: &str) -> anyhow::Result<PageSelection> {
    if s == "all" {
        return Ok(PageSelection::All);
    }
    if let Some((a, b)) = s.split_once('-') {
        return Ok(PageSelection::Range {
            start: a.parse().context("bad page range start")?,
            end: b.parse().context("bad page range end")?,
        });
    }
    Ok(PageSelection::Current {
        page: s.parse().context("bad page number")?,
    })
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read '{}'", args.in_path.display()))?;
    let book: BookDef = serde_json::from_str(&json).context("parse book json")?;

    let assets_root = args
        .assets
        .clone()
        .or_else(|| args.in_path.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let out_dir = args
        .out
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)?;

    let options = PdfExportOptions {
        quality: parse_quality(&args.quality)?,
        pages: parse_pages(&args.pages)?,
        cmyk: args.cmyk,
        icc_profile: args.icc.clone(),
    };
    let role = parse_role(&args.role)?;

    // Remote photos fetch over HTTP; books with only local assets read from
    // the assets root.
    let has_remote = json.contains("http://") || json.contains("https://");
    let fetcher: Arc<dyn ImageFetcher> = if has_remote {
        Arc::new(HttpImageFetcher::new()?)
    } else {
        Arc::new(FileImageFetcher::new(assets_root.clone()))
    };

    let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let service = ExportService::new(
        ExportConfig {
            output_dir: out_dir,
            assets_root,
            icc_dir: args.icc_dir.clone(),
        },
        jobs.clone(),
        fetcher,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let handle = service.start_export(&book, options, role)?;
    let progress = |pct: u8| tracing::info!(pct, "page rendered");
    let outcome = runtime.block_on(service.render_export_pages(
        &handle.job_id,
        &book,
        Some(&progress),
    ))?;

    match outcome {
        ExportOutcome::Completed(path) => {
            std::fs::rename(&path, &args.out)
                .or_else(|_| std::fs::copy(&path, &args.out).map(|_| ()))
                .with_context(|| format!("move output to '{}'", args.out.display()))?;
            let job = jobs.get(&handle.job_id)?;
            for w in &job.warnings {
                tracing::warn!(warning = %w, "export warning");
            }
            println!("wrote {}", args.out.display());
        }
        ExportOutcome::Cancelled => println!("export cancelled"),
    }

    if let Some(png_dir) = &args.png_dir {
        let assets_root = args
            .assets
            .or_else(|| args.in_path.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        dump_pages_png(&book, png_dir, &assets_root)?;
    }
    Ok(())
}

fn dump_pages_png(
    book: &BookDef,
    png_dir: &std::path::Path,
    assets_root: &std::path::Path,
) -> anyhow::Result<()> {
    use foliopress::render::headless::HeadlessRenderer;
    use foliopress::render::surface::SurfacePoolOpts;
    use foliopress::scene::builder::ImageBank;
    use foliopress::theme::palette::PaletteRegistry;
    use foliopress::theme::resolver::ThemeRegistry;

    std::fs::create_dir_all(png_dir)?;
    let mut renderer = HeadlessRenderer::new(
        assets_root,
        Arc::new(ThemeRegistry::builtin()),
        Arc::new(PaletteRegistry::builtin()),
        SurfacePoolOpts::default(),
    );
    for i in 0..book.pages.len() {
        let frame = renderer.render_page(book, i, &ImageBank::new(), 1.0)?;
        let path = png_dir.join(format!("page-{:03}.png", i + 1));
        image::save_buffer_with_format(
            &path,
            &frame.data,
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        tracing::info!(path = %path.display(), "wrote page png");
    }
    Ok(())
}

fn cmd_compare(args: CompareArgs) -> anyhow::Result<()> {
    let report = compare_pdfs(&args.a, &args.b, args.tolerance_mm)?;
    println!(
        "pages: {} vs {}{}",
        report.page_count_a,
        report.page_count_b,
        if report.page_count_a != report.page_count_b {
            "  PAGE COUNT MISMATCH"
        } else {
            ""
        }
    );
    for page in &report.pages {
        let diff = page
            .diff_percent
            .map(|d| format!("{d:.2}% pixels differ"))
            .unwrap_or_else(|| "raster not comparable".to_owned());
        println!(
            "page {}: {}{}",
            page.index + 1,
            diff,
            if page.dimension_mismatch {
                "  DIMENSION MISMATCH"
            } else {
                ""
            }
        );
    }
    if report.structural_mismatch() {
        anyhow::bail!("structural mismatch between documents");
    }
    Ok(())
}
