//! Foliopress is the page composition and print export engine behind a
//! collaborative photo-book editor.
//!
//! The hard guarantee is renderer parity: a page composed interactively must
//! reproduce pixel-identically when re-rendered headlessly for export. Both
//! paths therefore share one declarative pipeline:
//!
//! - Resolve a [`theme::resolver::ResolvedStyle`] per element
//! - Lay out text with real font metrics ([`layout::text`])
//! - Build an ordered [`scene::graph::SceneGraph`] ([`scene::builder`])
//! - Rasterize ([`render::raster`]), post-process for print
//!   ([`print::postprocess`]) and assemble the PDF ([`print::pdf`])
//!
//! The interactive surface ([`editor`]) is just one more producer of the
//! shared page data; its live scene is corrected for export by
//! [`export::snapshot`], and the server-side path re-renders from raw data
//! via [`render::headless`]. [`export::pipeline`] drives whole jobs.
#![forbid(unsafe_code)]

pub mod editor;
pub mod export;
pub mod foundation;
pub mod layout;
pub mod model;
pub mod print;
pub mod render;
pub mod scene;
pub mod theme;

pub use crate::foundation::core::{
    Orientation, PageFormat, PageSelection, PixelFrame, Rgba8, canvas_pixels, page_millimetres,
    page_points,
};
pub use crate::foundation::error::{FolioError, FolioResult};

pub use crate::export::job::{ExportJob, InMemoryJobStore, JobId, JobState, JobStore};
pub use crate::export::options::{PdfExportOptions, QualityTier, UserRole};
pub use crate::export::pipeline::{ExportConfig, ExportHandle, ExportOutcome, ExportService};
pub use crate::model::book::{BookDef, PageDef};
pub use crate::model::element::ElementDef;
pub use crate::render::fetch::{FileImageFetcher, HttpImageFetcher, ImageFetcher};
pub use crate::render::headless::HeadlessRenderer;
