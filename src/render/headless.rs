use crate::export::snapshot::{reorder_background_first, strip_editing_nodes};
use crate::foundation::core::PixelFrame;
use crate::foundation::error::{FolioError, FolioResult};
use crate::layout::text::TextLayoutEngine;
use crate::model::book::BookDef;
use crate::render::fetch::{ImageFetcher, resolve_page_images};
use crate::render::raster::Rasterizer;
use crate::render::surface::SurfacePoolOpts;
use crate::scene::builder::{ImageBank, SceneBuilder};
use crate::theme::palette::PaletteRegistry;
use crate::theme::resolver::ThemeRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// The server-side re-renderer: reconstructs a page scene from raw
/// book/page data through the same resolver, layout engine and scene
/// builder the editor uses, then rasterizes it offscreen.
///
/// One instance is the heavyweight offscreen surface of an export job:
/// acquired at job start, reused across that job's pages, and released by
/// drop on every exit path. It never sees live editor state.
pub struct HeadlessRenderer {
    themes: Arc<ThemeRegistry>,
    palettes: Arc<PaletteRegistry>,
    text: TextLayoutEngine,
    raster: Rasterizer,
}

impl HeadlessRenderer {
    pub fn new(
        assets_root: impl Into<PathBuf>,
        themes: Arc<ThemeRegistry>,
        palettes: Arc<PaletteRegistry>,
        pool_opts: SurfacePoolOpts,
    ) -> Self {
        Self {
            themes,
            palettes,
            text: TextLayoutEngine::new(assets_root),
            raster: Rasterizer::new(pool_opts),
        }
    }

    /// Compose and rasterize one page from raw data at `pixel_ratio`.
    ///
    /// `images` must already hold every inlined image the page references;
    /// anything missing renders as an empty slot. The same z-order
    /// correction as the export snapshot applies, since composing from raw
    /// data has the same structural ambiguity.
    pub fn render_page(
        &mut self,
        book: &BookDef,
        page_index: usize,
        images: &ImageBank,
        pixel_ratio: f64,
    ) -> FolioResult<PixelFrame> {
        let page = book.pages.get(page_index).ok_or_else(|| {
            FolioError::validation(format!("page index {page_index} out of range"))
        })?;
        let mut builder = SceneBuilder {
            themes: &self.themes,
            palettes: &self.palettes,
            text: &mut self.text,
            images,
        };
        let mut scene = builder.build_page(page, book)?;
        // Placeholder affordances are interactive-only; raw-data scenes
        // carry them too, so the same strip applies here.
        strip_editing_nodes(&mut scene);
        reorder_background_first(&mut scene);
        self.raster.rasterize(&scene, pixel_ratio)
    }

    /// Fetch-and-inline variant: resolves every remote image reference up
    /// front (the offscreen context has no ambient network/credential
    /// context), degrading unfetchable images to empty placeholders, then
    /// renders. Returned warnings describe any degradations.
    pub async fn render_page_fetching(
        &mut self,
        book: &BookDef,
        page_index: usize,
        fetcher: &dyn ImageFetcher,
        pixel_ratio: f64,
    ) -> FolioResult<(PixelFrame, Vec<String>)> {
        let page = book.pages.get(page_index).ok_or_else(|| {
            FolioError::validation(format!("page index {page_index} out of range"))
        })?;
        let (bank, warnings) = resolve_page_images(page, fetcher).await;
        let frame = self.render_page(book, page_index, &bank, pixel_ratio)?;
        Ok((frame, warnings))
    }
}
