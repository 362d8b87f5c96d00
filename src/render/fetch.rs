use crate::foundation::error::{FolioError, FolioResult};
use crate::model::book::{BackgroundFillDef, PageDef};
use crate::model::element::ElementKindDef;
use crate::scene::builder::ImageBank;
use crate::scene::graph::ImagePaint;
use std::path::PathBuf;
use std::sync::Arc;

/// Source of raw image bytes for the export path. The offscreen context
/// cannot rely on the editing session's network/credential context, so
/// everything it draws is fetched and inlined up front through this trait.
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> FolioResult<Vec<u8>>;
}

/// Fetches user photos from the upload/storage service over HTTP.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> FolioResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("foliopress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FolioError::resource(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, source: &str) -> FolioResult<Vec<u8>> {
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(FolioError::validation(format!(
                "not a fetchable url: '{source}'"
            )));
        }
        let resp = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| FolioError::resource(format!("fetch '{source}' failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(FolioError::resource(format!(
                "fetch '{source}' returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FolioError::resource(format!("read '{source}' failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Resolves sources against a local directory. Used by the CLI for books
/// that reference bundled assets, and by tests.
pub struct FileImageFetcher {
    root: PathBuf,
}

impl FileImageFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl ImageFetcher for FileImageFetcher {
    async fn fetch(&self, source: &str) -> FolioResult<Vec<u8>> {
        let rel = crate::layout::text::normalize_rel_path(source)?;
        let path = self.root.join(rel);
        tokio::fs::read(&path).await.map_err(|e| {
            FolioError::resource(format!("read '{}' failed: {e}", path.display()))
        })
    }
}

/// Decode raw image bytes into the premultiplied RGBA form the painter
/// consumes.
pub fn decode_image_premul(bytes: &[u8]) -> FolioResult<ImagePaint> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| FolioError::render(format!("image decode failed: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((u16::from(px[0]) * a + 127) / 255) as u8;
        px[1] = ((u16::from(px[1]) * a + 127) / 255) as u8;
        px[2] = ((u16::from(px[2]) * a + 127) / 255) as u8;
    }
    Ok(ImagePaint {
        width,
        height,
        rgba8_premul: Arc::new(data),
    })
}

/// Every image source a page references: its background plus all photo
/// elements.
pub fn page_image_sources(page: &PageDef) -> Vec<String> {
    let mut sources = Vec::new();
    if let BackgroundFillDef::Image { source } = &page.background.fill {
        sources.push(source.clone());
    }
    for el in &page.elements {
        if let ElementKindDef::Image {
            source: Some(source),
        } = &el.kind
        {
            sources.push(source.clone());
        }
    }
    sources.dedup();
    sources
}

/// Fetch and decode every image a page needs, inlining the results.
///
/// Per-image failures degrade that image to an empty placeholder rather
/// than failing the page: the source is simply absent from the returned
/// bank, and a human-readable warning is collected for the job record.
pub async fn resolve_page_images(
    page: &PageDef,
    fetcher: &dyn ImageFetcher,
) -> (ImageBank, Vec<String>) {
    let mut bank = ImageBank::new();
    let mut warnings = Vec::new();
    for source in page_image_sources(page) {
        match fetcher.fetch(&source).await {
            Ok(bytes) => match decode_image_premul(&bytes) {
                Ok(paint) => {
                    bank.insert(source, paint);
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "image decode failed");
                    warnings.push(format!("image '{source}' could not be decoded"));
                }
            },
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "image fetch failed");
                warnings.push(format!("image '{source}' could not be fetched"));
            }
        }
    }
    (bank, warnings)
}
