use crate::export::options::QualityTier;
use crate::foundation::core::PixelFrame;
use crate::foundation::error::{FolioError, FolioResult};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::imageops::FilterType;
use std::io::Write;
use std::path::Path;

/// JPEG quality for RGB page images.
const JPEG_QUALITY: u8 = 90;

/// An ICC profile picked up from the profiles directory.
#[derive(Clone, Debug)]
pub struct IccProfile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Look up `<dir>/<name>.icc`. A missing or unreadable profile is a
/// recoverable condition: the caller falls back to uncalibrated CMYK and
/// surfaces a warning, never a failure.
pub fn load_icc_profile(dir: &Path, name: &str) -> Option<IccProfile> {
    let path = dir.join(format!("{name}.icc"));
    match std::fs::read(&path) {
        Ok(bytes) => Some(IccProfile {
            name: name.to_owned(),
            bytes,
        }),
        Err(e) => {
            tracing::warn!(profile = %name, path = %path.display(), error = %e,
                "icc profile unavailable, falling back to uncalibrated cmyk");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageEncoding {
    /// Baseline JPEG, RGB. Embedded into the PDF as DCTDecode.
    Jpeg,
    /// Raw CMYK bytes, zlib-compressed. Embedded as FlateDecode.
    CmykFlate,
}

/// One post-processed page image, sized for its quality tier and ready for
/// embedding.
#[derive(Clone, Debug)]
pub struct ProcessedPage {
    pub width_px: u32,
    pub height_px: u32,
    pub encoding: PageEncoding,
    pub data: Vec<u8>,
}

/// Pixel dimensions implied by physical size and DPI.
pub fn target_pixels(page_pts: (f64, f64), dpi: u32) -> (u32, u32) {
    (
        (page_pts.0 * f64::from(dpi) / 72.0).round().max(1.0) as u32,
        (page_pts.1 * f64::from(dpi) / 72.0).round().max(1.0) as u32,
    )
}

/// Resample a rendered page to its tier's DPI and encode it.
///
/// The premultiplied raster is composited over paper white first (print has
/// no alpha), resampled with Lanczos3, then encoded as JPEG for on-screen
/// tiers or zlib-compressed CMYK for print output.
pub fn process_page(
    frame: &PixelFrame,
    page_pts: (f64, f64),
    tier: QualityTier,
    cmyk: bool,
) -> FolioResult<ProcessedPage> {
    let rgb = unpremultiply_over_white(frame)?;
    let (tw, th) = target_pixels(page_pts, tier.dpi());
    let resized = if (tw, th) == (frame.width, frame.height) {
        rgb
    } else {
        image::imageops::resize(&rgb, tw, th, FilterType::Lanczos3)
    };

    if cmyk {
        let mut raw = Vec::with_capacity((tw as usize) * (th as usize) * 4);
        for px in resized.pixels() {
            raw.extend_from_slice(&rgb_to_cmyk(px.0[0], px.0[1], px.0[2]));
        }
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw)
            .and_then(|_| enc.finish())
            .map(|data| ProcessedPage {
                width_px: tw,
                height_px: th,
                encoding: PageEncoding::CmykFlate,
                data,
            })
            .map_err(|e| FolioError::render(format!("cmyk compression failed: {e}")))
    } else {
        let mut data = Vec::new();
        let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY);
        enc.encode(
            resized.as_raw(),
            tw,
            th,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| FolioError::render(format!("jpeg encoding failed: {e}")))?;
        Ok(ProcessedPage {
            width_px: tw,
            height_px: th,
            encoding: PageEncoding::Jpeg,
            data,
        })
    }
}

fn unpremultiply_over_white(frame: &PixelFrame) -> FolioResult<image::RgbImage> {
    let mut out = Vec::with_capacity((frame.width as usize) * (frame.height as usize) * 3);
    for px in frame.data.chunks_exact(4) {
        let inv = 255 - u16::from(px[3]);
        out.push((u16::from(px[0]) + inv).min(255) as u8);
        out.push((u16::from(px[1]) + inv).min(255) as u8);
        out.push((u16::from(px[2]) + inv).min(255) as u8);
    }
    image::RgbImage::from_raw(frame.width, frame.height, out)
        .ok_or_else(|| FolioError::render("raster to rgb conversion failed"))
}

/// Standard uncalibrated RGB→CMYK separation. When an ICC profile is
/// available it is embedded in the PDF as the image's colorspace so the RIP
/// applies the calibrated interpretation; the separation itself stays
/// uncalibrated either way.
pub fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> [u8; 4] {
    let rf = f64::from(r) / 255.0;
    let gf = f64::from(g) / 255.0;
    let bf = f64::from(b) / 255.0;
    let k = 1.0 - rf.max(gf).max(bf);
    if k >= 1.0 {
        return [0, 0, 0, 255];
    }
    let c = (1.0 - rf - k) / (1.0 - k);
    let m = (1.0 - gf - k) / (1.0 - k);
    let y = (1.0 - bf - k) / (1.0 - k);
    [
        (c * 255.0).round() as u8,
        (m * 255.0).round() as u8,
        (y * 255.0).round() as u8,
        (k * 255.0).round() as u8,
    ]
}
