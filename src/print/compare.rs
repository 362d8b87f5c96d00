use crate::foundation::core::MM_PER_PT;
use crate::foundation::error::{FolioError, FolioResult};
use std::io::Read;
use std::path::Path;

/// Structural facts about one PDF page plus its embedded raster, as far as
/// the scanner could recover them.
#[derive(Clone, Debug)]
pub struct PdfPageSummary {
    pub width_pt: f64,
    pub height_pt: f64,
    pub image: Option<image::RgbImage>,
}

#[derive(Clone, Debug, Default)]
pub struct PdfSummary {
    pub pages: Vec<PdfPageSummary>,
}

/// Per-page comparison outcome.
#[derive(Clone, Debug)]
pub struct PageComparison {
    pub index: usize,
    pub dimension_mismatch: bool,
    /// Percentage of differing pixels; `None` when either raster could not
    /// be recovered or the rasters disagree on size.
    pub diff_percent: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct CompareReport {
    pub page_count_a: usize,
    pub page_count_b: usize,
    pub pages: Vec<PageComparison>,
}

impl CompareReport {
    /// Structural mismatches indicate a renderer-parity bug to investigate;
    /// they are reported, never auto-corrected.
    pub fn structural_mismatch(&self) -> bool {
        self.page_count_a != self.page_count_b
            || self.pages.iter().any(|p| p.dimension_mismatch)
    }
}

/// Scan a PDF produced by this engine: page MediaBoxes in document order
/// plus each page's embedded raster. This is a diagnostic scanner for
/// acceptance testing of renderer parity, not a general PDF reader.
pub fn read_pdf_summary(path: &Path) -> FolioResult<PdfSummary> {
    let bytes = std::fs::read(path)?;
    if !bytes.starts_with(b"%PDF-") {
        return Err(FolioError::pdf(format!(
            "'{}' is not a pdf file",
            path.display()
        )));
    }

    let mut summary = PdfSummary::default();
    let mut images = extract_page_images(&bytes);
    for (w, h) in extract_media_boxes(&bytes) {
        summary.pages.push(PdfPageSummary {
            width_pt: w,
            height_pt: h,
            image: if images.is_empty() {
                None
            } else {
                Some(images.remove(0))
            },
        });
    }
    Ok(summary)
}

fn extract_media_boxes(bytes: &[u8]) -> Vec<(f64, f64)> {
    let mut boxes = Vec::new();
    let needle = b"/MediaBox";
    let mut at = 0;
    while let Some(pos) = find(bytes, needle, at) {
        at = pos + needle.len();
        let Some(open) = find(bytes, b"[", at) else { break };
        let Some(close) = find(bytes, b"]", open) else { break };
        let body = String::from_utf8_lossy(&bytes[open + 1..close]);
        let nums: Vec<f64> = body
            .split_whitespace()
            .filter_map(|t| t.parse().ok())
            .collect();
        if nums.len() == 4 {
            boxes.push((nums[2] - nums[0], nums[3] - nums[1]));
        }
        at = close;
    }
    boxes
}

fn extract_page_images(bytes: &[u8]) -> Vec<image::RgbImage> {
    let mut out = Vec::new();
    // Writers differ on whitespace between the key and the name.
    let needle: &[u8] = if find(bytes, b"/Subtype /Image", 0).is_some() {
        b"/Subtype /Image"
    } else {
        b"/Subtype/Image"
    };
    let mut at = 0;
    while let Some(pos) = find(bytes, needle, at) {
        // The dictionary opens somewhere before the subtype key; take a
        // window around it for the parameter scan.
        let dict_start = rfind(&bytes[..pos], b"<<").unwrap_or(pos.saturating_sub(256));
        let Some(stream_kw) = find(bytes, b"stream", pos) else { break };
        let dict = String::from_utf8_lossy(&bytes[dict_start..stream_kw]);

        let data_start = match bytes.get(stream_kw + 6..stream_kw + 8) {
            Some(b"\r\n") => stream_kw + 8,
            _ => stream_kw + 7,
        };
        let Some(data_end) = find(bytes, b"endstream", data_start) else { break };
        at = data_end;

        let data = &bytes[data_start..data_end];
        if dict.contains("/DCTDecode") {
            if let Ok(img) = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg) {
                out.push(img.to_rgb8());
            }
        } else if dict.contains("/FlateDecode") {
            let (w, h) = (dict_int(&dict, "/Width"), dict_int(&dict, "/Height"));
            if let (Some(w), Some(h)) = (w, h) {
                let mut raw = Vec::new();
                let mut dec = flate2::read::ZlibDecoder::new(data);
                if dec.read_to_end(&mut raw).is_ok()
                    && raw.len() == (w as usize) * (h as usize) * 4
                {
                    // CMYK back to RGB for comparison purposes.
                    let mut rgb = Vec::with_capacity((w as usize) * (h as usize) * 3);
                    for px in raw.chunks_exact(4) {
                        let k = f64::from(px[3]) / 255.0;
                        let inv = |c: u8| {
                            ((1.0 - f64::from(c) / 255.0) * (1.0 - k) * 255.0).round() as u8
                        };
                        rgb.extend_from_slice(&[inv(px[0]), inv(px[1]), inv(px[2])]);
                    }
                    if let Some(img) = image::RgbImage::from_raw(w, h, rgb) {
                        out.push(img);
                    }
                }
            }
        }
    }
    out
}

fn dict_int(dict: &str, key: &str) -> Option<u32> {
    let pos = dict.find(key)?;
    let digits: String = dict[pos + key.len()..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|w| w == needle)
}

/// Per-channel tolerance when comparing rasters (absorbs JPEG noise).
const PIXEL_TOLERANCE: u8 = 8;

/// Compare two exported PDFs: page count, per-page physical dimensions
/// (±`tolerance_mm`), and per-page pixel difference of the embedded
/// rasters.
pub fn compare_pdfs(a: &Path, b: &Path, tolerance_mm: f64) -> FolioResult<CompareReport> {
    let sa = read_pdf_summary(a)?;
    let sb = read_pdf_summary(b)?;
    let n = sa.pages.len().min(sb.pages.len());
    let mut pages = Vec::with_capacity(n);
    for i in 0..n {
        let (pa, pb) = (&sa.pages[i], &sb.pages[i]);
        let dw = (pa.width_pt - pb.width_pt).abs() * MM_PER_PT;
        let dh = (pa.height_pt - pb.height_pt).abs() * MM_PER_PT;
        let dimension_mismatch = dw > tolerance_mm || dh > tolerance_mm;
        let diff_percent = match (&pa.image, &pb.image) {
            (Some(ia), Some(ib)) if ia.dimensions() == ib.dimensions() => {
                let total = (ia.width() as usize) * (ia.height() as usize);
                let differing = ia
                    .pixels()
                    .zip(ib.pixels())
                    .filter(|(x, y)| {
                        x.0.iter()
                            .zip(y.0.iter())
                            .any(|(ca, cb)| ca.abs_diff(*cb) > PIXEL_TOLERANCE)
                    })
                    .count();
                Some(differing as f64 * 100.0 / total.max(1) as f64)
            }
            _ => None,
        };
        pages.push(PageComparison {
            index: i,
            dimension_mismatch,
            diff_percent,
        });
    }
    Ok(CompareReport {
        page_count_a: sa.pages.len(),
        page_count_b: sb.pages.len(),
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::pdf::PdfAssembler;
    use crate::print::postprocess::{PageEncoding, ProcessedPage};

    fn jpeg_page(color: [u8; 3]) -> ProcessedPage {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb(color));
        let mut data = Vec::new();
        let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, 90);
        enc.encode(img.as_raw(), 8, 8, image::ExtendedColorType::Rgb8)
            .unwrap();
        ProcessedPage {
            width_px: 8,
            height_px: 8,
            encoding: PageEncoding::Jpeg,
            data,
        }
    }

    fn write_pdf(dir: &Path, name: &str, pages: &[[u8; 3]], w_pt: f64, h_pt: f64) -> std::path::PathBuf {
        let mut asm = PdfAssembler::new(w_pt, h_pt, None).unwrap();
        for c in pages {
            asm.add_page(&jpeg_page(*c)).unwrap();
        }
        let path = dir.join(name);
        std::fs::write(&path, asm.finish().unwrap()).unwrap();
        path
    }

    #[test]
    fn identical_documents_report_zero_diff() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_pdf(dir.path(), "a.pdf", &[[255, 0, 0]], 595.276, 841.89);
        let b = write_pdf(dir.path(), "b.pdf", &[[255, 0, 0]], 595.276, 841.89);
        let report = compare_pdfs(&a, &b, 0.1).unwrap();
        assert!(!report.structural_mismatch());
        assert_eq!(report.pages[0].diff_percent, Some(0.0));
    }

    #[test]
    fn page_count_mismatch_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_pdf(dir.path(), "a.pdf", &[[0, 0, 0]; 2], 595.276, 841.89);
        let b = write_pdf(dir.path(), "b.pdf", &[[0, 0, 0]], 595.276, 841.89);
        let report = compare_pdfs(&a, &b, 0.1).unwrap();
        assert!(report.structural_mismatch());
        assert_eq!((report.page_count_a, report.page_count_b), (2, 1));
    }

    #[test]
    fn dimension_mismatch_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_pdf(dir.path(), "a.pdf", &[[0, 0, 0]], 595.276, 841.89);
        let b = write_pdf(dir.path(), "b.pdf", &[[0, 0, 0]], 419.528, 595.276);
        let report = compare_pdfs(&a, &b, 0.1).unwrap();
        assert!(report.structural_mismatch());
        assert!(report.pages[0].dimension_mismatch);
    }

    #[test]
    fn different_content_reports_nonzero_diff() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_pdf(dir.path(), "a.pdf", &[[255, 255, 255]], 595.276, 841.89);
        let b = write_pdf(dir.path(), "b.pdf", &[[0, 0, 0]], 595.276, 841.89);
        let report = compare_pdfs(&a, &b, 0.1).unwrap();
        assert!(!report.structural_mismatch());
        assert!(report.pages[0].diff_percent.unwrap() > 99.0);
    }

    #[test]
    fn summary_recovers_media_box() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_pdf(dir.path(), "a.pdf", &[[9, 9, 9]], 595.276, 841.89);
        let summary = read_pdf_summary(&a).unwrap();
        assert_eq!(summary.pages.len(), 1);
        assert!((summary.pages[0].width_pt - 595.276).abs() < 0.5);
        assert!((summary.pages[0].height_pt - 841.89).abs() < 0.5);
        assert!(summary.pages[0].image.is_some());
    }
}
