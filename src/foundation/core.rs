use crate::foundation::error::{FolioError, FolioResult};
use serde::{Deserialize, Serialize};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Millimetres per PostScript point (1 pt = 1/72 inch).
pub const MM_PER_PT: f64 = 0.352_778;

/// Pixel density of the interactive editing canvas (CSS pixel scale).
pub const CANVAS_DPI: f64 = 96.0;

/// Physical page formats the book editor offers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFormat {
    #[default]
    A4,
    A5,
    Letter,
    Square,
}

impl PageFormat {
    /// Portrait dimensions in points.
    pub fn portrait_points(self) -> (f64, f64) {
        match self {
            Self::A4 => (595.276, 841.89),
            Self::A5 => (419.528, 595.276),
            Self::Letter => (612.0, 792.0),
            Self::Square => (595.276, 595.276),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Physical page dimensions in points, orientation applied.
pub fn page_points(format: PageFormat, orientation: Orientation) -> (f64, f64) {
    let (w, h) = format.portrait_points();
    match orientation {
        Orientation::Portrait => (w, h),
        Orientation::Landscape => (h, w),
    }
}

/// Physical page dimensions in millimetres, orientation applied.
pub fn page_millimetres(format: PageFormat, orientation: Orientation) -> (f64, f64) {
    let (w, h) = page_points(format, orientation);
    (w * MM_PER_PT, h * MM_PER_PT)
}

/// Interactive canvas dimensions in pixels for a page.
///
/// Page-local element coordinates live in this space; both renderers agree on
/// it, and the print post-processor rescales from it to the tier DPI.
pub fn canvas_pixels(format: PageFormat, orientation: Orientation) -> (u32, u32) {
    let (w, h) = page_points(format, orientation);
    (
        (w / 72.0 * CANVAS_DPI).round() as u32,
        (h / 72.0 * CANVAS_DPI).round() as u32,
    )
}

/// Straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const WHITE: Self = Self::opaque(255, 255, 255);
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(s: &str) -> FolioResult<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let parse = |h: &str| {
            u8::from_str_radix(h, 16)
                .map_err(|_| FolioError::validation(format!("invalid hex color '{s}'")))
        };
        match hex.len() {
            3 => {
                let r = parse(&hex[0..1])?;
                let g = parse(&hex[1..2])?;
                let b = parse(&hex[2..3])?;
                Ok(Self::opaque(r * 17, g * 17, b * 17))
            }
            6 => Ok(Self::opaque(
                parse(&hex[0..2])?,
                parse(&hex[2..4])?,
                parse(&hex[4..6])?,
            )),
            8 => Ok(Self::new(
                parse(&hex[0..2])?,
                parse(&hex[2..4])?,
                parse(&hex[4..6])?,
                parse(&hex[6..8])?,
            )),
            _ => Err(FolioError::validation(format!("invalid hex color '{s}'"))),
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Scale alpha by `factor` in [0, 1].
    pub fn with_opacity(self, factor: f64) -> Self {
        let a = (f64::from(self.a) * factor.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

/// Pixel buffer in row-major premultiplied RGBA8, as produced by the
/// rasterizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> FolioResult<Self> {
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4);
        if data.len() != expected {
            return Err(FolioError::render("pixel frame byte length mismatch"));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// Which book pages an export covers. Page numbers are 1-based at this
/// boundary; `resolve` yields 0-based indices in export order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSelection {
    All,
    Range { start: usize, end: usize },
    Current { page: usize },
}

impl Default for PageSelection {
    fn default() -> Self {
        Self::All
    }
}

impl PageSelection {
    pub fn resolve(self, page_count: usize) -> FolioResult<Vec<usize>> {
        if page_count == 0 {
            return Err(FolioError::validation("book has no pages"));
        }
        match self {
            Self::All => Ok((0..page_count).collect()),
            Self::Range { start, end } => {
                if start == 0 || end < start || end > page_count {
                    return Err(FolioError::validation(format!(
                        "page range {start}..{end} is outside 1..{page_count}"
                    )));
                }
                Ok(((start - 1)..end).collect())
            }
            Self::Current { page } => {
                if page == 0 || page > page_count {
                    return Err(FolioError::validation(format!(
                        "page {page} is outside 1..{page_count}"
                    )));
                }
                Ok(vec![page - 1])
            }
        }
    }
}
