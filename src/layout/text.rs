use crate::foundation::core::Rgba8;
use crate::foundation::error::{FolioError, FolioResult};
use crate::theme::resolver::ResolvedStyle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Horizontal and vertical padding between an element box and its text
/// content, in canvas pixels. Shared by both renderers.
pub const TEXT_PADDING_PX: f64 = 8.0;

/// One positioned glyph in layout-local coordinates (x from the content
/// left edge, y on the run's baseline).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphPos {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// A shaped glyph run pinned to a baseline. Runs carry their font handle so
/// the rasterizer never re-derives metrics: whatever parley measured here is
/// what gets drawn, in both renderers.
#[derive(Clone, Debug)]
pub struct TextRun {
    pub glyphs: Vec<GlyphPos>,
    pub font: vello_cpu::peniko::FontData,
    pub font_size: f32,
    pub color: Rgba8,
    pub baseline: f32,
}

/// Result of laying a text block against a fixed content width.
#[derive(Clone, Debug, Default)]
pub struct TextLayout {
    pub runs: Vec<TextRun>,
    /// Full (unclipped) content height in pixels.
    pub height: f64,
    /// Baseline offsets of every laid-out line, before clipping.
    pub line_baselines: Vec<f64>,
    /// Content was taller than the box. The interactive renderer shows a
    /// warning affordance; export clips silently (the clipped runs are
    /// already dropped from `runs`).
    pub overflow: bool,
    /// Input text was empty; only the interactive renderer draws a
    /// placeholder marker for this.
    pub empty: bool,
}

/// Normalize and validate an assets-relative font path. Rejects absolute
/// paths and parent traversal.
pub fn normalize_rel_path(source: &str) -> FolioResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(FolioError::validation("font paths must be relative"));
    }
    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(FolioError::validation("font paths must not contain '..'"));
        }
        out.push(part);
    }
    if out.is_empty() {
        return Err(FolioError::validation("font path must contain a file name"));
    }
    Ok(out.join("/"))
}

struct RegisteredFont {
    family_name: String,
    data: vello_cpu::peniko::FontData,
}

/// Shaping and line-breaking engine over raw font bytes.
///
/// One instance is the single font-metrics source for a renderer; the
/// interactive surface and the headless exporter each construct theirs from
/// the same assets root, which is what makes their baselines agree.
pub struct TextLayoutEngine {
    assets_root: PathBuf,
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
    fonts: HashMap<String, RegisteredFont>,
}

impl TextLayoutEngine {
    pub fn new(assets_root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: assets_root.into(),
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            fonts: HashMap::new(),
        }
    }

    fn font_for(&mut self, source: &str) -> FolioResult<&RegisteredFont> {
        if !self.fonts.contains_key(source) {
            let norm = normalize_rel_path(source)?;
            let path = self.assets_root.join(Path::new(&norm));
            let bytes = std::fs::read(&path).map_err(|e| {
                FolioError::layout(format!("failed to read font '{}': {e}", path.display()))
            })?;

            let families = self
                .font_ctx
                .collection
                .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
            let family_id = families
                .first()
                .map(|(id, _)| *id)
                .ok_or_else(|| FolioError::layout("no font families in font bytes"))?;
            let family_name = self
                .font_ctx
                .collection
                .family_name(family_id)
                .ok_or_else(|| FolioError::layout("registered font family has no name"))?
                .to_string();

            let data = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
            self.fonts.insert(
                source.to_owned(),
                RegisteredFont { family_name, data },
            );
        }
        Ok(&self.fonts[source])
    }

    /// Line-wrap `text` against `max_width`, producing runs with real
    /// baselines from font metrics. `max_height` clips: runs whose baseline
    /// falls below it are dropped and the layout is flagged overflowing.
    pub fn layout_text(
        &mut self,
        text: &str,
        style: &ResolvedStyle,
        max_width: f64,
        max_height: Option<f64>,
    ) -> FolioResult<TextLayout> {
        if text.is_empty() {
            return Ok(TextLayout {
                empty: true,
                ..TextLayout::default()
            });
        }
        let size_px = style.font_size_px;
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(FolioError::layout("font size must be finite and > 0"));
        }
        let source = style
            .font_source
            .as_deref()
            .ok_or_else(|| FolioError::layout("text element resolved without a font source"))?;

        let (family_name, font_data) = {
            let f = self.font_for(source)?;
            (f.family_name.clone(), f.data.clone())
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px as f32));
        builder.push_default(parley::style::StyleProperty::Brush(style.text_color));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        let width = max_width.max(1.0) as f32;
        layout.break_all_lines(Some(width));
        layout.align(
            Some(width),
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );

        let mut out = TextLayout {
            height: f64::from(layout.height()),
            ..TextLayout::default()
        };

        for line in layout.lines() {
            let baseline = f64::from(line.metrics().baseline);
            out.line_baselines.push(baseline);
            let clipped = max_height.is_some_and(|h| baseline > h);
            if clipped {
                out.overflow = true;
                continue;
            }
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let color = run.style().brush;
                let glyphs = run
                    .glyphs()
                    .map(|g| GlyphPos {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    })
                    .collect();
                out.runs.push(TextRun {
                    glyphs,
                    font: font_data.clone(),
                    font_size: run.run().font_size(),
                    color,
                    baseline: baseline as f32,
                });
            }
        }

        if let Some(h) = max_height
            && out.height > h
        {
            out.overflow = true;
        }
        Ok(out)
    }
}

/// Baseline offsets for ruled answer lines inside a box of height `box_h`,
/// spaced by the resolved line height. Purely metric-driven, identical in
/// both renderers.
pub fn ruled_line_offsets(style: &ResolvedStyle, box_h: f64) -> Vec<f64> {
    let step = (style.font_size_px * style.line_height).max(4.0);
    let mut offsets = Vec::new();
    let mut y = step;
    while y <= box_h - TEXT_PADDING_PX {
        offsets.push(y);
        y += step;
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::resolver::{ResolvedStyle, sketch_seed};

    fn style_with_font(source: Option<String>) -> ResolvedStyle {
        ResolvedStyle {
            fill: None,
            stroke: None,
            stroke_width: 2.0,
            roughness: 0.0,
            sketch_seed: sketch_seed("t"),
            font_source: source,
            font_size_px: 16.0,
            line_height: 1.4,
            text_color: Rgba8::BLACK,
            ruled_line_color: Rgba8::opaque(0x9c, 0xa3, 0xaf),
            pattern: None,
            opacity: 1.0,
        }
    }

    #[test]
    fn rel_path_is_normalized() {
        assert_eq!(normalize_rel_path("fonts//a.ttf").unwrap(), "fonts/a.ttf");
        assert_eq!(normalize_rel_path("./fonts/a.ttf").unwrap(), "fonts/a.ttf");
        assert!(normalize_rel_path("/etc/a.ttf").is_err());
        assert!(normalize_rel_path("../a.ttf").is_err());
        assert!(normalize_rel_path("").is_err());
    }

    #[test]
    fn empty_text_is_flagged_not_laid_out() {
        let mut engine = TextLayoutEngine::new(std::env::temp_dir());
        let layout = engine
            .layout_text("", &style_with_font(None), 200.0, None)
            .unwrap();
        assert!(layout.empty);
        assert!(layout.runs.is_empty());
        assert!(!layout.overflow);
    }

    #[test]
    fn ruled_lines_fill_the_box() {
        let style = style_with_font(None);
        let offsets = ruled_line_offsets(&style, 120.0);
        assert!(!offsets.is_empty());
        let step = style.font_size_px * style.line_height;
        for pair in offsets.windows(2) {
            assert!((pair[1] - pair[0] - step).abs() < 1e-9);
        }
        assert!(*offsets.last().unwrap() <= 120.0 - TEXT_PADDING_PX);
    }

    #[test]
    fn missing_font_is_a_layout_error() {
        let mut engine = TextLayoutEngine::new(std::env::temp_dir());
        let style = style_with_font(Some("fonts/definitely-missing.ttf".to_owned()));
        assert!(matches!(
            engine.layout_text("hello", &style, 200.0, None),
            Err(FolioError::Layout(_))
        ));
    }
}
