//! Text layout against a real font: wrapping, baselines from font metrics,
//! overflow flagging, and layout parity between two independently
//! constructed engines (the interactive/export divergence killer).
//!
//! Skips silently when no system font can be found.

use foliopress::layout::text::{TEXT_PADDING_PX, TextLayoutEngine};
use foliopress::theme::palette::PaletteRegistry;
use foliopress::theme::resolver::{ResolvedStyle, ThemeRegistry, resolve, sketch_seed};
use foliopress::Rgba8;
use std::path::Path;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

fn assets_with_font() -> Option<tempfile::TempDir> {
    let source = FONT_CANDIDATES.iter().map(Path::new).find(|p| p.exists())?;
    let dir = tempfile::tempdir().ok()?;
    std::fs::create_dir_all(dir.path().join("fonts")).ok()?;
    std::fs::copy(source, dir.path().join("fonts/book-regular.ttf")).ok()?;
    Some(dir)
}

fn style() -> ResolvedStyle {
    ResolvedStyle {
        fill: None,
        stroke: None,
        stroke_width: 2.0,
        roughness: 0.0,
        sketch_seed: sketch_seed("t1"),
        font_source: Some("fonts/book-regular.ttf".to_owned()),
        font_size_px: 16.0,
        line_height: 1.4,
        text_color: Rgba8::BLACK,
        ruled_line_color: Rgba8::opaque(0x9c, 0xa3, 0xaf),
        pattern: None,
        opacity: 1.0,
    }
}

#[test]
fn long_text_wraps_with_increasing_baselines() {
    let Some(assets) = assets_with_font() else {
        eprintln!("no system font found, skipping");
        return;
    };
    let mut engine = TextLayoutEngine::new(assets.path());
    let text = "The quick brown fox jumps over the lazy dog, again and again, \
                until the line is far too long to fit.";
    let layout = engine.layout_text(text, &style(), 180.0, None).unwrap();

    assert!(!layout.runs.is_empty());
    assert!(layout.line_baselines.len() > 1, "expected wrapping");
    for pair in layout.line_baselines.windows(2) {
        assert!(pair[1] > pair[0], "baselines must descend the block");
    }
    assert!(!layout.overflow);
    assert!(layout.height > 0.0);

    // Glyphs stay inside the wrap width.
    for run in &layout.runs {
        for g in &run.glyphs {
            assert!(g.x >= -1.0 && f64::from(g.x) <= 180.0 + 1.0);
        }
    }
}

#[test]
fn overflow_is_flagged_and_clipped() {
    let Some(assets) = assets_with_font() else {
        eprintln!("no system font found, skipping");
        return;
    };
    let mut engine = TextLayoutEngine::new(assets.path());
    let text = "one two three four five six seven eight nine ten eleven twelve \
                thirteen fourteen fifteen sixteen seventeen eighteen";
    let max_h = 30.0;
    let layout = engine
        .layout_text(text, &style(), 120.0, Some(max_h))
        .unwrap();

    assert!(layout.overflow, "content taller than the box must be flagged");
    for run in &layout.runs {
        assert!(
            f64::from(run.baseline) <= max_h,
            "clipped runs must not be emitted"
        );
    }
    assert!(layout.line_baselines.iter().any(|&b| b > max_h));
}

#[test]
fn independent_engines_agree_on_every_baseline() {
    let Some(assets) = assets_with_font() else {
        eprintln!("no system font found, skipping");
        return;
    };
    let text = "Shared metrics or nothing: both renderers must place every \
                baseline identically.";

    let mut a = TextLayoutEngine::new(assets.path());
    let mut b = TextLayoutEngine::new(assets.path());
    let la = a.layout_text(text, &style(), 200.0, None).unwrap();
    let lb = b.layout_text(text, &style(), 200.0, None).unwrap();

    assert_eq!(la.line_baselines, lb.line_baselines);
    assert_eq!(la.runs.len(), lb.runs.len());
    for (ra, rb) in la.runs.iter().zip(lb.runs.iter()) {
        assert_eq!(ra.font_size, rb.font_size);
        assert_eq!(ra.glyphs.len(), rb.glyphs.len());
        for (ga, gb) in ra.glyphs.iter().zip(rb.glyphs.iter()) {
            assert_eq!((ga.id, ga.x.to_bits(), ga.y.to_bits()), (gb.id, gb.x.to_bits(), gb.y.to_bits()));
        }
    }
}

#[test]
fn question_block_lays_out_through_the_resolver() {
    let Some(assets) = assets_with_font() else {
        eprintln!("no system font found, skipping");
        return;
    };
    use foliopress::foundation::core::{Orientation, PageFormat};
    use foliopress::model::book::{BookDef, PageDef};
    use foliopress::model::element::{ElementDef, ElementKindDef, StyleOverrideDef};

    let el = ElementDef {
        id: "q1".to_owned(),
        kind: ElementKindDef::Question {
            text: "What was your favourite moment of the trip?".to_owned(),
        },
        x: 50.0,
        y: 50.0,
        w: 300.0,
        h: 160.0,
        rotation_deg: 0.0,
        opacity: 1.0,
        z: None,
        style: StyleOverrideDef::default(),
    };
    let book = BookDef {
        id: "b".to_owned(),
        title: None,
        page_format: PageFormat::A4,
        orientation: Orientation::Portrait,
        theme: None,
        palette: None,
        pages: vec![PageDef {
            elements: vec![el],
            ..PageDef::default()
        }],
    };

    let themes = ThemeRegistry::builtin();
    let palettes = PaletteRegistry::builtin();
    let resolved = resolve(&book.pages[0].elements[0], &book.pages[0], &book, &themes, &palettes);
    let mut engine = TextLayoutEngine::new(assets.path());
    let layout = engine
        .layout_text(
            "What was your favourite moment of the trip?",
            &resolved,
            300.0 - 2.0 * TEXT_PADDING_PX,
            Some(160.0 - 2.0 * TEXT_PADDING_PX),
        )
        .unwrap();
    assert!(!layout.runs.is_empty());
    assert!(!layout.empty);
}
