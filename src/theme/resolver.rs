use crate::foundation::core::Rgba8;
use crate::model::book::{BookDef, PageDef, PatternSpecDef};
use crate::model::element::{ColorDef, ElementDef, ElementKindDef};
use crate::theme::palette::{ColorRole, Palette, PaletteRegistry};
use std::collections::BTreeMap;

/// Visual defaults a theme supplies per element variant.
///
/// "sketchy" implies hand-drawn stroke rendering (non-zero roughness);
/// "minimal" implies zero roughness and thin strokes.
#[derive(Clone, Debug)]
pub struct Theme {
    pub name: &'static str,
    pub roughness: f64,
    pub stroke_width: f64,
    pub shape_fill: Option<ColorRole>,
    pub stroke_color: ColorRole,
    pub text_color: ColorRole,
    pub ruled_line_color: ColorRole,
    pub font_size_px: f64,
    pub line_height: f64,
    /// Default font, relative to the assets root.
    pub font_source: Option<&'static str>,
}

pub const DEFAULT_THEME: &str = "plain";

/// Immutable theme lookup table; unknown names fall back to
/// [`DEFAULT_THEME`].
pub struct ThemeRegistry {
    themes: BTreeMap<&'static str, Theme>,
}

impl ThemeRegistry {
    pub fn builtin() -> Self {
        let mut themes = BTreeMap::new();
        for t in [
            Theme {
                name: "plain",
                roughness: 0.0,
                stroke_width: 2.0,
                shape_fill: None,
                stroke_color: ColorRole::Ink,
                text_color: ColorRole::Ink,
                ruled_line_color: ColorRole::Muted,
                font_size_px: 16.0,
                line_height: 1.4,
                font_source: Some("fonts/book-regular.ttf"),
            },
            Theme {
                name: "sketchy",
                roughness: 0.8,
                stroke_width: 2.5,
                shape_fill: None,
                stroke_color: ColorRole::Primary,
                text_color: ColorRole::Ink,
                ruled_line_color: ColorRole::Muted,
                font_size_px: 17.0,
                line_height: 1.5,
                font_source: Some("fonts/book-hand.ttf"),
            },
            Theme {
                name: "minimal",
                roughness: 0.0,
                stroke_width: 1.0,
                shape_fill: None,
                stroke_color: ColorRole::Ink,
                text_color: ColorRole::Ink,
                ruled_line_color: ColorRole::Muted,
                font_size_px: 15.0,
                line_height: 1.3,
                font_source: Some("fonts/book-regular.ttf"),
            },
        ] {
            themes.insert(t.name, t);
        }
        Self { themes }
    }

    pub fn get(&self, name: Option<&str>) -> &Theme {
        name.and_then(|n| self.themes.get(n))
            .unwrap_or_else(|| &self.themes[DEFAULT_THEME])
    }
}

/// Fully resolved per-element style; every field is concrete.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStyle {
    pub fill: Option<Rgba8>,
    pub stroke: Option<Rgba8>,
    pub stroke_width: f64,
    pub roughness: f64,
    /// Seed for sketch jitter, derived from the element identity. Never
    /// wall-clock: re-renders of the same element must be bit-identical.
    pub sketch_seed: u64,
    pub font_source: Option<String>,
    pub font_size_px: f64,
    pub line_height: f64,
    pub text_color: Rgba8,
    pub ruled_line_color: Rgba8,
    pub pattern: Option<ResolvedPattern>,
    pub opacity: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedPattern {
    pub kind: crate::model::book::PatternKind,
    pub color: Rgba8,
    pub scale: f64,
    pub stroke_width: f64,
}

pub fn resolve_pattern(spec: &PatternSpecDef, palette: &Palette) -> ResolvedPattern {
    ResolvedPattern {
        kind: spec.kind,
        color: resolve_color(spec.color, palette),
        scale: if spec.scale.is_finite() && spec.scale > 0.0 {
            spec.scale
        } else {
            1.0
        },
        stroke_width: spec.stroke_width.clamp(0.25, 16.0),
    }
}

pub fn resolve_color(def: ColorDef, palette: &Palette) -> Rgba8 {
    match def {
        ColorDef::Literal(c) => c,
        ColorDef::Role(role) => palette.color(role),
    }
}

/// Resolve the effective style for one element.
///
/// Resolution order: element override → page theme → book theme → global
/// default. Total and deterministic: every variant has a complete default
/// under every known theme, and unknown theme/palette names fall back to the
/// defaults instead of erroring.
pub fn resolve(
    element: &ElementDef,
    page: &PageDef,
    book: &BookDef,
    themes: &ThemeRegistry,
    palettes: &PaletteRegistry,
) -> ResolvedStyle {
    let theme = themes.get(page.theme.as_deref().or(book.theme.as_deref()));
    let palette = palettes.get(page.palette.as_deref().or(book.palette.as_deref()));

    let fill = match element.style.fill {
        Some(def) => Some(resolve_color(def, palette)),
        None => default_fill(&element.kind, theme).map(|role| palette.color(role)),
    };
    let stroke = match element.style.stroke {
        Some(def) => Some(resolve_color(def, palette)),
        None => default_stroke(&element.kind, theme).map(|role| palette.color(role)),
    };

    ResolvedStyle {
        fill,
        stroke,
        stroke_width: element
            .style
            .stroke_width
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(theme.stroke_width),
        roughness: element
            .style
            .roughness
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(theme.roughness),
        sketch_seed: sketch_seed(&element.id),
        font_source: element
            .style
            .font_source
            .clone()
            .or_else(|| theme.font_source.map(str::to_owned)),
        font_size_px: element
            .style
            .font_size_px
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(theme.font_size_px),
        line_height: element
            .style
            .line_height
            .filter(|l| l.is_finite() && *l > 0.0)
            .unwrap_or(theme.line_height),
        text_color: palette.color(theme.text_color),
        ruled_line_color: palette.color(theme.ruled_line_color),
        pattern: element
            .style
            .pattern
            .as_ref()
            .map(|p| resolve_pattern(p, palette)),
        opacity: element.opacity.clamp(0.0, 1.0),
    }
}

fn default_fill(kind: &ElementKindDef, theme: &Theme) -> Option<ColorRole> {
    match kind {
        ElementKindDef::Rect | ElementKindDef::Ellipse => theme.shape_fill,
        // Line/freehand are stroke-only; text and image content paint
        // themselves.
        _ => None,
    }
}

fn default_stroke(kind: &ElementKindDef, theme: &Theme) -> Option<ColorRole> {
    match kind {
        ElementKindDef::Rect
        | ElementKindDef::Ellipse
        | ElementKindDef::Line { .. }
        | ElementKindDef::Freehand { .. } => Some(theme.stroke_color),
        ElementKindDef::Qna { .. } => Some(theme.ruled_line_color),
        _ => None,
    }
}

/// Deterministic sketch seed from a stable element id (FNV-1a folded through
/// a SplitMix64 finalizer). Identity-derived so repeated renders of the same
/// element jitter identically.
pub fn sketch_seed(element_id: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in element_id.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let mut z = h.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{Orientation, PageFormat};
    use crate::model::element::StyleOverrideDef;

    fn rect(id: &str) -> ElementDef {
        ElementDef {
            id: id.to_owned(),
            kind: ElementKindDef::Rect,
            x: 0.0,
            y: 0.0,
            w: 100.0,
            h: 50.0,
            rotation_deg: 0.0,
            opacity: 1.0,
            z: None,
            style: StyleOverrideDef::default(),
        }
    }

    fn book(theme: Option<&str>, palette: Option<&str>) -> BookDef {
        BookDef {
            id: "b".to_owned(),
            title: None,
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            theme: theme.map(str::to_owned),
            palette: palette.map(str::to_owned),
            pages: vec![PageDef::default()],
        }
    }

    #[test]
    fn resolve_is_deterministic() {
        let themes = ThemeRegistry::builtin();
        let palettes = PaletteRegistry::builtin();
        let b = book(Some("sketchy"), Some("noir"));
        let el = rect("e1");
        let a = resolve(&el, &b.pages[0], &b, &themes, &palettes);
        let c = resolve(&el, &b.pages[0], &b, &themes, &palettes);
        assert_eq!(a, c);
    }

    #[test]
    fn unknown_theme_falls_back_to_default() {
        let themes = ThemeRegistry::builtin();
        let palettes = PaletteRegistry::builtin();
        let b = book(Some("no-such-theme"), None);
        let style = resolve(&rect("e1"), &b.pages[0], &b, &themes, &palettes);
        assert_eq!(style.roughness, 0.0);
        assert_eq!(style.stroke_width, 2.0);
    }

    #[test]
    fn page_theme_overrides_book_theme() {
        let themes = ThemeRegistry::builtin();
        let palettes = PaletteRegistry::builtin();
        let mut b = book(Some("minimal"), None);
        b.pages[0].theme = Some("sketchy".to_owned());
        let style = resolve(&rect("e1"), &b.pages[0], &b, &themes, &palettes);
        assert!(style.roughness > 0.0);
    }

    #[test]
    fn element_override_wins() {
        let themes = ThemeRegistry::builtin();
        let palettes = PaletteRegistry::builtin();
        let b = book(None, None);
        let mut el = rect("e1");
        el.style.stroke_width = Some(7.0);
        el.style.stroke = Some(ColorDef::Literal(Rgba8::opaque(1, 2, 3)));
        let style = resolve(&el, &b.pages[0], &b, &themes, &palettes);
        assert_eq!(style.stroke_width, 7.0);
        assert_eq!(style.stroke, Some(Rgba8::opaque(1, 2, 3)));
    }

    #[test]
    fn seed_is_stable_per_identity() {
        assert_eq!(sketch_seed("el-1"), sketch_seed("el-1"));
        assert_ne!(sketch_seed("el-1"), sketch_seed("el-2"));
    }
}
