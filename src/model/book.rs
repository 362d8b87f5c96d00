use crate::foundation::core::{PageFormat, Orientation};
use crate::foundation::error::{FolioError, FolioResult};
use crate::model::element::{ColorDef, ElementDef};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A whole book as the persistence layer hands it to us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page_format: PageFormat,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub palette: Option<String>,
    pub pages: Vec<PageDef>,
}

impl BookDef {
    /// Boundary validation: at least one page, element ids unique per page.
    pub fn validate(&self) -> FolioResult<()> {
        if self.pages.is_empty() {
            return Err(FolioError::validation("book must have at least one page"));
        }
        for (i, page) in self.pages.iter().enumerate() {
            let mut seen = HashSet::new();
            for el in &page.elements {
                if el.id.is_empty() {
                    return Err(FolioError::validation(format!(
                        "page {} has an element with an empty id",
                        i + 1
                    )));
                }
                if !seen.insert(el.id.as_str()) {
                    return Err(FolioError::validation(format!(
                        "page {} has duplicate element id '{}'",
                        i + 1,
                        el.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDef {
    #[serde(default)]
    pub background: BackgroundDef,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
    /// Page-level theme override; falls back to the book theme.
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub palette: Option<String>,
}

impl PageDef {
    pub fn element(&self, id: &str) -> Option<&ElementDef> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// Exactly one background per page, always rendered first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundDef {
    #[serde(default)]
    pub fill: BackgroundFillDef,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for BackgroundDef {
    fn default() -> Self {
        Self {
            fill: BackgroundFillDef::default(),
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundFillDef {
    Color { color: ColorDef },
    Image { source: String },
    Pattern { pattern: PatternSpecDef },
}

impl Default for BackgroundFillDef {
    fn default() -> Self {
        Self::Color {
            color: ColorDef::Role(crate::theme::palette::ColorRole::Paper),
        }
    }
}

/// Declarative tiled-pattern parameters. The pattern tile bitmap is always
/// regenerated from these; a cached tile handle never crosses a structural
/// clone (see the snapshot transformer).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PatternSpecDef {
    pub kind: PatternKind,
    pub color: ColorDef,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_pattern_stroke")]
    pub stroke_width: f64,
}

fn default_scale() -> f64 {
    1.0
}

fn default_pattern_stroke() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Dots,
    Grid,
    Stripes,
    Crosshatch,
    Checker,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_book(pages: Vec<PageDef>) -> BookDef {
        BookDef {
            id: "b1".to_owned(),
            title: None,
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            theme: None,
            palette: None,
            pages,
        }
    }

    #[test]
    fn empty_book_is_rejected() {
        assert!(minimal_book(Vec::new()).validate().is_err());
    }

    #[test]
    fn duplicate_element_ids_are_rejected() {
        let el = r##"{"id":"e1","kind":{"kind":"rect"}}"##;
        let page: PageDef = serde_json::from_str(&format!(
            r##"{{"elements":[{el},{el}]}}"##
        ))
        .unwrap();
        assert!(minimal_book(vec![page]).validate().is_err());
    }

    #[test]
    fn background_defaults_to_paper_color() {
        let page: PageDef = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            page.background.fill,
            BackgroundFillDef::Color { .. }
        ));
        assert_eq!(page.background.opacity, 1.0);
    }

    #[test]
    fn pattern_background_parses() {
        let bg: BackgroundDef = serde_json::from_str(
            r##"{"fill":{"type":"pattern","pattern":{"kind":"dots","color":"#888888","scale":2.0}}}"##,
        )
        .unwrap();
        match bg.fill {
            BackgroundFillDef::Pattern { pattern } => {
                assert_eq!(pattern.kind, PatternKind::Dots);
                assert_eq!(pattern.scale, 2.0);
                assert_eq!(pattern.stroke_width, 1.0);
            }
            _ => panic!("expected pattern fill"),
        }
    }
}
