use crate::foundation::core::Rgba8;
use crate::model::book::PatternSpecDef;
use crate::theme::palette::ColorRole;
use serde::{Deserialize, Serialize};

/// One element on a page. Geometry is page-local canvas pixels; z-order is
/// the page's element order unless `z` overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDef {
    pub id: String,
    pub kind: ElementKindDef,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
    #[serde(default)]
    pub rotation_deg: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub z: Option<i32>,
    #[serde(default)]
    pub style: StyleOverrideDef,
}

fn default_opacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKindDef {
    Rect,
    Ellipse,
    /// Straight segment from (x, y) to (x2, y2); w/h are ignored.
    Line {
        x2: f64,
        y2: f64,
    },
    /// Freehand brush path in page-local coordinates.
    Freehand {
        points: Vec<[f64; 2]>,
    },
    /// Photo slot. `source` is `None` while the slot is an empty placeholder
    /// or an upload is still in flight.
    Image {
        #[serde(default)]
        source: Option<String>,
    },
    Text {
        text: String,
    },
    Question {
        text: String,
    },
    Answer {
        #[serde(default)]
        text: String,
        #[serde(default = "default_true")]
        ruled: bool,
    },
    /// Inline question/answer block: question text on top, ruled answer
    /// area below it, one border around both.
    Qna {
        question: String,
        #[serde(default)]
        answer: String,
    },
}

fn default_true() -> bool {
    true
}

impl ElementKindDef {
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            Self::Text { .. } | Self::Question { .. } | Self::Answer { .. } | Self::Qna { .. }
        )
    }
}

/// Per-element style overrides. Every field is optional; unset fields fall
/// through to the page/book theme and ultimately the global default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleOverrideDef {
    #[serde(default)]
    pub fill: Option<ColorDef>,
    #[serde(default)]
    pub stroke: Option<ColorDef>,
    #[serde(default)]
    pub stroke_width: Option<f64>,
    #[serde(default)]
    pub roughness: Option<f64>,
    #[serde(default)]
    pub font_source: Option<String>,
    #[serde(default)]
    pub font_size_px: Option<f64>,
    #[serde(default)]
    pub line_height: Option<f64>,
    #[serde(default)]
    pub pattern: Option<PatternSpecDef>,
}

/// A color at the model boundary: either a literal hex color or a reference
/// to a palette role, written `role:primary`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorDef {
    Literal(Rgba8),
    Role(ColorRole),
}

impl ColorDef {
    pub const fn literal(c: Rgba8) -> Self {
        Self::Literal(c)
    }
}

impl Serialize for ColorDef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Literal(c) => serializer.serialize_str(&c.to_hex()),
            Self::Role(role) => serializer.serialize_str(&format!("role:{}", role.as_str())),
        }
    }
}

impl<'de> Deserialize<'de> for ColorDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if let Some(role) = s.strip_prefix("role:") {
            let role = ColorRole::parse(role).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown palette role '{role}'"))
            })?;
            return Ok(Self::Role(role));
        }
        Rgba8::from_hex(&s)
            .map(Self::Literal)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_def_parses_literals_and_roles() {
        let lit: ColorDef = serde_json::from_str("\"#1f2937\"").unwrap();
        assert_eq!(lit, ColorDef::Literal(Rgba8::opaque(0x1f, 0x29, 0x37)));

        let role: ColorDef = serde_json::from_str("\"role:primary\"").unwrap();
        assert_eq!(role, ColorDef::Role(ColorRole::Primary));

        assert!(serde_json::from_str::<ColorDef>("\"role:bogus\"").is_err());
    }

    #[test]
    fn element_defaults_are_tolerant() {
        let el: ElementDef = serde_json::from_str(
            r##"{"id":"e1","kind":{"kind":"rect"},"x":10,"y":20,"w":100,"h":50}"##,
        )
        .unwrap();
        assert_eq!(el.opacity, 1.0);
        assert_eq!(el.rotation_deg, 0.0);
        assert!(el.style.fill.is_none());
        assert!(el.z.is_none());
    }

    #[test]
    fn answer_defaults_to_ruled() {
        let el: ElementDef = serde_json::from_str(
            r##"{"id":"a1","kind":{"kind":"answer"},"w":200,"h":90}"##,
        )
        .unwrap();
        match el.kind {
            ElementKindDef::Answer { ruled, ref text } => {
                assert!(ruled);
                assert!(text.is_empty());
            }
            _ => panic!("expected answer"),
        }
    }
}
