use crate::foundation::core::Rgba8;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic color roles elements may reference instead of literal colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    Primary,
    Accent,
    Paper,
    Ink,
    Muted,
}

impl ColorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Accent => "accent",
            Self::Paper => "paper",
            Self::Ink => "ink",
            Self::Muted => "muted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "accent" => Some(Self::Accent),
            "paper" => Some(Self::Paper),
            "ink" => Some(Self::Ink),
            "muted" => Some(Self::Muted),
            _ => None,
        }
    }
}

/// A named set of role → color mappings.
#[derive(Clone, Debug)]
pub struct Palette {
    pub name: &'static str,
    pub primary: Rgba8,
    pub accent: Rgba8,
    pub paper: Rgba8,
    pub ink: Rgba8,
    pub muted: Rgba8,
}

impl Palette {
    pub fn color(&self, role: ColorRole) -> Rgba8 {
        match role {
            ColorRole::Primary => self.primary,
            ColorRole::Accent => self.accent,
            ColorRole::Paper => self.paper,
            ColorRole::Ink => self.ink,
            ColorRole::Muted => self.muted,
        }
    }
}

pub const DEFAULT_PALETTE: &str = "classic";

/// Immutable palette lookup table, constructed once at process start and
/// passed explicitly into the resolver. Unknown names fall back to
/// [`DEFAULT_PALETTE`] rather than erroring.
pub struct PaletteRegistry {
    palettes: BTreeMap<&'static str, Palette>,
}

impl PaletteRegistry {
    pub fn builtin() -> Self {
        let mut palettes = BTreeMap::new();
        for p in [
            Palette {
                name: "classic",
                primary: Rgba8::opaque(0x1f, 0x29, 0x37),
                accent: Rgba8::opaque(0xb4, 0x53, 0x09),
                paper: Rgba8::opaque(0xff, 0xff, 0xff),
                ink: Rgba8::opaque(0x11, 0x18, 0x27),
                muted: Rgba8::opaque(0x9c, 0xa3, 0xaf),
            },
            Palette {
                name: "pastel",
                primary: Rgba8::opaque(0x7c, 0x9e, 0xb2),
                accent: Rgba8::opaque(0xe8, 0xa0, 0x9a),
                paper: Rgba8::opaque(0xfd, 0xfb, 0xf5),
                ink: Rgba8::opaque(0x52, 0x52, 0x5b),
                muted: Rgba8::opaque(0xc9, 0xc9, 0xd4),
            },
            Palette {
                name: "noir",
                primary: Rgba8::opaque(0x26, 0x26, 0x26),
                accent: Rgba8::opaque(0x8f, 0x8f, 0x8f),
                paper: Rgba8::opaque(0xf4, 0xf4, 0xf4),
                ink: Rgba8::opaque(0x0a, 0x0a, 0x0a),
                muted: Rgba8::opaque(0xb0, 0xb0, 0xb0),
            },
        ] {
            palettes.insert(p.name, p);
        }
        Self { palettes }
    }

    /// Look up a palette by name; `None` or an unknown name yields the
    /// default palette.
    pub fn get(&self, name: Option<&str>) -> &Palette {
        name.and_then(|n| self.palettes.get(n))
            .unwrap_or_else(|| &self.palettes[DEFAULT_PALETTE])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.palettes.keys().copied()
    }
}
