use crate::foundation::core::{Affine, BezPath, Point, Rgba8};
use crate::layout::text::TextRun;
use crate::theme::resolver::ResolvedPattern;
use std::sync::Arc;

/// Role of a node in the drawing order and in export correction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeTag {
    /// Page background; exactly one per page, always drawn first.
    Background,
    /// One composite per element, internally ordered fill → stroke → content.
    Element,
    /// Ruled lines, underlines, qna borders; always a child of the owning
    /// element composite so relative z-order is preserved automatically.
    Decoration,
    /// Selection chrome, marquee, drag previews. Must never survive into an
    /// export snapshot.
    EditOverlay,
    /// Placeholder affordances (empty text marker, empty image slot).
    /// Rendered interactively, stripped for export.
    Placeholder,
}

/// Decoded raster image in premultiplied RGBA8, ready for the painter.
#[derive(Clone, Debug)]
pub struct ImagePaint {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// A tiled pattern fill: the declarative spec plus an optional realized
/// tile. The tile is a native bitmap handle and intentionally does NOT
/// survive [`SceneGraph::structural_clone`]; the snapshot transformer
/// rebuilds it from `spec`.
#[derive(Clone, Debug)]
pub struct PatternPaint {
    pub spec: ResolvedPattern,
    pub tile: Option<Arc<ImagePaint>>,
}

#[derive(Clone, Debug)]
pub enum Paint {
    Solid(Rgba8),
    Image(ImagePaint),
    Pattern(PatternPaint),
}

#[derive(Clone, Debug)]
pub enum Primitive {
    Fill {
        path: BezPath,
        paint: Paint,
    },
    Stroke {
        path: BezPath,
        color: Rgba8,
        width: f64,
    },
    /// Pre-shaped glyph runs positioned relative to `origin`.
    Text {
        runs: Vec<TextRun>,
        origin: Point,
    },
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    /// Element id for element composites; `None` for backgrounds and
    /// overlay chrome.
    pub id: Option<String>,
    pub tag: NodeTag,
    pub transform: Affine,
    pub opacity: f64,
    pub prims: Vec<Primitive>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(tag: NodeTag) -> Self {
        Self {
            id: None,
            tag,
            transform: Affine::IDENTITY,
            opacity: 1.0,
            prims: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(tag: NodeTag, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(tag)
        }
    }

    /// Whether this composite carries shaped text anywhere in its subtree.
    pub fn contains_text(&self) -> bool {
        self.prims.iter().any(|p| matches!(p, Primitive::Text { .. }))
            || self.children.iter().any(SceneNode::contains_text)
    }
}

/// Ordered drawing tree for one page: background, element composites in
/// z-order, decorations attached under their owners.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    pub width: f64,
    pub height: f64,
    pub nodes: Vec<SceneNode>,
}

impl SceneGraph {
    /// Duplicate the tree the way a structural clone across a process
    /// boundary would: declarative data survives, realized pattern tiles
    /// (native bitmap handles) do not.
    pub fn structural_clone(&self) -> Self {
        let mut cloned = self.clone();
        for node in &mut cloned.nodes {
            drop_pattern_tiles(node);
        }
        cloned
    }
}

fn drop_pattern_tiles(node: &mut SceneNode) {
    for prim in &mut node.prims {
        if let Primitive::Fill {
            paint: Paint::Pattern(p),
            ..
        } = prim
        {
            p.tile = None;
        }
    }
    for child in &mut node.children {
        drop_pattern_tiles(child);
    }
}
