use crate::foundation::core::{Affine, BezPath, Point, Rgba8, canvas_pixels};
use crate::foundation::error::FolioResult;
use crate::layout::text::{TEXT_PADDING_PX, TextLayoutEngine, ruled_line_offsets};
use crate::model::book::{BackgroundFillDef, BookDef, PageDef};
use crate::model::element::{ElementDef, ElementKindDef};
use crate::scene::graph::{NodeTag, Paint, PatternPaint, Primitive, SceneGraph, SceneNode};
use crate::scene::pattern::render_tile;
use crate::scene::sketch::sketch_stroke;
use crate::theme::palette::PaletteRegistry;
use crate::theme::resolver::{ResolvedStyle, ThemeRegistry, resolve, resolve_pattern};
use kurbo::Shape;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved raster images keyed by their source reference. Both producers
/// fill one of these before building: the editor from its upload cache, the
/// headless renderer by fetching and inlining.
pub type ImageBank = HashMap<String, crate::scene::graph::ImagePaint>;

/// Builds the shared scene graph both renderers consume. The live editor
/// scene and the headless export scene are both produced here; the live
/// scene is never the export source of truth.
pub struct SceneBuilder<'a> {
    pub themes: &'a ThemeRegistry,
    pub palettes: &'a PaletteRegistry,
    pub text: &'a mut TextLayoutEngine,
    pub images: &'a ImageBank,
}

impl SceneBuilder<'_> {
    /// Build the ordered scene for one page: background first, then one
    /// composite per element in z-order, decorations attached under their
    /// owning composite.
    pub fn build_page(&mut self, page: &PageDef, book: &BookDef) -> FolioResult<SceneGraph> {
        let (w, h) = canvas_pixels(book.page_format, book.orientation);
        let (w, h) = (f64::from(w), f64::from(h));

        let mut nodes = Vec::with_capacity(page.elements.len() + 1);
        nodes.push(self.background_node(page, book, w, h));

        let mut order: Vec<usize> = (0..page.elements.len()).collect();
        order.sort_by_key(|&i| page.elements[i].z.unwrap_or(0));
        for i in order {
            let element = &page.elements[i];
            let style = resolve(element, page, book, self.themes, self.palettes);
            match self.element_node(element, &style) {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    // Per-element failures degrade to an empty composite so
                    // the page still renders.
                    tracing::warn!(element = %element.id, error = %e, "element degraded to empty");
                    nodes.push(SceneNode::with_id(NodeTag::Element, element.id.clone()));
                }
            }
        }

        Ok(SceneGraph {
            width: w,
            height: h,
            nodes,
        })
    }

    fn background_node(&self, page: &PageDef, book: &BookDef, w: f64, h: f64) -> SceneNode {
        let palette = self
            .palettes
            .get(page.palette.as_deref().or(book.palette.as_deref()));
        let path = kurbo::Rect::new(0.0, 0.0, w, h).to_path(0.1);
        let paint = match &page.background.fill {
            BackgroundFillDef::Color { color } => {
                Paint::Solid(crate::theme::resolver::resolve_color(*color, palette))
            }
            BackgroundFillDef::Image { source } => match self.images.get(source) {
                Some(img) => Paint::Image(img.clone()),
                None => {
                    tracing::warn!(source = %source, "background image unavailable, using paper color");
                    Paint::Solid(palette.color(crate::theme::palette::ColorRole::Paper))
                }
            },
            BackgroundFillDef::Pattern { pattern } => {
                let spec = resolve_pattern(pattern, palette);
                Paint::Pattern(PatternPaint {
                    tile: Some(Arc::new(render_tile(&spec))),
                    spec,
                })
            }
        };

        let mut node = SceneNode::new(NodeTag::Background);
        node.opacity = page.background.opacity.clamp(0.0, 1.0);
        node.prims.push(Primitive::Fill { path, paint });
        node
    }

    fn element_node(&mut self, el: &ElementDef, style: &ResolvedStyle) -> FolioResult<SceneNode> {
        let mut node = SceneNode::with_id(NodeTag::Element, el.id.clone());
        node.opacity = style.opacity;
        node.transform = Affine::translate((el.x, el.y))
            * Affine::rotate_about(
                el.rotation_deg.to_radians(),
                Point::new(el.w / 2.0, el.h / 2.0),
            );

        match &el.kind {
            ElementKindDef::Rect => {
                let path = kurbo::Rect::new(0.0, 0.0, el.w, el.h).to_path(0.1);
                self.fill_then_stroke(&mut node, path, style);
            }
            ElementKindDef::Ellipse => {
                let path = kurbo::Ellipse::new(
                    Point::new(el.w / 2.0, el.h / 2.0),
                    (el.w / 2.0, el.h / 2.0),
                    0.0,
                )
                .to_path(0.1);
                self.fill_then_stroke(&mut node, path, style);
            }
            ElementKindDef::Line { x2, y2 } => {
                let mut path = BezPath::new();
                path.move_to(Point::ZERO);
                path.line_to(Point::new(x2 - el.x, y2 - el.y));
                push_stroke(&mut node, path, style);
            }
            ElementKindDef::Freehand { points } => {
                if let Some(path) = freehand_path(points, el.x, el.y) {
                    // Freehand ink is already hand-drawn; sketch jitter
                    // applies to geometric shapes only.
                    node.prims.push(Primitive::Stroke {
                        path,
                        color: style.stroke.unwrap_or(Rgba8::BLACK),
                        width: style.stroke_width,
                    });
                }
            }
            ElementKindDef::Image { source } => {
                self.image_prims(&mut node, el, source.as_deref(), style);
            }
            ElementKindDef::Text { text } => {
                self.text_prims(&mut node, el, text, style, false)?;
            }
            ElementKindDef::Question { text } => {
                self.text_prims(&mut node, el, text, style, true)?;
            }
            ElementKindDef::Answer { text, ruled } => {
                if *ruled {
                    node.children.push(ruled_lines_node(el.w, el.h, style));
                }
                self.text_prims(&mut node, el, text, style, false)?;
            }
            ElementKindDef::Qna { question, answer } => {
                self.qna_prims(&mut node, el, question, answer, style)?;
            }
        }
        Ok(node)
    }

    /// Fill (solid or pattern) first, border stroke second; sketchy themes
    /// jitter the stroke outline with the element's seed.
    fn fill_then_stroke(&self, node: &mut SceneNode, path: BezPath, style: &ResolvedStyle) {
        if let Some(pattern) = style.pattern {
            node.prims.push(Primitive::Fill {
                path: path.clone(),
                paint: Paint::Pattern(PatternPaint {
                    tile: Some(Arc::new(render_tile(&pattern))),
                    spec: pattern,
                }),
            });
        } else if let Some(fill) = style.fill {
            node.prims.push(Primitive::Fill {
                path: path.clone(),
                paint: Paint::Solid(fill),
            });
        }
        push_stroke(node, path, style);
    }

    fn image_prims(
        &self,
        node: &mut SceneNode,
        el: &ElementDef,
        source: Option<&str>,
        style: &ResolvedStyle,
    ) {
        let rect = kurbo::Rect::new(0.0, 0.0, el.w, el.h);
        match source.and_then(|s| self.images.get(s)) {
            Some(img) => {
                node.prims.push(Primitive::Fill {
                    path: rect.to_path(0.1),
                    paint: Paint::Image(img.clone()),
                });
            }
            None => {
                if let Some(s) = source {
                    tracing::warn!(element = %el.id, source = %s, "image unavailable, leaving slot empty");
                }
                // Empty slot affordance; stripped before export.
                let mut ph = SceneNode::new(NodeTag::Placeholder);
                ph.prims.push(Primitive::Stroke {
                    path: rect.to_path(0.1),
                    color: style.ruled_line_color,
                    width: 1.0,
                });
                let mut cross = BezPath::new();
                cross.move_to(Point::ZERO);
                cross.line_to(Point::new(el.w, el.h));
                cross.move_to(Point::new(el.w, 0.0));
                cross.line_to(Point::new(0.0, el.h));
                ph.prims.push(Primitive::Stroke {
                    path: cross,
                    color: style.ruled_line_color,
                    width: 1.0,
                });
                node.children.push(ph);
            }
        }
    }

    fn text_prims(
        &mut self,
        node: &mut SceneNode,
        el: &ElementDef,
        text: &str,
        style: &ResolvedStyle,
        underline: bool,
    ) -> FolioResult<()> {
        let content_w = (el.w - 2.0 * TEXT_PADDING_PX).max(1.0);
        let content_h = (el.h - 2.0 * TEXT_PADDING_PX).max(1.0);
        let layout = self.text.layout_text(text, style, content_w, Some(content_h))?;

        if layout.empty {
            // Placeholder glyph marker, interactive only.
            let mut ph = SceneNode::new(NodeTag::Placeholder);
            let size = style.font_size_px;
            ph.prims.push(Primitive::Stroke {
                path: kurbo::Rect::new(
                    TEXT_PADDING_PX,
                    TEXT_PADDING_PX,
                    TEXT_PADDING_PX + size * 0.6,
                    TEXT_PADDING_PX + size,
                )
                .to_path(0.1),
                color: style.ruled_line_color,
                width: 1.0,
            });
            node.children.push(ph);
            return Ok(());
        }

        if underline
            && let Some(last) = layout.line_baselines.last()
        {
            let y = TEXT_PADDING_PX + last + 3.0;
            let mut rule = BezPath::new();
            rule.move_to(Point::new(TEXT_PADDING_PX, y));
            rule.line_to(Point::new(el.w - TEXT_PADDING_PX, y));
            let mut deco = SceneNode::new(NodeTag::Decoration);
            deco.prims.push(Primitive::Stroke {
                path: rule,
                color: style.ruled_line_color,
                width: 1.0,
            });
            node.children.push(deco);
        }

        node.prims.push(Primitive::Text {
            runs: layout.runs,
            origin: Point::new(TEXT_PADDING_PX, TEXT_PADDING_PX),
        });
        Ok(())
    }

    fn qna_prims(
        &mut self,
        node: &mut SceneNode,
        el: &ElementDef,
        question: &str,
        answer: &str,
        style: &ResolvedStyle,
    ) -> FolioResult<()> {
        let content_w = (el.w - 2.0 * TEXT_PADDING_PX).max(1.0);
        let content_h = (el.h - 2.0 * TEXT_PADDING_PX).max(1.0);

        let q_layout = self
            .text
            .layout_text(question, style, content_w, Some(content_h))?;
        let q_height = if q_layout.empty { 0.0 } else { q_layout.height };
        if !q_layout.empty {
            node.prims.push(Primitive::Text {
                runs: q_layout.runs,
                origin: Point::new(TEXT_PADDING_PX, TEXT_PADDING_PX),
            });
        }

        // Answer area below the question, ruled; written answer text lays
        // out on top of the rules.
        let answer_top = TEXT_PADDING_PX + q_height + TEXT_PADDING_PX;
        let answer_h = el.h - answer_top - TEXT_PADDING_PX;
        if answer_h > 0.0 {
            let mut rules = ruled_lines_node(el.w, answer_h, style);
            rules.transform = Affine::translate((0.0, answer_top));
            node.children.push(rules);

            if !answer.is_empty() {
                let a_layout = self
                    .text
                    .layout_text(answer, style, content_w, Some(answer_h))?;
                node.prims.push(Primitive::Text {
                    runs: a_layout.runs,
                    origin: Point::new(TEXT_PADDING_PX, answer_top),
                });
            }
        }

        // The qna border is a decoration child: it z-orders with its owner.
        let mut border = SceneNode::new(NodeTag::Decoration);
        border.prims.push(Primitive::Stroke {
            path: kurbo::Rect::new(0.0, 0.0, el.w, el.h).to_path(0.1),
            color: style.stroke.unwrap_or(style.ruled_line_color),
            width: 1.0,
        });
        node.children.push(border);
        Ok(())
    }
}

fn push_stroke(node: &mut SceneNode, path: BezPath, style: &ResolvedStyle) {
    let Some(color) = style.stroke else { return };
    let path = if style.roughness > 0.0 {
        sketch_stroke(&path, style.roughness, style.sketch_seed)
    } else {
        path
    };
    node.prims.push(Primitive::Stroke {
        path,
        color,
        width: style.stroke_width,
    });
}

fn freehand_path(points: &[[f64; 2]], ox: f64, oy: f64) -> Option<BezPath> {
    let (first, rest) = points.split_first()?;
    let mut path = BezPath::new();
    path.move_to(Point::new(first[0] - ox, first[1] - oy));
    if rest.is_empty() {
        // Single-point tap: draw a dot-length segment.
        path.line_to(Point::new(first[0] - ox + 0.1, first[1] - oy));
        return Some(path);
    }
    // Midpoint smoothing: quads through consecutive midpoints keep the ink
    // identical across renderers without any fitting heuristics.
    let mut prev = Point::new(first[0] - ox, first[1] - oy);
    for (i, p) in rest.iter().enumerate() {
        let cur = Point::new(p[0] - ox, p[1] - oy);
        if i == rest.len() - 1 {
            path.line_to(cur);
        } else {
            let mid = Point::new((prev.x + cur.x) / 2.0, (prev.y + cur.y) / 2.0);
            path.quad_to(prev, mid);
        }
        prev = cur;
    }
    Some(path)
}

/// Evenly spaced ruled lines across a `w`×`h` area, as a decoration node.
fn ruled_lines_node(w: f64, h: f64, style: &ResolvedStyle) -> SceneNode {
    let mut deco = SceneNode::new(NodeTag::Decoration);
    for y in ruled_line_offsets(style, h) {
        let mut line = BezPath::new();
        line.move_to(Point::new(TEXT_PADDING_PX, y));
        line.line_to(Point::new(w - TEXT_PADDING_PX, y));
        deco.prims.push(Primitive::Stroke {
            path: line,
            color: style.ruled_line_color,
            width: 1.0,
        });
    }
    deco
}
