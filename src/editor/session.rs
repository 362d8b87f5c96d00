use crate::editor::hit_test::{elements_in_rect, top_hit, visual_bounds};
use crate::foundation::core::{Affine, BezPath, Point, Rect, Rgba8, Vec2};
use crate::foundation::error::FolioResult;
use crate::layout::text::TextLayoutEngine;
use crate::model::book::BookDef;
use crate::model::element::{ElementDef, ElementKindDef, StyleOverrideDef};
use crate::scene::builder::{ImageBank, SceneBuilder};
use crate::scene::graph::{NodeTag, Paint, Primitive, SceneGraph, SceneNode};
use crate::theme::palette::PaletteRegistry;
use crate::theme::resolver::ThemeRegistry;
use kurbo::Shape;
use std::collections::HashSet;

/// How the page sits inside the editing surface. The page is inset within a
/// padded, pannable, zoomable viewport; export later re-anchors content to
/// the page origin.
#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    pub pan: Vec2,
    pub zoom: f64,
    pub inset: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            inset: Vec2::new(48.0, 48.0),
        }
    }
}

impl Viewport {
    /// Where the page's top-left content boundary lands in view space.
    pub fn page_origin(&self) -> Vec2 {
        self.inset + self.pan
    }

    pub fn page_to_view(&self) -> Affine {
        Affine::translate(self.page_origin()) * Affine::scale(self.zoom)
    }

    pub fn view_to_page(&self, p: Point) -> Point {
        self.page_to_view().inverse() * p
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Select,
    Pan,
    Rect,
    Ellipse,
    Line,
    Freehand,
    TextBox,
}

/// Per-tool interaction state. Anything in-progress is discarded by a tool
/// switch or an explicit cancel.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ToolState {
    #[default]
    Idle,
    Drawing {
        start: Point,
        current: Point,
        points: Vec<Point>,
    },
    Selecting {
        start: Point,
        current: Point,
    },
    Panning {
        last: Point,
    },
    MovingGroup {
        last: Point,
    },
}

/// Upload state of a photo slot created by fire-and-forget placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageLoadState {
    Loading,
    Ready,
}

/// The live editing session for one page: current tool, in-progress
/// gesture, selection, and the scene the UI surface draws each frame.
///
/// This owns every editing affordance. Affordance nodes are tagged
/// [`NodeTag::EditOverlay`] so the export snapshot can strip them
/// unambiguously; they never reach an export any other way.
pub struct EditorSession {
    pub book: BookDef,
    pub page_index: usize,
    pub viewport: Viewport,
    tool: Tool,
    state: ToolState,
    pub selection: Vec<String>,
    pending_images: HashSet<String>,
    next_id: u64,
}

impl EditorSession {
    pub fn new(book: BookDef, page_index: usize) -> Self {
        Self {
            book,
            page_index,
            viewport: Viewport::default(),
            tool: Tool::Select,
            state: ToolState::Idle,
            selection: Vec::new(),
            pending_images: HashSet::new(),
            next_id: 1,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }

    /// Switching tools resets to idle and discards in-progress geometry.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.state = ToolState::Idle;
    }

    /// Explicit cancel: back to idle, in-progress geometry discarded.
    pub fn cancel(&mut self) {
        self.state = ToolState::Idle;
    }

    fn fresh_id(&mut self) -> String {
        let id = format!("el-{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn pointer_down(&mut self, view_pt: Point) {
        if self.state != ToolState::Idle {
            return;
        }
        let page_pt = self.viewport.view_to_page(view_pt);
        match self.tool {
            Tool::Pan => self.state = ToolState::Panning { last: view_pt },
            Tool::Select => {
                let hit_id = top_hit(&self.book.pages[self.page_index], page_pt)
                    .map(|el| el.id.clone());
                match hit_id {
                    Some(id) => {
                        if !self.selection.contains(&id) {
                            self.selection = vec![id];
                        }
                        self.state = ToolState::MovingGroup { last: page_pt };
                    }
                    None => {
                        self.selection.clear();
                        self.state = ToolState::Selecting {
                            start: page_pt,
                            current: page_pt,
                        };
                    }
                }
            }
            Tool::Rect | Tool::Ellipse | Tool::Line | Tool::TextBox | Tool::Freehand => {
                self.state = ToolState::Drawing {
                    start: page_pt,
                    current: page_pt,
                    points: vec![page_pt],
                };
            }
        }
    }

    pub fn pointer_move(&mut self, view_pt: Point) {
        let page_pt = self.viewport.view_to_page(view_pt);
        match &mut self.state {
            ToolState::Idle => {}
            ToolState::Drawing {
                current, points, ..
            } => {
                *current = page_pt;
                if self.tool == Tool::Freehand {
                    points.push(page_pt);
                }
            }
            ToolState::Selecting { current, .. } => *current = page_pt,
            ToolState::Panning { last } => {
                self.viewport.pan += view_pt - *last;
                *last = view_pt;
            }
            ToolState::MovingGroup { last } => {
                let delta = page_pt - *last;
                *last = page_pt;
                let page = &mut self.book.pages[self.page_index];
                for el in &mut page.elements {
                    if self.selection.contains(&el.id) {
                        el.x += delta.x;
                        el.y += delta.y;
                        if let ElementKindDef::Line { x2, y2 } = &mut el.kind {
                            *x2 += delta.x;
                            *y2 += delta.y;
                        }
                        if let ElementKindDef::Freehand { points } = &mut el.kind {
                            for p in points {
                                p[0] += delta.x;
                                p[1] += delta.y;
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn pointer_up(&mut self, view_pt: Point) {
        let page_pt = self.viewport.view_to_page(view_pt);
        let state = std::mem::take(&mut self.state);
        match state {
            ToolState::Drawing { start, points, .. } => {
                self.commit_drawing(start, page_pt, points);
            }
            ToolState::Selecting { start, current: _ } => {
                let marquee = Rect::from_points(start, page_pt);
                self.selection = elements_in_rect(&self.book.pages[self.page_index], marquee)
                    .into_iter()
                    .map(str::to_owned)
                    .collect();
            }
            ToolState::Idle | ToolState::Panning { .. } | ToolState::MovingGroup { .. } => {}
        }
    }

    fn commit_drawing(&mut self, start: Point, end: Point, points: Vec<Point>) {
        let rect = Rect::from_points(start, end);
        // Degenerate taps produce nothing (except freehand dots).
        if self.tool != Tool::Freehand && rect.width() < 2.0 && rect.height() < 2.0 {
            return;
        }
        let id = self.fresh_id();
        let kind = match self.tool {
            Tool::Rect => ElementKindDef::Rect,
            Tool::Ellipse => ElementKindDef::Ellipse,
            Tool::Line => ElementKindDef::Line { x2: end.x, y2: end.y },
            Tool::TextBox => ElementKindDef::Text {
                text: String::new(),
            },
            Tool::Freehand => ElementKindDef::Freehand {
                points: points.iter().map(|p| [p.x, p.y]).collect(),
            },
            Tool::Select | Tool::Pan => return,
        };
        let (x, y, w, h) = match kind {
            ElementKindDef::Line { .. } => (start.x, start.y, 0.0, 0.0),
            ElementKindDef::Freehand { .. } => {
                (rect.x0, rect.y0, rect.width(), rect.height())
            }
            _ => (rect.x0, rect.y0, rect.width(), rect.height()),
        };
        self.book.pages[self.page_index].elements.push(ElementDef {
            id: id.clone(),
            kind,
            x,
            y,
            w,
            h,
            rotation_deg: 0.0,
            opacity: 1.0,
            z: None,
            style: StyleOverrideDef::default(),
        });
        self.selection = vec![id];
    }

    /// Create a photo slot whose upload is still in flight. The element
    /// shows a loading placeholder until resolved.
    pub fn begin_image_placement(&mut self, rect: Rect) -> String {
        let id = self.fresh_id();
        self.book.pages[self.page_index].elements.push(ElementDef {
            id: id.clone(),
            kind: ElementKindDef::Image { source: None },
            x: rect.x0,
            y: rect.y0,
            w: rect.width(),
            h: rect.height(),
            rotation_deg: 0.0,
            opacity: 1.0,
            z: None,
            style: StyleOverrideDef::default(),
        });
        self.pending_images.insert(id.clone());
        id
    }

    /// Resolve a fire-and-forget upload. Failure discards the element.
    pub fn finish_image_placement(&mut self, id: &str, source: Result<String, String>) {
        self.pending_images.remove(id);
        let page = &mut self.book.pages[self.page_index];
        match source {
            Ok(src) => {
                if let Some(el) = page.elements.iter_mut().find(|e| e.id == id)
                    && let ElementKindDef::Image { source } = &mut el.kind
                {
                    *source = Some(src);
                }
            }
            Err(reason) => {
                tracing::warn!(element = %id, %reason, "image upload failed, discarding element");
                page.elements.retain(|e| e.id != id);
                self.selection.retain(|s| s != id);
            }
        }
    }

    pub fn image_load_state(&self, id: &str) -> Option<ImageLoadState> {
        let el = self.book.pages[self.page_index].element(id)?;
        match &el.kind {
            ElementKindDef::Image { source: None } if self.pending_images.contains(id) => {
                Some(ImageLoadState::Loading)
            }
            ElementKindDef::Image { source: Some(_) } => Some(ImageLoadState::Ready),
            _ => None,
        }
    }

    /// The live scene the editing surface draws: the shared page scene
    /// placed through the viewport, plus overlay chrome.
    pub fn live_scene(
        &self,
        themes: &ThemeRegistry,
        palettes: &PaletteRegistry,
        text: &mut TextLayoutEngine,
        images: &ImageBank,
    ) -> FolioResult<SceneGraph> {
        let mut builder = SceneBuilder {
            themes,
            palettes,
            text,
            images,
        };
        let page = &self.book.pages[self.page_index];
        let mut scene = builder.build_page(page, &self.book)?;

        let view = self.viewport.page_to_view();
        for node in &mut scene.nodes {
            node.transform = view * node.transform;
        }

        self.push_selection_overlays(&mut scene, view);
        self.push_gesture_overlays(&mut scene, view);
        Ok(scene)
    }

    fn push_selection_overlays(&self, scene: &mut SceneGraph, view: Affine) {
        const HANDLE: f64 = 6.0;
        let accent = Rgba8::opaque(0x2b, 0x6c, 0xb0);
        let page = &self.book.pages[self.page_index];
        for id in &self.selection {
            let Some(el) = page.element(id) else { continue };
            let b = visual_bounds(el);
            let mut overlay = SceneNode::new(NodeTag::EditOverlay);
            overlay.transform = view;
            overlay.prims.push(Primitive::Stroke {
                path: b.to_path(0.1),
                color: accent,
                width: 1.0,
            });
            for (hx, hy) in [
                (b.x0, b.y0),
                ((b.x0 + b.x1) / 2.0, b.y0),
                (b.x1, b.y0),
                (b.x1, (b.y0 + b.y1) / 2.0),
                (b.x1, b.y1),
                ((b.x0 + b.x1) / 2.0, b.y1),
                (b.x0, b.y1),
                (b.x0, (b.y0 + b.y1) / 2.0),
            ] {
                let r = Rect::new(
                    hx - HANDLE / 2.0,
                    hy - HANDLE / 2.0,
                    hx + HANDLE / 2.0,
                    hy + HANDLE / 2.0,
                );
                overlay.prims.push(Primitive::Fill {
                    path: r.to_path(0.1),
                    paint: Paint::Solid(Rgba8::WHITE),
                });
                overlay.prims.push(Primitive::Stroke {
                    path: r.to_path(0.1),
                    color: accent,
                    width: 1.0,
                });
            }
            scene.nodes.push(overlay);
        }
    }

    fn push_gesture_overlays(&self, scene: &mut SceneGraph, view: Affine) {
        let accent = Rgba8::new(0x2b, 0x6c, 0xb0, 0xa0);
        match &self.state {
            ToolState::Selecting { start, current } => {
                let mut overlay = SceneNode::new(NodeTag::EditOverlay);
                overlay.transform = view;
                overlay.prims.push(Primitive::Stroke {
                    path: Rect::from_points(*start, *current).to_path(0.1),
                    color: accent,
                    width: 1.0,
                });
                scene.nodes.push(overlay);
            }
            ToolState::Drawing {
                start,
                current,
                points,
            } => {
                let mut overlay = SceneNode::new(NodeTag::EditOverlay);
                overlay.transform = view;
                let path = match self.tool {
                    Tool::Rect | Tool::TextBox => {
                        Rect::from_points(*start, *current).to_path(0.1)
                    }
                    Tool::Ellipse => {
                        let r = Rect::from_points(*start, *current);
                        kurbo::Ellipse::new(
                            r.center(),
                            (r.width() / 2.0, r.height() / 2.0),
                            0.0,
                        )
                        .to_path(0.1)
                    }
                    Tool::Line => {
                        let mut p = BezPath::new();
                        p.move_to(*start);
                        p.line_to(*current);
                        p
                    }
                    Tool::Freehand => {
                        let mut p = BezPath::new();
                        if let Some((first, rest)) = points.split_first() {
                            p.move_to(*first);
                            for pt in rest {
                                p.line_to(*pt);
                            }
                        }
                        p
                    }
                    Tool::Select | Tool::Pan => BezPath::new(),
                };
                overlay.prims.push(Primitive::Stroke {
                    path,
                    color: accent,
                    width: 1.0,
                });
                scene.nodes.push(overlay);
            }
            _ => {}
        }
    }
}
