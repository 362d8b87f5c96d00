use crate::foundation::core::{Affine, Vec2};
use crate::scene::graph::{NodeTag, Paint, Primitive, SceneGraph, SceneNode};
use crate::scene::pattern::render_tile;
use std::sync::Arc;

/// Extra multiplier on the downscale ratio for ordinary shape strokes.
///
/// Calibration constant measured against this engine's rasterizer and
/// Lanczos3 resampler; re-measure if either changes. Not inherited from any
/// other rendering stack.
pub const SHAPE_STROKE_CALIBRATION: f64 = 1.15;

#[derive(Clone, Copy, Debug)]
pub struct SnapshotParams {
    /// Where the page's top-left content boundary sits in the live scene's
    /// coordinate space (viewport inset + pan).
    pub page_origin: Vec2,
    /// Pixel width of the raster the scene will be drawn into.
    pub source_px: f64,
    /// Pixel width the raster will be resampled to downstream.
    pub target_px: f64,
}

/// Stroke-width compensation for raster downscaling. Thin strokes lose
/// visual weight proportionally to the scale-down; upscaling preserves
/// them, so the factor never drops below 1.
pub fn compensation_factor(source_px: f64, target_px: f64) -> f64 {
    if !(source_px > 0.0) || !(target_px > 0.0) {
        return 1.0;
    }
    let ratio = source_px / target_px;
    if ratio <= 1.0 {
        1.0
    } else {
        ratio * SHAPE_STROKE_CALIBRATION
    }
}

/// Turn a live interactive scene into an export-ready scene.
///
/// Applied once per page per export. Each step corrects a specific
/// structural mismatch between the interactive and export contexts; none is
/// optional.
pub fn snapshot(live: &SceneGraph, params: &SnapshotParams) -> SceneGraph {
    // The structural clone is what crosses the boundary: realized pattern
    // tiles (native bitmap handles) are already gone after this.
    let mut scene = live.structural_clone();
    strip_editing_nodes(&mut scene);
    re_anchor(&mut scene, params.page_origin);
    regenerate_pattern_tiles(&mut scene);
    reorder_background_first(&mut scene);
    compensate_stroke_widths(
        &mut scene,
        compensation_factor(params.source_px, params.target_px),
    );
    scene
}

/// Remove selection chrome, drag previews and placeholder affordances.
/// They are identified by tag, never by appearance.
pub fn strip_editing_nodes(scene: &mut SceneGraph) {
    fn keep(node: &SceneNode) -> bool {
        !matches!(node.tag, NodeTag::EditOverlay | NodeTag::Placeholder)
    }
    fn walk(nodes: &mut Vec<SceneNode>) {
        nodes.retain(keep);
        for n in nodes {
            walk(&mut n.children);
        }
    }
    walk(&mut scene.nodes);
}

/// Translate all content so the page's top-left content boundary maps to
/// (0,0) in export pixel space, undoing the viewport inset/pan.
pub fn re_anchor(scene: &mut SceneGraph, page_origin: Vec2) {
    if page_origin == Vec2::ZERO {
        return;
    }
    let shift = Affine::translate(-page_origin);
    for node in &mut scene.nodes {
        node.transform = shift * node.transform;
    }
}

/// Rebuild every pattern tile from its declarative parameters. The cloned
/// handle is gone; reusing it is not an option, and falling back to a blank
/// fill would silently lose the background.
pub fn regenerate_pattern_tiles(scene: &mut SceneGraph) {
    fn walk(node: &mut SceneNode) {
        for prim in &mut node.prims {
            if let Primitive::Fill {
                paint: Paint::Pattern(p),
                ..
            } = prim
                && p.tile.is_none()
            {
                p.tile = Some(Arc::new(render_tile(&p.spec)));
            }
        }
        for child in &mut node.children {
            walk(child);
        }
    }
    for node in &mut scene.nodes {
        walk(node);
    }
}

/// Restore the background-before-content invariant. A structural clone does
/// not guarantee it across all paths, so it is re-established here (stable:
/// content order is otherwise untouched).
pub fn reorder_background_first(scene: &mut SceneGraph) {
    let mut background = Vec::new();
    let mut content = Vec::new();
    for node in scene.nodes.drain(..) {
        if node.tag == NodeTag::Background {
            background.push(node);
        } else {
            content.push(node);
        }
    }
    background.extend(content);
    scene.nodes = background;
}

/// Multiply every stroke width by `factor`, exempting decoration strokes
/// (ruled lines, underlines, qna borders). Decorations already scale with
/// the view and must stay visually thin; they are identified structurally
/// by their tag, not by any width threshold.
pub fn compensate_stroke_widths(scene: &mut SceneGraph, factor: f64) {
    if (factor - 1.0).abs() < f64::EPSILON {
        return;
    }
    fn walk(node: &mut SceneNode, factor: f64) {
        if node.tag != NodeTag::Decoration {
            for prim in &mut node.prims {
                if let Primitive::Stroke { width, .. } = prim {
                    *width *= factor;
                }
            }
        }
        for child in &mut node.children {
            walk(child, factor);
        }
    }
    for node in &mut scene.nodes {
        walk(node, factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{BezPath, Point, Rgba8};
    use crate::model::book::PatternKind;
    use crate::scene::graph::PatternPaint;
    use crate::theme::resolver::ResolvedPattern;
    use kurbo::Shape;

    fn stroke_node(tag: NodeTag, width: f64) -> SceneNode {
        let mut node = SceneNode::new(tag);
        node.prims.push(Primitive::Stroke {
            path: kurbo::Rect::new(0.0, 0.0, 10.0, 10.0).to_path(0.1),
            color: Rgba8::BLACK,
            width,
        });
        node
    }

    fn scene(nodes: Vec<SceneNode>) -> SceneGraph {
        SceneGraph {
            width: 100.0,
            height: 100.0,
            nodes,
        }
    }

    #[test]
    fn editing_nodes_never_survive() {
        let mut element = stroke_node(NodeTag::Element, 2.0);
        element.children.push(SceneNode::new(NodeTag::Placeholder));
        let s = scene(vec![
            SceneNode::new(NodeTag::Background),
            element,
            SceneNode::new(NodeTag::EditOverlay),
        ]);
        let out = snapshot(
            &s,
            &SnapshotParams {
                page_origin: Vec2::ZERO,
                source_px: 100.0,
                target_px: 100.0,
            },
        );
        assert_eq!(out.nodes.len(), 2);
        assert!(out.nodes.iter().all(|n| n.tag != NodeTag::EditOverlay));
        assert!(out.nodes[1].children.is_empty());
    }

    #[test]
    fn re_anchor_shifts_roots_by_page_origin() {
        let mut node = stroke_node(NodeTag::Element, 2.0);
        node.transform = Affine::translate((60.0, 70.0));
        let mut s = scene(vec![node]);
        re_anchor(&mut s, Vec2::new(48.0, 48.0));
        let p = s.nodes[0].transform * Point::ZERO;
        assert!((p.x - 12.0).abs() < 1e-9);
        assert!((p.y - 22.0).abs() < 1e-9);
    }

    #[test]
    fn background_moves_before_content() {
        let s = scene(vec![
            stroke_node(NodeTag::Element, 2.0),
            SceneNode::new(NodeTag::Background),
            stroke_node(NodeTag::Element, 3.0),
        ]);
        let out = snapshot(
            &s,
            &SnapshotParams {
                page_origin: Vec2::ZERO,
                source_px: 100.0,
                target_px: 100.0,
            },
        );
        assert_eq!(out.nodes[0].tag, NodeTag::Background);
        // Stable for the rest.
        let widths: Vec<f64> = out.nodes[1..]
            .iter()
            .map(|n| match n.prims[0] {
                Primitive::Stroke { width, .. } => width,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(widths, vec![2.0, 3.0]);
    }

    #[test]
    fn pattern_tiles_are_regenerated_not_reused() {
        let mut bg = SceneNode::new(NodeTag::Background);
        bg.prims.push(Primitive::Fill {
            path: kurbo::Rect::new(0.0, 0.0, 100.0, 100.0).to_path(0.1),
            paint: Paint::Pattern(PatternPaint {
                spec: ResolvedPattern {
                    kind: PatternKind::Grid,
                    color: Rgba8::opaque(10, 10, 10),
                    scale: 1.0,
                    stroke_width: 1.0,
                },
                tile: Some(Arc::new(render_tile(&ResolvedPattern {
                    kind: PatternKind::Grid,
                    color: Rgba8::opaque(10, 10, 10),
                    scale: 1.0,
                    stroke_width: 1.0,
                }))),
            }),
        });
        let s = scene(vec![bg]);
        let out = snapshot(
            &s,
            &SnapshotParams {
                page_origin: Vec2::ZERO,
                source_px: 100.0,
                target_px: 100.0,
            },
        );
        let Primitive::Fill {
            paint: Paint::Pattern(p),
            ..
        } = &out.nodes[0].prims[0]
        else {
            panic!("expected pattern fill");
        };
        let tile = p.tile.as_ref().expect("tile must be rebuilt");
        assert!(tile.rgba8_premul.iter().any(|&b| b != 0));
    }

    #[test]
    fn downscale_compensates_strokes_but_not_decorations() {
        let mut element = stroke_node(NodeTag::Element, 2.0);
        element.children.push(stroke_node(NodeTag::Decoration, 1.0));
        let s = scene(vec![element]);
        let out = snapshot(
            &s,
            &SnapshotParams {
                page_origin: Vec2::ZERO,
                source_px: 794.0,
                target_px: 595.0,
            },
        );
        let factor = compensation_factor(794.0, 595.0);
        assert!(factor > 1.0);
        match out.nodes[0].prims[0] {
            Primitive::Stroke { width, .. } => {
                assert!((width - 2.0 * factor).abs() < 1e-9);
            }
            _ => unreachable!(),
        }
        match out.nodes[0].children[0].prims[0] {
            Primitive::Stroke { width, .. } => assert_eq!(width, 1.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn upscale_never_thickens() {
        assert_eq!(compensation_factor(794.0, 2480.0), 1.0);
        assert_eq!(compensation_factor(0.0, 100.0), 1.0);
    }

    #[test]
    fn freehand_stroke_path_is_untouched_by_clone() {
        let mut node = SceneNode::new(NodeTag::Element);
        let mut path = BezPath::new();
        path.move_to(Point::ZERO);
        path.quad_to(Point::new(5.0, 9.0), Point::new(10.0, 0.0));
        node.prims.push(Primitive::Stroke {
            path: path.clone(),
            color: Rgba8::BLACK,
            width: 2.0,
        });
        let s = scene(vec![node]);
        let out = snapshot(
            &s,
            &SnapshotParams {
                page_origin: Vec2::ZERO,
                source_px: 1.0,
                target_px: 1.0,
            },
        );
        match &out.nodes[0].prims[0] {
            Primitive::Stroke { path: p, .. } => assert_eq!(p.elements(), path.elements()),
            _ => unreachable!(),
        }
    }
}
