use crate::foundation::core::{Affine, BezPath, PixelFrame, Rect, Rgba8};
use crate::foundation::error::{FolioError, FolioResult};
use crate::render::surface::{SurfacePool, SurfacePoolOpts};
use crate::scene::graph::{ImagePaint, Paint, Primitive, SceneGraph, SceneNode};
use kurbo::Shape;
use std::sync::Arc;

/// Scene graph → pixel buffer. Pure with respect to the scene: whatever the
/// snapshot or the headless builder put in the tree is what gets drawn; no
/// node is skipped or synthesized here.
pub struct Rasterizer {
    pool: SurfacePool,
    ctx: Option<vello_cpu::RenderContext>,
}

impl Rasterizer {
    pub fn new(opts: SurfacePoolOpts) -> Self {
        Self {
            pool: SurfacePool::new(opts),
            ctx: None,
        }
    }

    pub fn pool_stats(&self) -> crate::render::surface::SurfacePoolStats {
        self.pool.stats()
    }

    /// Render at `pixel_ratio` (1 = canvas pixels).
    pub fn rasterize(&mut self, scene: &SceneGraph, pixel_ratio: f64) -> FolioResult<PixelFrame> {
        if !(pixel_ratio.is_finite() && pixel_ratio > 0.0) {
            return Err(FolioError::render("pixel ratio must be finite and > 0"));
        }
        let w = (scene.width * pixel_ratio).round().max(1.0);
        let h = (scene.height * pixel_ratio).round().max(1.0);
        let w16: u16 = (w as u32)
            .try_into()
            .map_err(|_| FolioError::render(format!("raster width {w} exceeds u16")))?;
        let h16: u16 = (h as u32)
            .try_into()
            .map_err(|_| FolioError::render(format!("raster height {h} exceeds u16")))?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w16 && ctx.height() == h16 => ctx,
            _ => vello_cpu::RenderContext::new(w16, h16),
        };
        ctx.reset();

        let root = Affine::scale(pixel_ratio);
        for node in &scene.nodes {
            draw_node(&mut ctx, node, root);
        }
        ctx.flush();

        let mut pixmap = self.pool.borrow(w16, h16);
        pixmap.data_as_u8_slice_mut().fill(0);
        ctx.render_to_pixmap(&mut pixmap);
        let frame = PixelFrame::new(
            u32::from(w16),
            u32::from(h16),
            pixmap.data_as_u8_slice().to_vec(),
        )?;

        self.pool.release(pixmap);
        self.ctx = Some(ctx);
        Ok(frame)
    }
}

fn draw_node(ctx: &mut vello_cpu::RenderContext, node: &SceneNode, parent: Affine) {
    let tr = parent * node.transform;
    let layered = node.opacity < 1.0;
    if layered {
        ctx.push_opacity_layer(node.opacity as f32);
    }
    for prim in &node.prims {
        draw_prim(ctx, prim, tr);
    }
    for child in &node.children {
        draw_node(ctx, child, tr);
    }
    if layered {
        ctx.pop_layer();
    }
}

fn draw_prim(ctx: &mut vello_cpu::RenderContext, prim: &Primitive, tr: Affine) {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    match prim {
        Primitive::Fill { path, paint } => match paint {
            Paint::Solid(c) => {
                ctx.set_transform(affine_to_cpu(tr));
                ctx.set_paint(solid(*c));
                ctx.fill_path(&bezpath_to_cpu(path));
            }
            Paint::Image(img) => draw_image_fill(ctx, img, path, tr),
            Paint::Pattern(p) => match &p.tile {
                Some(tile) => draw_pattern_fill(ctx, tile, path, tr),
                None => {
                    // A tile handle lost to cloning and not regenerated;
                    // keep the area visibly filled rather than blank.
                    tracing::warn!("pattern fill rendered without a tile, using base color");
                    ctx.set_transform(affine_to_cpu(tr));
                    ctx.set_paint(solid(p.spec.color));
                    ctx.fill_path(&bezpath_to_cpu(path));
                }
            },
        },
        Primitive::Stroke { path, color, width } => {
            // Strokes are expanded to fill outlines so the geometry is
            // identical wherever this scene is drawn.
            let style = kurbo::Stroke::new(width.max(0.1));
            let outline = kurbo::stroke(
                path.elements().iter().copied(),
                &style,
                &kurbo::StrokeOpts::default(),
                0.25,
            );
            ctx.set_transform(affine_to_cpu(tr));
            ctx.set_paint(solid(*color));
            ctx.fill_path(&bezpath_to_cpu(&outline));
        }
        Primitive::Text { runs, origin } => {
            let text_tr = tr * Affine::translate((origin.x, origin.y));
            ctx.set_transform(affine_to_cpu(text_tr));
            for run in runs {
                ctx.set_paint(solid(run.color));
                let glyphs = run.glyphs.iter().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&run.font)
                    .font_size(run.font_size)
                    .fill_glyphs(glyphs);
            }
        }
    }
}

fn draw_image_fill(
    ctx: &mut vello_cpu::RenderContext,
    img: &ImagePaint,
    path: &BezPath,
    tr: Affine,
) {
    let Some(paint) = image_paint(img) else { return };
    let bbox = path.bounding_box();
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 || img.width == 0 || img.height == 0 {
        return;
    }
    // Scale the bitmap to cover the fill's box exactly.
    let scale = Affine::scale_non_uniform(
        bbox.width() / f64::from(img.width),
        bbox.height() / f64::from(img.height),
    );
    ctx.set_transform(affine_to_cpu(
        tr * Affine::translate((bbox.x0, bbox.y0)) * scale,
    ));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(img.width),
        f64::from(img.height),
    ));
}

fn draw_pattern_fill(
    ctx: &mut vello_cpu::RenderContext,
    tile: &ImagePaint,
    path: &BezPath,
    tr: Affine,
) {
    let Some(paint) = image_paint(tile) else { return };
    let bbox = path.bounding_box();
    let tile_w = f64::from(tile.width);
    let tile_h = f64::from(tile.height);
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 || tile_w <= 0.0 || tile_h <= 0.0 {
        return;
    }
    let cols = (bbox.width() / tile_w).ceil() as u32;
    let rows = (bbox.height() / tile_h).ceil() as u32;
    for iy in 0..rows {
        for ix in 0..cols {
            let cx = bbox.x0 + f64::from(ix) * tile_w;
            let cy = bbox.y0 + f64::from(iy) * tile_h;
            // Edge cells draw only the part inside the box.
            let cw = tile_w.min(bbox.x1 - cx);
            let ch = tile_h.min(bbox.y1 - cy);
            ctx.set_transform(affine_to_cpu(tr * Affine::translate((cx, cy))));
            ctx.set_paint(paint.clone());
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, cw, ch));
        }
    }
}

fn solid(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn image_paint(img: &ImagePaint) -> Option<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(&img.rgba8_premul, img.width, img.height)?;
    Some(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn pixmap_from_premul_bytes(bytes: &[u8], width: u32, height: u32) -> Option<vello_cpu::Pixmap> {
    let w: u16 = width.try_into().ok()?;
    let h: u16 = height.try_into().ok()?;
    if bytes.len() != (width as usize) * (height as usize) * 4 {
        return None;
    }
    let mut pixels =
        Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity((width * height) as usize);
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Some(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Helper for tests and diagnostics: fraction of pixels whose RGBA differs
/// between two equally sized frames.
pub fn frame_diff_percent(a: &PixelFrame, b: &PixelFrame) -> FolioResult<f64> {
    if a.width != b.width || a.height != b.height {
        return Err(FolioError::validation("frame dimensions differ"));
    }
    let total = (a.width as usize) * (a.height as usize);
    if total == 0 {
        return Ok(0.0);
    }
    let differing = a
        .data
        .chunks_exact(4)
        .zip(b.data.chunks_exact(4))
        .filter(|(pa, pb)| pa != pb)
        .count();
    Ok(differing as f64 * 100.0 / total as f64)
}

/// Count pixels inside `region` (in frame pixels) whose straight-alpha color
/// is within `tolerance` per channel of `color`, compositing over white the
/// way paper does.
pub fn count_pixels_near(frame: &PixelFrame, region: Rect, color: Rgba8, tolerance: u8) -> usize {
    let x0 = region.x0.max(0.0) as u32;
    let y0 = region.y0.max(0.0) as u32;
    let x1 = (region.x1 as u32).min(frame.width);
    let y1 = (region.y1 as u32).min(frame.height);
    let mut n = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            let i = ((y * frame.width + x) * 4) as usize;
            let [r, g, b, a] = [
                frame.data[i],
                frame.data[i + 1],
                frame.data[i + 2],
                frame.data[i + 3],
            ];
            // Premul over white.
            let inv = 255 - u16::from(a);
            let over = |c: u8| -> u8 { (u16::from(c) + inv).min(255) as u8 };
            let (r, g, b) = (over(r), over(g), over(b));
            if r.abs_diff(color.r) <= tolerance
                && g.abs_diff(color.g) <= tolerance
                && b.abs_diff(color.b) <= tolerance
            {
                n += 1;
            }
        }
    }
    n
}
