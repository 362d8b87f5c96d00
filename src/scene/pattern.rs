use crate::foundation::core::Rgba8;
use crate::model::book::PatternKind;
use crate::scene::graph::ImagePaint;
use crate::theme::resolver::ResolvedPattern;
use std::sync::Arc;

/// Base tile edge in pixels at scale 1.
pub const TILE_BASE_PX: u32 = 24;

/// Realize a pattern tile from its declarative parameters.
///
/// This is the only way tiles come into existence: snapshots and the
/// headless renderer call it again instead of reusing a cloned handle.
/// Purely arithmetic, so a given spec always yields identical bytes.
pub fn render_tile(spec: &ResolvedPattern) -> ImagePaint {
    let size = ((TILE_BASE_PX as f64) * spec.scale).round().clamp(4.0, 256.0) as u32;
    let mut bytes = vec![0u8; (size as usize) * (size as usize) * 4];
    let color = premul(spec.color);
    let sw = spec.stroke_width.max(0.5);

    let mut set = |x: u32, y: u32| {
        let idx = ((y as usize) * (size as usize) + (x as usize)) * 4;
        bytes[idx..idx + 4].copy_from_slice(&color);
    };

    match spec.kind {
        PatternKind::Dots => {
            let c = (size as f64 - 1.0) / 2.0;
            let r = (sw * 1.5).min(size as f64 / 3.0);
            for y in 0..size {
                for x in 0..size {
                    let dx = x as f64 - c;
                    let dy = y as f64 - c;
                    if (dx * dx + dy * dy).sqrt() <= r {
                        set(x, y);
                    }
                }
            }
        }
        PatternKind::Grid => {
            let w = sw.round().max(1.0) as u32;
            for y in 0..size {
                for x in 0..size {
                    if x < w || y < w {
                        set(x, y);
                    }
                }
            }
        }
        PatternKind::Stripes => {
            let band = (sw * 2.0).round().max(1.0) as u32;
            for y in 0..size {
                for x in 0..size {
                    if (x + y) % size < band {
                        set(x, y);
                    }
                }
            }
        }
        PatternKind::Crosshatch => {
            let band = sw.round().max(1.0) as u32;
            for y in 0..size {
                for x in 0..size {
                    let diag_a = (x + y) % size < band;
                    let diag_b = (x + size - y % size - 1) % size < band;
                    if diag_a || diag_b {
                        set(x, y);
                    }
                }
            }
        }
        PatternKind::Checker => {
            let half = size / 2;
            for y in 0..size {
                for x in 0..size {
                    let in_first = x < half && y < half;
                    let in_second = x >= half && y >= half;
                    if in_first || in_second {
                        set(x, y);
                    }
                }
            }
        }
    }

    ImagePaint {
        width: size,
        height: size,
        rgba8_premul: Arc::new(bytes),
    }
}

fn premul(c: Rgba8) -> [u8; 4] {
    let a = u16::from(c.a);
    let p = |v: u8| -> u8 { ((u16::from(v) * a + 127) / 255) as u8 };
    [p(c.r), p(c.g), p(c.b), c.a]
}
