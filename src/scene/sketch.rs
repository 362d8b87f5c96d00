use crate::foundation::core::{BezPath, Point};
use kurbo::PathEl;

/// SplitMix64 stream used for sketch jitter. Seeded from stable element
/// identity only; never from time or render count, so re-renders of the
/// same element produce bit-identical stroke geometry.
#[derive(Clone, Copy, Debug)]
pub struct SketchRng {
    state: u64,
}

impl SketchRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [-amplitude, amplitude].
    pub fn jitter(&mut self, amplitude: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * amplitude
    }
}

/// Segment length (px) per jittered subdivision.
const SEGMENT_PX: f64 = 16.0;

/// Turn a clean outline into a hand-drawn looking stroke path: the outline
/// is flattened, chopped into short segments, and each joint displaced by a
/// seeded jitter. Two offset passes are overlaid, the classic double-stroke
/// sketch look.
pub fn sketch_stroke(path: &BezPath, roughness: f64, seed: u64) -> BezPath {
    if roughness <= 0.0 {
        return path.clone();
    }
    let amplitude = roughness * 1.5;
    let polylines = flatten_to_polylines(path);

    let mut out = BezPath::new();
    for pass in 0..2u64 {
        let mut rng = SketchRng::new(seed ^ (pass.wrapping_mul(0x517c_c1b7_2722_0a95)));
        for line in &polylines {
            jittered_polyline(line, amplitude, &mut rng, &mut out);
        }
    }
    out
}

fn flatten_to_polylines(path: &BezPath) -> Vec<Vec<Point>> {
    let mut lines: Vec<Vec<Point>> = Vec::new();
    let mut start: Option<Point> = None;
    kurbo::flatten(path.elements().iter().copied(), 0.25, |el| match el {
        PathEl::MoveTo(p) => {
            start = Some(p);
            lines.push(vec![p]);
        }
        PathEl::LineTo(p) => {
            if let Some(line) = lines.last_mut() {
                line.push(p);
            }
        }
        PathEl::ClosePath => {
            if let (Some(line), Some(s)) = (lines.last_mut(), start) {
                line.push(s);
            }
        }
        // flatten only emits move/line/close
        _ => {}
    });
    lines.retain(|l| l.len() >= 2);
    lines
}

fn jittered_polyline(line: &[Point], amplitude: f64, rng: &mut SketchRng, out: &mut BezPath) {
    let first = line[0];
    out.move_to(Point::new(
        first.x + rng.jitter(amplitude * 0.5),
        first.y + rng.jitter(amplitude * 0.5),
    ));
    for pair in line.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let len = a.distance(b);
        let steps = (len / SEGMENT_PX).ceil().max(1.0) as usize;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let end = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
            let mid = Point::new(
                a.x + (b.x - a.x) * (t - 0.5 / steps as f64) + rng.jitter(amplitude),
                a.y + (b.y - a.y) * (t - 0.5 / steps as f64) + rng.jitter(amplitude),
            );
            let end_jit = if i == steps {
                Point::new(
                    end.x + rng.jitter(amplitude * 0.5),
                    end.y + rng.jitter(amplitude * 0.5),
                )
            } else {
                Point::new(end.x + rng.jitter(amplitude), end.y + rng.jitter(amplitude))
            };
            out.quad_to(mid, end_jit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Shape;

    fn rect_path() -> BezPath {
        kurbo::Rect::new(0.0, 0.0, 100.0, 60.0).to_path(0.1)
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let a = sketch_stroke(&rect_path(), 0.8, 42);
        let b = sketch_stroke(&rect_path(), 0.8, 42);
        assert_eq!(a.elements(), b.elements());
    }

    #[test]
    fn different_seeds_diverge() {
        let a = sketch_stroke(&rect_path(), 0.8, 1);
        let b = sketch_stroke(&rect_path(), 0.8, 2);
        assert_ne!(a.elements(), b.elements());
    }

    #[test]
    fn zero_roughness_is_passthrough() {
        let a = sketch_stroke(&rect_path(), 0.0, 7);
        assert_eq!(a.elements(), rect_path().elements());
    }

    #[test]
    fn jitter_stays_bounded() {
        let mut rng = SketchRng::new(9);
        for _ in 0..1000 {
            let j = rng.jitter(2.0);
            assert!((-2.0..=2.0).contains(&j));
        }
    }
}
