use std::collections::HashMap;

/// Pool configuration for cached page surfaces.
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum retained surfaces per (w,h) bucket.
    pub max_surfaces_per_bucket: usize,
}

impl Default for SurfacePoolOpts {
    fn default() -> Self {
        Self {
            // A handful of A4-at-canvas-scale pages; exports reuse one
            // surface per page size so this rarely grows.
            max_pool_bytes: 128 * 1024 * 1024,
            max_surfaces_per_bucket: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SurfaceKey {
    w: u16,
    h: u16,
}

impl SurfaceKey {
    fn byte_len(self) -> usize {
        (self.w as usize) * (self.h as usize) * 4
    }
}

#[derive(Debug, Default, Clone)]
pub struct SurfacePoolStats {
    pub retained_surfaces: usize,
    pub retained_bytes: usize,
    pub alloc_surfaces: u64,
    pub dropped_on_release: u64,
}

/// Bounded pooled allocator for RGBA8 pixmaps.
///
/// The offscreen rendering surface is the heavyweight resource of an
/// export: one pool is acquired per job and dropped on every exit path,
/// success, failure or cancellation alike. Borrow/release happens at page
/// granularity.
pub struct SurfacePool {
    opts: SurfacePoolOpts,
    stats: SurfacePoolStats,
    buckets: HashMap<SurfaceKey, Vec<vello_cpu::Pixmap>>,
}

impl SurfacePool {
    pub fn new(opts: SurfacePoolOpts) -> Self {
        Self {
            opts,
            stats: SurfacePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub fn stats(&self) -> SurfacePoolStats {
        self.stats.clone()
    }

    pub fn borrow(&mut self, w: u16, h: u16) -> vello_cpu::Pixmap {
        let key = SurfaceKey { w, h };
        if let Some(bucket) = self.buckets.get_mut(&key)
            && let Some(p) = bucket.pop()
        {
            self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            return p;
        }
        self.stats.alloc_surfaces += 1;
        vello_cpu::Pixmap::new(w, h)
    }

    pub fn release(&mut self, pixmap: vello_cpu::Pixmap) {
        let key = SurfaceKey {
            w: pixmap.width(),
            h: pixmap.height(),
        };
        let bytes = key.byte_len();
        if self.opts.max_surfaces_per_bucket == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release += 1;
            return;
        }
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.max_surfaces_per_bucket {
            self.stats.dropped_on_release += 1;
            return;
        }
        bucket.push(pixmap);
        self.stats.retained_surfaces += 1;
        self.stats.retained_bytes += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_honors_bucket_cap() {
        let mut p = SurfacePool::new(SurfacePoolOpts {
            max_pool_bytes: 1 << 30,
            max_surfaces_per_bucket: 1,
        });
        let a = p.borrow(8, 8);
        let b = p.borrow(8, 8);
        p.release(a);
        p.release(b);
        assert_eq!(p.stats().retained_surfaces, 1);
        assert_eq!(p.stats().dropped_on_release, 1);
    }

    #[test]
    fn pool_honors_global_byte_cap() {
        let bytes_8x8 = 8 * 8 * 4;
        let mut p = SurfacePool::new(SurfacePoolOpts {
            max_pool_bytes: bytes_8x8,
            max_surfaces_per_bucket: 8,
        });
        let a = p.borrow(8, 8);
        let b = p.borrow(8, 8);
        p.release(a);
        p.release(b);
        let st = p.stats();
        assert_eq!(st.retained_bytes, bytes_8x8);
        assert_eq!(st.retained_surfaces, 1);
    }

    #[test]
    fn borrow_reuses_released_surfaces() {
        let mut p = SurfacePool::new(SurfacePoolOpts::default());
        let a = p.borrow(16, 16);
        p.release(a);
        let _b = p.borrow(16, 16);
        assert_eq!(p.stats().alloc_surfaces, 1);
    }
}
