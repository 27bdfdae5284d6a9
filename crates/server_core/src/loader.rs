//! Per-viewer chunk loading: the spiral offset table and the load/unload
//! queues recomputed every chunk subtick.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::chunk::ChunkPos;
use crate::limiter::RateLimiter;

/// Hard cap on the chunk radius any viewer can request.
pub const MAX_RADIUS: i32 = 32;

struct LoadTable {
    /// All offsets with Euclidean distance < `MAX_RADIUS`, nearest first.
    offsets: Vec<[i32; 2]>,
    /// `radius_idx[r]` = number of offsets with distance < `r`.
    radius_idx: Vec<usize>,
}

fn load_table() -> &'static LoadTable {
    static TABLE: OnceLock<LoadTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut offsets = Vec::new();
        for x in -MAX_RADIUS..=MAX_RADIUS {
            for z in -MAX_RADIUS..=MAX_RADIUS {
                if distance([x, z]) < f64::from(MAX_RADIUS) {
                    offsets.push([x, z]);
                }
            }
        }
        offsets.sort_by(|a, b| distance(*a).total_cmp(&distance(*b)));
        let radius_idx = (0..=MAX_RADIUS)
            .map(|r| offsets.partition_point(|o| distance(*o) < f64::from(r)))
            .collect();
        LoadTable { offsets, radius_idx }
    })
}

fn distance(offset: [i32; 2]) -> f64 {
    f64::from(offset[0] * offset[0] + offset[1] * offset[1]).sqrt()
}

/// Loading state for one viewer: the chunks already sent, the scratch
/// queues recomputed each chunk subtick, and this viewer's own limiter.
pub struct Loader {
    pub loaded: HashSet<ChunkPos>,
    pub load_queue: Vec<ChunkPos>,
    pub unload_queue: Vec<ChunkPos>,
    pub limiter: RateLimiter,
}

impl Loader {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            loaded: HashSet::new(),
            load_queue: Vec::new(),
            unload_queue: Vec::new(),
            limiter,
        }
    }

    /// Chunks inside `radius` of `center` not yet sent, nearest first.
    pub fn calc_load_queue(&mut self, center: [i32; 2], radius: i32) {
        let table = load_table();
        let r = radius.clamp(0, MAX_RADIUS) as usize;
        self.load_queue.clear();
        for offset in &table.offsets[..table.radius_idx[r]] {
            let pos = [center[0] + offset[0], center[1] + offset[1]];
            if !self.loaded.contains(&pos) {
                self.load_queue.push(pos);
            }
        }
    }

    /// Sent chunks that have fallen outside `radius` of `center`.
    pub fn calc_unload_queue(&mut self, center: [i32; 2], radius: i32) {
        self.unload_queue.clear();
        for chunk in &self.loaded {
            let rel = [chunk[0] - center[0], chunk[1] - center[1]];
            if distance(rel) > f64::from(radius) {
                self.unload_queue.push(*chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn radius_two_queue_is_the_nine_nearest_chunks() {
        let mut loader = Loader::new(RateLimiter::unlimited());
        loader.calc_load_queue([0, 0], 2);
        let got: HashSet<[i32; 2]> = loader.load_queue.iter().copied().collect();
        let expect: HashSet<[i32; 2]> = [
            [0, 0],
            [1, 0],
            [0, 1],
            [-1, 0],
            [0, -1],
            [1, 1],
            [1, -1],
            [-1, 1],
            [-1, -1],
        ]
        .into_iter()
        .collect();
        assert_eq!(got, expect);
        assert_eq!(loader.load_queue[0], [0, 0]);
    }

    #[test]
    fn queue_covers_every_offset_below_radius_in_distance_order() {
        let mut loader = Loader::new(RateLimiter::unlimited());
        for radius in [0, 1, 2, 5, 13, MAX_RADIUS] {
            loader.loaded.clear();
            loader.calc_load_queue([7, -3], radius);
            let mut last = 0.0f64;
            let mut seen = HashSet::new();
            for pos in &loader.load_queue {
                let d = distance([pos[0] - 7, pos[1] + 3]);
                assert!(d < f64::from(radius), "offset beyond radius {radius}");
                assert!(d >= last, "queue not sorted by distance");
                last = d;
                assert!(seen.insert(*pos), "duplicate entry");
            }
            let expect = (-radius..=radius)
                .flat_map(|x| (-radius..=radius).map(move |z| [x, z]))
                .filter(|o| distance(*o) < f64::from(radius))
                .count();
            assert_eq!(loader.load_queue.len(), expect);
        }
    }

    #[test]
    fn already_loaded_chunks_are_skipped() {
        let mut loader = Loader::new(RateLimiter::unlimited());
        loader.loaded.insert([0, 0]);
        loader.loaded.insert([1, 0]);
        loader.calc_load_queue([0, 0], 2);
        assert!(!loader.load_queue.contains(&[0, 0]));
        assert!(!loader.load_queue.contains(&[1, 0]));
        assert_eq!(loader.load_queue.len(), 7);
    }

    #[test]
    fn unload_queue_collects_chunks_beyond_radius() {
        let mut loader = Loader::new(RateLimiter::unlimited());
        for pos in [[0, 0], [2, 0], [0, 3], [-4, -4]] {
            loader.loaded.insert(pos);
        }
        loader.calc_unload_queue([0, 0], 2);
        let got: HashSet<[i32; 2]> = loader.unload_queue.iter().copied().collect();
        assert_eq!(got, [[0, 3], [-4, -4]].into_iter().collect());
    }
}
