//! Turning an unbounded stream of points into a bounded number of draws.
//!
//! [`Accumulator`] is a generic append buffer with an amortized flush: items
//! pile up in a live list until it grows past a threshold, then the whole
//! list is handed to a flush function that returns an opaque handle. On
//! success the handle is kept as an immutable [`Batch`] and the live list is
//! cleared; on failure nothing changes.
//!
//! For points the flush is [`bake_vertices`] followed by
//! [`BatchSink::create_batch`]: every live point is expanded to a
//! world-space cube (in parallel) and uploaded as one vertex buffer.
//!
//! ```ignore
//! let mut points: Accumulator<Point3, GpuBatch> = Accumulator::new(12_500);
//! points.push(p);
//! if points.should_flush() {
//!     points.flush_with(|live| {
//!         let vertices = bake_vertices(live, &mesh, point_size);
//!         sink.create_batch(&vertices)
//!     })?;
//! }
//! ```

use rayon::prelude::*;

use crate::error::BakeError;
use crate::geometry::{point_model, CubeMesh, CubeVertex, Point3, CUBE_VERTEX_COUNT};

/// A frozen flush result and how many items went into it.
#[derive(Debug)]
pub struct Batch<H> {
    handle: H,
    len: usize,
}

impl<H> Batch<H> {
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Number of items baked into this batch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_handle(self) -> H {
        self.handle
    }
}

/// Append-only buffer that drains into immutable batches.
#[derive(Debug)]
pub struct Accumulator<T, H> {
    live: Vec<T>,
    threshold: usize,
    batches: Vec<Batch<H>>,
    baked: usize,
}

impl<T, H> Accumulator<T, H> {
    /// Flush becomes due once more than `threshold` items are live.
    pub fn new(threshold: usize) -> Self {
        Self {
            live: Vec::new(),
            threshold,
            batches: Vec::new(),
            baked: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.live.push(item);
    }

    pub fn live(&self) -> &[T] {
        &self.live
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn batches(&self) -> &[Batch<H>] {
        &self.batches
    }

    /// Items held across all batches.
    pub fn baked_len(&self) -> usize {
        self.baked
    }

    /// Live plus baked items.
    pub fn total_len(&self) -> usize {
        self.live.len() + self.baked
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn should_flush(&self) -> bool {
        self.live.len() > self.threshold
    }

    /// Freeze every live item into a new batch.
    ///
    /// `flush` sees a read-only view of the live items. If it returns an
    /// error the live items and batch list are left exactly as they were.
    /// Flushing with no live items is a no-op that returns `Ok(None)`.
    pub fn flush_with<E, F>(&mut self, flush: F) -> Result<Option<&Batch<H>>, E>
    where
        F: FnOnce(&[T]) -> Result<H, E>,
    {
        if self.live.is_empty() {
            return Ok(None);
        }
        let handle = flush(&self.live)?;
        let len = self.live.len();
        self.live.clear();
        self.baked += len;
        self.batches.push(Batch { handle, len });
        Ok(self.batches.last())
    }

    /// Drop every live item and hand back every batch for disposal.
    pub fn clear(&mut self) -> Vec<Batch<H>> {
        self.live.clear();
        self.baked = 0;
        std::mem::take(&mut self.batches)
    }
}

/// The renderer side of baking: owns the memory behind each batch.
pub trait BatchSink {
    type Handle;

    /// Upload `vertices` as one immutable batch.
    fn create_batch(&mut self, vertices: &[CubeVertex]) -> Result<Self::Handle, BakeError>;

    /// Release a batch created by this sink.
    fn dispose_batch(&mut self, handle: Self::Handle);
}

/// Expand every point into a world-space cube.
///
/// Vertices are laid out point by point in input order, 36 per point, each
/// moved by [`point_model`]`(point, point_size)`. Points are transformed in
/// parallel; the result is only returned once complete.
pub fn bake_vertices(points: &[Point3], mesh: &CubeMesh, point_size: f32) -> Vec<CubeVertex> {
    let template = mesh.vertices();
    debug_assert_eq!(template.len(), CUBE_VERTEX_COUNT);

    let mut vertices = vec![CubeVertex::default(); points.len() * CUBE_VERTEX_COUNT];
    vertices
        .par_chunks_mut(CUBE_VERTEX_COUNT)
        .zip(points.par_iter())
        .for_each(|(out, &point)| {
            let model = point_model(point, point_size);
            for (dst, src) in out.iter_mut().zip(template) {
                *dst = src.transformed(&model);
            }
        });
    vertices
}

/// Handle for a batch kept in host memory by [`HostSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBatch {
    pub id: usize,
    pub vertex_count: usize,
}

/// A [`BatchSink`] that keeps batches in host memory.
///
/// Used for headless runs and tests. An optional per-batch vertex capacity
/// makes oversized batches fail the same way a device limit would, and
/// [`HostSink::fail_next`] forces the next creation to fail.
#[derive(Debug, Default)]
pub struct HostSink {
    batches: Vec<Option<Vec<CubeVertex>>>,
    max_vertices: Option<usize>,
    fail_next: bool,
    disposed: usize,
}

impl HostSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject batches with more than `max_vertices` vertices.
    pub fn with_capacity_limit(max_vertices: usize) -> Self {
        Self {
            max_vertices: Some(max_vertices),
            ..Self::default()
        }
    }

    /// Make the next `create_batch` call fail.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Batches created and not yet disposed.
    pub fn live_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_some()).count()
    }

    pub fn created(&self) -> usize {
        self.batches.len()
    }

    pub fn disposed(&self) -> usize {
        self.disposed
    }

    pub fn vertices(&self, handle: &HostBatch) -> Option<&[CubeVertex]> {
        self.batches.get(handle.id)?.as_deref()
    }
}

impl BatchSink for HostSink {
    type Handle = HostBatch;

    fn create_batch(&mut self, vertices: &[CubeVertex]) -> Result<HostBatch, BakeError> {
        let bytes = std::mem::size_of_val(vertices) as u64;
        if std::mem::take(&mut self.fail_next) {
            return Err(BakeError::CapacityExceeded {
                requested: bytes,
                limit: 0,
            });
        }
        if let Some(max) = self.max_vertices {
            if vertices.len() > max {
                return Err(BakeError::CapacityExceeded {
                    requested: bytes,
                    limit: (max * std::mem::size_of::<CubeVertex>()) as u64,
                });
            }
        }
        self.batches.push(Some(vertices.to_vec()));
        Ok(HostBatch {
            id: self.batches.len() - 1,
            vertex_count: vertices.len(),
        })
    }

    fn dispose_batch(&mut self, handle: HostBatch) {
        if let Some(slot) = self.batches.get_mut(handle.id) {
            if slot.take().is_some() {
                self.disposed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{build_cube, Rgb};
    use glam::Vec3;

    #[test]
    fn test_flush_due_only_past_threshold() {
        let mut acc: Accumulator<u32, ()> = Accumulator::new(3);
        for i in 0..3 {
            acc.push(i);
        }
        assert!(!acc.should_flush());
        acc.push(3);
        assert!(acc.should_flush());
    }

    #[test]
    fn test_flush_moves_live_into_batch() {
        let mut acc: Accumulator<u32, Vec<u32>> = Accumulator::new(2);
        for i in 0..5 {
            acc.push(i);
        }
        let batch = acc
            .flush_with(|live| Ok::<_, ()>(live.to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.handle(), &vec![0, 1, 2, 3, 4]);
        assert_eq!(acc.live_len(), 0);
        assert_eq!(acc.baked_len(), 5);
        assert_eq!(acc.total_len(), 5);
    }

    #[test]
    fn test_failed_flush_keeps_live_items() {
        let mut acc: Accumulator<u32, ()> = Accumulator::new(1);
        acc.push(7);
        acc.push(8);
        let result = acc.flush_with(|_| Err("no room"));
        assert_eq!(result.unwrap_err(), "no room");
        assert_eq!(acc.live(), &[7, 8]);
        assert!(acc.batches().is_empty());
        assert_eq!(acc.total_len(), 2);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let mut acc: Accumulator<u32, ()> = Accumulator::new(0);
        let result = acc.flush_with(|_| -> Result<(), ()> { panic!("flush called on empty buffer") });
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_clear_returns_all_batches() {
        let mut acc: Accumulator<u32, usize> = Accumulator::new(0);
        for round in 0..3 {
            acc.push(round);
            acc.flush_with(|live| Ok::<_, ()>(live.len())).unwrap();
        }
        acc.push(99);
        let batches = acc.clear();
        assert_eq!(batches.len(), 3);
        assert_eq!(acc.total_len(), 0);
        assert!(acc.batches().is_empty());
    }

    #[test]
    fn test_bake_vertices_match_live_transform() {
        let mesh = build_cube(Rgb::new(1, 2, 3));
        let points = vec![Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.9, 0.5, 0.0), Vec3::ZERO];
        let size = 3.0;
        let vertices = bake_vertices(&points, &mesh, size);

        assert_eq!(vertices.len(), points.len() * CUBE_VERTEX_COUNT);
        for (chunk, &point) in vertices.chunks(CUBE_VERTEX_COUNT).zip(&points) {
            let model = point_model(point, size);
            for (baked, src) in chunk.iter().zip(mesh.vertices()) {
                let expected = model.transform_point3(Vec3::from(src.position));
                assert!((Vec3::from(baked.position) - expected).length() < 1e-6);
                assert_eq!(baked.color, src.color);
            }
        }
    }

    #[test]
    fn test_host_sink_capacity_and_forced_failure() {
        let mesh = build_cube(Rgb::WHITE);
        let vertices = bake_vertices(&[Vec3::ZERO, Vec3::ONE], &mesh, 1.0);

        let mut sink = HostSink::with_capacity_limit(CUBE_VERTEX_COUNT);
        assert!(matches!(
            sink.create_batch(&vertices),
            Err(BakeError::CapacityExceeded { .. })
        ));

        let mut sink = HostSink::new();
        sink.fail_next();
        assert!(sink.create_batch(&vertices).is_err());
        let handle = sink.create_batch(&vertices).unwrap();
        assert_eq!(handle.vertex_count, 72);
        assert_eq!(sink.vertices(&handle).map(|v| v.len()), Some(72));

        sink.dispose_batch(handle);
        assert_eq!(sink.live_batches(), 0);
        assert_eq!(sink.disposed(), 1);
        assert!(sink.vertices(&handle).is_none());
    }
}
