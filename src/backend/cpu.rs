//! In-process backend — a handle arena over plain `f32` vectors.
//!
//! `CpuBackend` is the reference [`NumericBackend`]: every operation runs
//! synchronously on the calling thread, so a step never has to await a
//! device read-back.  An optional allocation cap makes resource exhaustion
//! reproducible in tests and constrained drivers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BackendError, NumericBackend, TensorHandle};

/// Arena bookkeeping, guarded by the backend mutex.
#[derive(Debug, Default)]
struct Arena {
    slots: HashMap<u64, Vec<f32>>,
    next_id: u64,
    /// Highest simultaneous live count seen.
    peak: usize,
    /// Allocations issued over the backend's lifetime.
    issued: u64,
}

/// Thread-safe arena backend.
#[derive(Debug, Default)]
pub struct CpuBackend {
    arena: Mutex<Arena>,
    limit: Mutex<Option<usize>>,
}

impl CpuBackend {
    /// Create a backend with an optional cap on live allocations.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            arena: Mutex::new(Arena::default()),
            limit: Mutex::new(limit),
        }
    }

    /// Startup handshake: hand the driver a ready, shareable backend.
    pub fn ready(limit: Option<usize>) -> Arc<Self> {
        log::info!(
            "CPU numeric backend ready (allocation limit: {})",
            limit.map_or_else(|| "none".to_string(), |l| l.to_string())
        );
        Arc::new(Self::new(limit))
    }

    /// Change the live-allocation cap.  `None` removes it.
    pub fn set_limit(&self, limit: Option<usize>) {
        *self.limit.lock() = limit;
    }

    /// Highest simultaneous live count seen so far.
    pub fn peak_allocations(&self) -> usize {
        self.arena.lock().peak
    }

    /// Total allocations issued over the backend's lifetime.
    pub fn issued_allocations(&self) -> u64 {
        self.arena.lock().issued
    }

    fn store(&self, data: Vec<f32>) -> Result<TensorHandle, BackendError> {
        let limit = *self.limit.lock();
        let mut arena = self.arena.lock();
        let live = arena.slots.len();
        if let Some(limit) = limit {
            if live >= limit {
                return Err(BackendError::AllocationFailed { live, limit });
            }
        }
        let id = arena.next_id;
        arena.next_id += 1;
        arena.issued += 1;
        arena.slots.insert(id, data);
        arena.peak = arena.peak.max(arena.slots.len());
        Ok(TensorHandle(id))
    }

    fn with_values<T>(
        &self,
        handle: TensorHandle,
        f: impl FnOnce(&[f32]) -> T,
    ) -> Result<T, BackendError> {
        let arena = self.arena.lock();
        arena
            .slots
            .get(&handle.0)
            .map(|v| f(v.as_slice()))
            .ok_or(BackendError::UnknownHandle(handle.0))
    }

    fn zip_with(
        &self,
        a: TensorHandle,
        b: TensorHandle,
        op: impl Fn(f32, f32) -> f32,
    ) -> Result<TensorHandle, BackendError> {
        let out = {
            let arena = self.arena.lock();
            let left = arena
                .slots
                .get(&a.0)
                .ok_or(BackendError::UnknownHandle(a.0))?;
            let right = arena
                .slots
                .get(&b.0)
                .ok_or(BackendError::UnknownHandle(b.0))?;
            if left.len() != right.len() {
                return Err(BackendError::LengthMismatch {
                    left: left.len(),
                    right: right.len(),
                });
            }
            left.iter().zip(right).map(|(x, y)| op(*x, *y)).collect()
        };
        self.store(out)
    }
}

impl NumericBackend for CpuBackend {
    fn allocate(&self, data: &[f32]) -> Result<TensorHandle, BackendError> {
        self.store(data.to_vec())
    }

    fn release(&self, handle: TensorHandle) {
        self.arena.lock().slots.remove(&handle.0);
    }

    fn concat(&self, handles: &[TensorHandle]) -> Result<TensorHandle, BackendError> {
        let out = {
            let arena = self.arena.lock();
            let mut out = Vec::new();
            for h in handles {
                let values = arena
                    .slots
                    .get(&h.0)
                    .ok_or(BackendError::UnknownHandle(h.0))?;
                out.extend_from_slice(values);
            }
            out
        };
        self.store(out)
    }

    fn mul(&self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError> {
        self.zip_with(a, b, |x, y| x * y)
    }

    fn add(&self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError> {
        self.zip_with(a, b, |x, y| x + y)
    }

    fn scale(&self, handle: TensorHandle, factor: f32) -> Result<TensorHandle, BackendError> {
        let out = self.with_values(handle, |v| v.iter().map(|x| x * factor).collect())?;
        self.store(out)
    }

    fn clip(
        &self,
        handle: TensorHandle,
        min: f32,
        max: f32,
    ) -> Result<TensorHandle, BackendError> {
        // NaN stays NaN; callers reject non-finite values before clipping.
        let out = self.with_values(handle, |v| v.iter().map(|x| x.clamp(min, max)).collect())?;
        self.store(out)
    }

    fn norm(&self, handle: TensorHandle) -> Result<f32, BackendError> {
        self.with_values(handle, |v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
    }

    fn read(&self, handle: TensorHandle) -> Result<Vec<f32>, BackendError> {
        self.with_values(handle, |v| v.to_vec())
    }

    fn len(&self, handle: TensorHandle) -> Result<usize, BackendError> {
        self.with_values(handle, |v| v.len())
    }

    fn live_allocations(&self) -> usize {
        self.arena.lock().slots.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_read() {
        let backend = CpuBackend::new(None);
        let h = backend.allocate(&[1.0, -2.0, 3.0]).unwrap();
        assert_eq!(backend.read(h).unwrap(), vec![1.0, -2.0, 3.0]);
        assert_eq!(backend.len(h).unwrap(), 3);
        assert_eq!(backend.live_allocations(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let backend = CpuBackend::new(None);
        let h = backend.allocate(&[0.5]).unwrap();
        backend.release(h);
        backend.release(h);
        assert_eq!(backend.live_allocations(), 0);
        assert_eq!(backend.read(h), Err(BackendError::UnknownHandle(h.id())));
    }

    #[test]
    fn test_concat_preserves_order() {
        let backend = CpuBackend::new(None);
        let a = backend.allocate(&[1.0, 2.0]).unwrap();
        let b = backend.allocate(&[3.0]).unwrap();
        let c = backend.concat(&[b, a]).unwrap();
        assert_eq!(backend.read(c).unwrap(), vec![3.0, 1.0, 2.0]);
        assert_eq!(backend.live_allocations(), 3);
    }

    #[test]
    fn test_elementwise_ops() {
        let backend = CpuBackend::new(None);
        let a = backend.allocate(&[1.0, 2.0, 3.0]).unwrap();
        let b = backend.allocate(&[2.0, 0.5, -1.0]).unwrap();

        let product = backend.mul(a, b).unwrap();
        assert_eq!(backend.read(product).unwrap(), vec![2.0, 1.0, -3.0]);

        let sum = backend.add(a, b).unwrap();
        assert_eq!(backend.read(sum).unwrap(), vec![3.0, 2.5, 2.0]);

        let scaled = backend.scale(a, 0.5).unwrap();
        assert_eq!(backend.read(scaled).unwrap(), vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_length_mismatch() {
        let backend = CpuBackend::new(None);
        let a = backend.allocate(&[1.0, 2.0]).unwrap();
        let b = backend.allocate(&[1.0]).unwrap();
        assert_eq!(
            backend.mul(a, b),
            Err(BackendError::LengthMismatch { left: 2, right: 1 })
        );
        // Failed op allocates nothing.
        assert_eq!(backend.live_allocations(), 2);
    }

    #[test]
    fn test_clip_and_norm() {
        let backend = CpuBackend::new(None);
        let h = backend.allocate(&[5.0, -7.0, 0.25]).unwrap();
        let clipped = backend.clip(h, -1.0, 1.0).unwrap();
        assert_eq!(backend.read(clipped).unwrap(), vec![1.0, -1.0, 0.25]);

        let v = backend.allocate(&[3.0, 4.0]).unwrap();
        assert!((backend.norm(v).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_allocation_limit() {
        let backend = CpuBackend::new(Some(2));
        let a = backend.allocate(&[1.0]).unwrap();
        let _b = backend.allocate(&[1.0]).unwrap();
        assert_eq!(
            backend.allocate(&[1.0]),
            Err(BackendError::AllocationFailed { live: 2, limit: 2 })
        );
        backend.release(a);
        assert!(backend.allocate(&[1.0]).is_ok());

        backend.set_limit(None);
        assert!(backend.allocate(&[1.0]).is_ok());
    }

    #[test]
    fn test_peak_and_issued_counters() {
        let backend = CpuBackend::ready(None);
        let a = backend.allocate(&[1.0]).unwrap();
        let b = backend.allocate(&[1.0]).unwrap();
        backend.release(a);
        backend.release(b);
        let _c = backend.allocate(&[1.0]).unwrap();
        assert_eq!(backend.peak_allocations(), 2);
        assert_eq!(backend.issued_allocations(), 3);
        assert_eq!(backend.live_allocations(), 1);
    }
}
