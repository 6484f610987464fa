//! Scoped acquisition of scratch handles.
//!
//! A [`ScratchScope`] wraps a backend for the duration of one bounded
//! operation.  Every handle created through the scope is tracked, and the
//! scope releases whatever is still tracked when it is dropped, so an early
//! return through `?` cannot leak an allocation.  A handle that must outlive
//! the operation is handed out with [`ScratchScope::retain`].

use super::{BackendError, NumericBackend, TensorHandle};

/// Tracks scratch handles and releases them on drop.
pub struct ScratchScope<'a> {
    backend: &'a dyn NumericBackend,
    tracked: Vec<TensorHandle>,
}

impl<'a> ScratchScope<'a> {
    /// Open a scope over `backend`.
    pub fn new(backend: &'a dyn NumericBackend) -> Self {
        Self {
            backend,
            tracked: Vec::new(),
        }
    }

    /// The backend this scope allocates from.
    pub fn backend(&self) -> &'a dyn NumericBackend {
        self.backend
    }

    /// Number of handles the scope will release on drop.
    pub fn tracked(&self) -> usize {
        self.tracked.len()
    }

    fn track(&mut self, handle: TensorHandle) -> TensorHandle {
        self.tracked.push(handle);
        handle
    }

    /// Allocate a tracked vector.
    pub fn allocate(&mut self, data: &[f32]) -> Result<TensorHandle, BackendError> {
        let h = self.backend.allocate(data)?;
        Ok(self.track(h))
    }

    /// Tracked concatenation.
    pub fn concat(&mut self, handles: &[TensorHandle]) -> Result<TensorHandle, BackendError> {
        let h = self.backend.concat(handles)?;
        Ok(self.track(h))
    }

    /// Tracked elementwise product.
    pub fn mul(&mut self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError> {
        let h = self.backend.mul(a, b)?;
        Ok(self.track(h))
    }

    /// Tracked elementwise sum.
    pub fn add(&mut self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError> {
        let h = self.backend.add(a, b)?;
        Ok(self.track(h))
    }

    /// Tracked scaling.
    pub fn scale(&mut self, handle: TensorHandle, factor: f32) -> Result<TensorHandle, BackendError> {
        let h = self.backend.scale(handle, factor)?;
        Ok(self.track(h))
    }

    /// Tracked hard clip.
    pub fn clip(
        &mut self,
        handle: TensorHandle,
        min: f32,
        max: f32,
    ) -> Result<TensorHandle, BackendError> {
        let h = self.backend.clip(handle, min, max)?;
        Ok(self.track(h))
    }

    /// L2 norm (allocates nothing).
    pub fn norm(&self, handle: TensorHandle) -> Result<f32, BackendError> {
        self.backend.norm(handle)
    }

    /// Read values back (allocates nothing).
    pub fn read(&self, handle: TensorHandle) -> Result<Vec<f32>, BackendError> {
        self.backend.read(handle)
    }

    /// Stop tracking `handle` so it survives the scope.
    ///
    /// Returns `false` if the handle was not created through this scope.
    pub fn retain(&mut self, handle: TensorHandle) -> bool {
        match self.tracked.iter().position(|h| *h == handle) {
            Some(idx) => {
                self.tracked.swap_remove(idx);
                true
            }
            None => false,
        }
    }
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        for h in self.tracked.drain(..) {
            self.backend.release(h);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
