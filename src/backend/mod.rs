//! Numeric backend — the tensor-computation service the agent core runs on.
//!
//! The core never touches raw numeric storage.  It holds opaque
//! [`TensorHandle`]s issued by a shared [`NumericBackend`] and asks the
//! backend to combine, bound, read and release them.
//!
//! # Lifecycle
//!
//! ```text
//! allocate / concat / mul / scale / add / clip   → new handle (live += 1)
//! release                                        → live -= 1 (idempotent)
//! ScratchScope::drop                             → release every tracked handle
//! ScratchScope::retain                           → handle outlives the scope
//! ```
//!
//! All vectors are rank-1, so `concat` always joins along axis 0.

pub mod cpu;
pub mod error;
pub mod scope;

use std::fmt;

pub use cpu::CpuBackend;
pub use error::BackendError;
pub use scope::ScratchScope;

/// Opaque reference to a vector owned by a [`NumericBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorHandle(pub(crate) u64);

impl TensorHandle {
    /// Raw id, for diagnostics only.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t#{}", self.0)
    }
}

/// Tensor-computation service with explicit allocation accounting.
///
/// Implementations are shared process-wide (`Arc<dyn NumericBackend>`), so
/// every method takes `&self` and bookkeeping lives behind interior
/// mutability.  Every handle-producing operation counts as one allocation.
pub trait NumericBackend: Send + Sync {
    /// Copy `data` into a new backend vector.
    fn allocate(&self, data: &[f32]) -> Result<TensorHandle, BackendError>;

    /// Release a handle.  Releasing an unknown or already-released handle is a no-op.
    fn release(&self, handle: TensorHandle);

    /// Concatenate vectors in the given order.
    fn concat(&self, handles: &[TensorHandle]) -> Result<TensorHandle, BackendError>;

    /// Elementwise product of two equal-length vectors.
    fn mul(&self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError>;

    /// Elementwise sum of two equal-length vectors.
    fn add(&self, a: TensorHandle, b: TensorHandle) -> Result<TensorHandle, BackendError>;

    /// Multiply every component by `factor`.
    fn scale(&self, handle: TensorHandle, factor: f32) -> Result<TensorHandle, BackendError>;

    /// Bound every component to `[min, max]`.
    fn clip(&self, handle: TensorHandle, min: f32, max: f32)
        -> Result<TensorHandle, BackendError>;

    /// L2 norm.
    fn norm(&self, handle: TensorHandle) -> Result<f32, BackendError>;

    /// Copy the values back out as a plain vector.
    fn read(&self, handle: TensorHandle) -> Result<Vec<f32>, BackendError>;

    /// Number of components.
    fn len(&self, handle: TensorHandle) -> Result<usize, BackendError>;

    /// Number of handles currently live.
    fn live_allocations(&self) -> usize;
}
