//! # Affective Agent
//!
//! Core of an interactive affective-state simulation.  Each tick the agent
//! folds a reward and a context signal into a latent belief vector, asks an
//! emotion predictor for a new emotion estimate, blends the two under a trust
//! weighting, and tracks a bounded integration parameter across steps.
//!
//! Rendering, UI and asset handling live outside this crate.  They drive a
//! [`Simulation`] (or a bare [`StepEngine`]) once per frame and consume the
//! returned [`StepResult`].
//!
//! Numeric work goes through a shared [`NumericBackend`] with explicit
//! handle lifecycle; a step never leaves more live allocations behind than
//! it found.

pub mod agent;
pub mod backend;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod predictor;
pub mod session;

pub use agent::{AgentSnapshot, AgentState, StepEngine, StepResult, BELIEF_DIM};
pub use backend::{BackendError, CpuBackend, NumericBackend, ScratchScope, TensorHandle};
pub use config::AgentConfig;
pub use errors::{AgentError, ConfigError, PredictorError};
pub use monitor::{VarianceMonitor, VarianceReading};
pub use predictor::{ConstantPredictor, DensePredictor, EmotionPredictor, FnPredictor};
pub use session::{SessionSummary, Simulation, StepRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
