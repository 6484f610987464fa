//! Affective agent — persistent cognitive state and the step engine.
//!
//! # Architecture
//!
//! ```text
//! driver ── step(reward, context, observation) ──▶ StepEngine
//!                                                   │  ScratchScope (per-step handles)
//!                                                   ├─ EmotionPredictor::predict
//!                                                   ├─ VarianceMonitor::observe
//!                                                   └─ AgentState commit (2 persistent handles)
//!        ◀── StepResult { emotion, trustScore, integrationParam, valid }
//! ```

pub mod engine;
pub mod state;

pub use engine::{StepEngine, StepResult, CLIP_BOUND, MAX_INTEGRATION_DELTA};
pub use state::{AgentSnapshot, AgentState, BELIEF_DIM};
