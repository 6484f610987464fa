//! Persistent agent state.
//!
//! Owned by exactly one [`StepEngine`](super::StepEngine) and mutated only
//! inside `step`.  The belief and previous-emotion vectors live in the
//! numeric backend as two long-lived handles; every commit swaps in a fresh
//! handle and releases the old one, so the persistent count stays at two.

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, NumericBackend, TensorHandle};
use crate::config::{AgentConfig, INTEGRATION_MAX, INTEGRATION_MIN};
use crate::monitor::{VarianceMonitor, VarianceReading};

/// Width of the belief embedding.
pub const BELIEF_DIM: usize = 64;

/// Cognitive state carried across steps.
#[derive(Debug)]
pub struct AgentState {
    belief: TensorHandle,
    previous_emotion: TensorHandle,
    /// L2 norm of `previous_emotion`, cached at commit.
    previous_emotion_norm: f32,
    trust_score: f32,
    integration_param: f32,
    /// Consecutive steps without a large deviation.
    stable_streak: u32,
    step_count: u64,
    variance_history: VarianceMonitor,
    released: bool,
}

impl AgentState {
    /// Allocate the two persistent handles (belief and emotion seeded to zeros).
    pub fn allocate(
        backend: &dyn NumericBackend,
        emotion_width: usize,
        config: &AgentConfig,
    ) -> Result<Self, BackendError> {
        let belief = backend.allocate(&[0.0; BELIEF_DIM])?;
        let previous_emotion = match backend.allocate(&vec![0.0; emotion_width]) {
            Ok(h) => h,
            Err(e) => {
                backend.release(belief);
                return Err(e);
            }
        };

        Ok(Self {
            belief,
            previous_emotion,
            previous_emotion_norm: 0.0,
            trust_score: 1.0,
            integration_param: config.clamped_initial_integration(),
            stable_streak: 0,
            step_count: 0,
            variance_history: VarianceMonitor::new(
                config.variance_window_size,
                config.high_variance_threshold,
                config.increasing_variance_threshold,
            ),
            released: false,
        })
    }

    pub fn belief(&self) -> TensorHandle {
        self.belief
    }

    pub fn previous_emotion(&self) -> TensorHandle {
        self.previous_emotion
    }

    pub fn previous_emotion_norm(&self) -> f32 {
        self.previous_emotion_norm
    }

    pub fn trust_score(&self) -> f32 {
        self.trust_score
    }

    pub fn integration_param(&self) -> f32 {
        self.integration_param
    }

    pub fn stable_streak(&self) -> u32 {
        self.stable_streak
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn variance_history(&self) -> &VarianceMonitor {
        &self.variance_history
    }

    pub(crate) fn variance_history_mut(&mut self) -> &mut VarianceMonitor {
        &mut self.variance_history
    }

    /// Store a trust value, clamped into `[0, 1]`.
    pub(crate) fn set_trust(&mut self, value: f32) {
        self.trust_score = value.clamp(0.0, 1.0);
    }

    /// Store an integration value, clamped into `[0.05, 0.95]`.
    pub(crate) fn set_integration(&mut self, value: f32) {
        self.integration_param = value.clamp(INTEGRATION_MIN, INTEGRATION_MAX);
    }

    pub(crate) fn set_stable_streak(&mut self, streak: u32) {
        self.stable_streak = streak;
    }

    pub(crate) fn advance(&mut self) {
        self.step_count += 1;
    }

    /// Swap in newly committed vectors and release the ones they replace.
    pub(crate) fn replace_vectors(
        &mut self,
        backend: &dyn NumericBackend,
        belief: TensorHandle,
        emotion: TensorHandle,
        emotion_norm: f32,
    ) {
        let old_belief = std::mem::replace(&mut self.belief, belief);
        let old_emotion = std::mem::replace(&mut self.previous_emotion, emotion);
        self.previous_emotion_norm = emotion_norm;
        backend.release(old_belief);
        backend.release(old_emotion);
    }

    /// Release the persistent handles.  Safe to call more than once.
    pub(crate) fn release(&mut self, backend: &dyn NumericBackend) {
        if self.released {
            return;
        }
        backend.release(self.belief);
        backend.release(self.previous_emotion);
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Copy the state out of the backend.
    pub fn snapshot(&self, backend: &dyn NumericBackend) -> Result<AgentSnapshot, BackendError> {
        Ok(AgentSnapshot {
            belief: backend.read(self.belief)?,
            previous_emotion: backend.read(self.previous_emotion)?,
            trust_score: self.trust_score,
            integration_param: self.integration_param,
            stable_streak: self.stable_streak,
            step_count: self.step_count,
            variance: self.variance_history.last_reading(),
        })
    }
}

/// Read-only copy of [`AgentState`], detached from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub belief: Vec<f32>,
    pub previous_emotion: Vec<f32>,
    pub trust_score: f32,
    pub integration_param: f32,
    pub stable_streak: u32,
    pub step_count: u64,
    pub variance: VarianceReading,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    #[test]
    fn test_allocate_seeds_zeros() {
        let backend = CpuBackend::new(None);
        let state = AgentState::allocate(&backend, 8, &AgentConfig::default()).unwrap();
        assert_eq!(backend.live_allocations(), 2);

        let snap = state.snapshot(&backend).unwrap();
        assert_eq!(snap.belief, vec![0.0; BELIEF_DIM]);
        assert_eq!(snap.previous_emotion, vec![0.0; 8]);
        assert_eq!(snap.trust_score, 1.0);
        assert_eq!(snap.integration_param, 0.5);
        assert_eq!(snap.step_count, 0);
    }

    #[test]
    fn test_allocation_failure_leaves_nothing_behind() {
        let backend = CpuBackend::new(Some(1));
        let err = AgentState::allocate(&backend, 8, &AgentConfig::default()).unwrap_err();
        assert!(matches!(err, BackendError::AllocationFailed { .. }));
        assert_eq!(backend.live_allocations(), 0);
    }

    #[test]
    fn test_setters_clamp() {
        let backend = CpuBackend::new(None);
        let mut state = AgentState::allocate(&backend, 2, &AgentConfig::default()).unwrap();

        state.set_trust(1.7);
        assert_eq!(state.trust_score(), 1.0);
        state.set_trust(-0.2);
        assert_eq!(state.trust_score(), 0.0);

        state.set_integration(0.0);
        assert_eq!(state.integration_param(), INTEGRATION_MIN);
        state.set_integration(5.0);
        assert_eq!(state.integration_param(), INTEGRATION_MAX);
    }

    #[test]
    fn test_replace_vectors_keeps_two_live() {
        let backend = CpuBackend::new(None);
        let mut state = AgentState::allocate(&backend, 2, &AgentConfig::default()).unwrap();
        let old_belief = state.belief();

        let b = backend.allocate(&[0.5; BELIEF_DIM]).unwrap();
        let e = backend.allocate(&[0.3, 0.4]).unwrap();
        state.replace_vectors(&backend, b, e, 0.5);

        assert_eq!(backend.live_allocations(), 2);
        assert!(backend.read(old_belief).is_err());
        assert_eq!(state.previous_emotion_norm(), 0.5);
        assert_eq!(backend.read(state.previous_emotion()).unwrap(), vec![0.3, 0.4]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let backend = CpuBackend::new(None);
        let mut state = AgentState::allocate(&backend, 4, &AgentConfig::default()).unwrap();
        state.release(&backend);
        state.release(&backend);
        assert!(state.is_released());
        assert_eq!(backend.live_allocations(), 0);
    }

    #[test]
    fn test_initial_integration_from_config() {
        let backend = CpuBackend::new(None);
        let config = AgentConfig {
            initial_integration: 0.01,
            ..AgentConfig::default()
        };
        let state = AgentState::allocate(&backend, 1, &config).unwrap();
        assert_eq!(state.integration_param(), INTEGRATION_MIN);
    }
}
