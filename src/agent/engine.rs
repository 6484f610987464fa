//! Step engine — one cognitive-state transition per call.
//!
//! ```text
//! x  = concat[belief, prev_emotion, [reward], [context]]      (order is the predictor contract)
//! e  = clip(predict(x), -1, 1)                                (rejected if Err / NaN / ∞ / wrong width)
//! tw = clip(belief * trust, -1, 1)
//! a  = cos(tile(e), tw)                       ι' = clamp(ι + clamp(λ((a+1)/2 - ι), ±0.05), 0.05, 0.95)
//! d  = | ‖e‖ - ‖prev_emotion‖ |               d > threshold → trust decays, else streak → trust recovers
//! b' = clip((1-δ)·tw + λ·(tile(e) + obs - tw), -1, 1)
//! ```
//!
//! `λ` is `belief_learn_rate`, `δ` is `belief_decay`.  While the variance
//! monitor reports `high_variance`, trust decays twice as fast; while it
//! reports `increasing`, belief decay doubles.
//!
//! Every scratch handle is created through a [`ScratchScope`], so the
//! backend holds exactly the two persistent handles between steps, on the
//! error path as well as on commit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, NumericBackend, ScratchScope};
use crate::config::AgentConfig;
use crate::errors::{AgentError, ConfigError};
use crate::monitor::VarianceReading;
use crate::predictor::EmotionPredictor;

use super::state::{AgentSnapshot, AgentState, BELIEF_DIM};

/// Hard bound applied to belief and emotion components.
pub const CLIP_BOUND: f32 = 1.0;

/// Largest change to the integration parameter in a single step.
pub const MAX_INTEGRATION_DELTA: f32 = 0.05;

/// Output of one step, handed to the rendering/driver layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Committed emotion vector (the previous one when `valid` is false).
    pub emotion: Vec<f32>,
    pub trust_score: f32,
    pub integration_param: f32,
    /// False when the prediction was discarded.
    pub valid: bool,
}

/// Why a prediction was discarded.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    NonFiniteInput,
    PredictorFailed(String),
    WrongWidth { expected: usize, actual: usize },
    NonFiniteOutput,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteInput => write!(f, "non-finite reward or context"),
            Self::PredictorFailed(msg) => write!(f, "predictor failed: {}", msg),
            Self::WrongWidth { expected, actual } => {
                write!(f, "predictor returned {} values, expected {}", actual, expected)
            }
            Self::NonFiniteOutput => write!(f, "predictor returned non-finite values"),
        }
    }
}

/// Drives an [`AgentState`] through successive steps.
pub struct StepEngine {
    backend: Arc<dyn NumericBackend>,
    predictor: Box<dyn EmotionPredictor>,
    config: AgentConfig,
    state: AgentState,
    emotion_width: usize,
    usable: bool,
}

impl StepEngine {
    /// Validate the configuration and predictor shape, then allocate state.
    ///
    /// The predictor must accept `64 + output_width + 2` inputs.
    pub fn new(
        config: AgentConfig,
        backend: Arc<dyn NumericBackend>,
        predictor: Box<dyn EmotionPredictor>,
    ) -> Result<Self, AgentError> {
        config.validate()?;

        let emotion_width = predictor.output_width();
        if emotion_width == 0 {
            return Err(ConfigError::Invalid(
                "predictor output width must be at least 1".to_string(),
            )
            .into());
        }
        let expected = predictor.input_width();
        let actual = BELIEF_DIM + emotion_width + 2;
        if expected != actual {
            log::error!(
                "Predictor input width {} does not match step input width {}",
                expected,
                actual
            );
            return Err(AgentError::ShapeMismatch { expected, actual });
        }

        let state = AgentState::allocate(backend.as_ref(), emotion_width, &config)?;
        log::info!(
            "StepEngine ready: belief {} + emotion {} + 2 scalars, trust {:.2}, integration {:.2}",
            BELIEF_DIM,
            emotion_width,
            state.trust_score(),
            state.integration_param()
        );

        Ok(Self {
            backend,
            predictor,
            config,
            state,
            emotion_width,
            usable: true,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn emotion_width(&self) -> usize {
        self.emotion_width
    }

    pub fn trust_score(&self) -> f32 {
        self.state.trust_score()
    }

    pub fn integration_param(&self) -> f32 {
        self.state.integration_param()
    }

    pub fn step_count(&self) -> u64 {
        self.state.step_count()
    }

    /// Latest variance-monitor reading.
    pub fn variance(&self) -> VarianceReading {
        self.state.variance_history().last_reading()
    }

    /// False once a backend fault has occurred.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> Result<AgentSnapshot, AgentError> {
        Ok(self.state.snapshot(self.backend.as_ref())?)
    }

    /// Advance one tick.
    ///
    /// Bad predictions come back as `valid: false`; only backend faults
    /// return `Err`, after which the engine refuses further steps.
    pub fn step(
        &mut self,
        reward: f32,
        context: f32,
        observation: Option<&[f32]>,
    ) -> Result<StepResult, AgentError> {
        if !self.usable {
            return Err(AgentError::EngineUnusable);
        }

        match self.run_step(reward, context, observation) {
            Ok(result) => Ok(result),
            Err(e) => {
                self.usable = false;
                log::error!(
                    "Backend fault at step {}: {}; engine is now unusable",
                    self.state.step_count(),
                    e
                );
                Err(AgentError::Backend(e))
            }
        }
    }

    fn run_step(
        &mut self,
        reward: f32,
        context: f32,
        observation: Option<&[f32]>,
    ) -> Result<StepResult, BackendError> {
        let backend = Arc::clone(&self.backend);
        let mut scope = ScratchScope::new(backend.as_ref());

        if !reward.is_finite() || !context.is_finite() {
            return self.reject(&scope, Rejection::NonFiniteInput);
        }

        // Step input.
        let reward_h = scope.allocate(&[reward])?;
        let context_h = scope.allocate(&[context])?;
        let input_h = scope.concat(&[
            self.state.belief(),
            self.state.previous_emotion(),
            reward_h,
            context_h,
        ])?;
        let input = scope.read(input_h)?;

        // Prediction.
        let predictor = &self.predictor;
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| predictor.predict(&input)));
        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.reject(&scope, Rejection::PredictorFailed(e.to_string())),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log::error!("Predictor panic: {}", msg);
                return self.reject(&scope, Rejection::PredictorFailed(format!("panicked: {}", msg)));
            }
        };
        if raw.len() != self.emotion_width {
            let rejection = Rejection::WrongWidth {
                expected: self.emotion_width,
                actual: raw.len(),
            };
            return self.reject(&scope, rejection);
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return self.reject(&scope, Rejection::NonFiniteOutput);
        }

        let raw_h = scope.allocate(&raw)?;
        let emotion_h = scope.clip(raw_h, -CLIP_BOUND, CLIP_BOUND)?;
        let emotion = scope.read(emotion_h)?;
        let emotion_norm = scope.norm(emotion_h)?;

        // Trust-weighted belief.
        let scaled_h = scope.scale(self.state.belief(), self.state.trust_score())?;
        let trust_weighted_h = scope.clip(scaled_h, -CLIP_BOUND, CLIP_BOUND)?;

        // Integration from agreement between the prediction and weighted belief.
        let tiled_h = scope.allocate(&tile(&emotion, BELIEF_DIM))?;
        let product_h = scope.mul(tiled_h, trust_weighted_h)?;
        let dot: f32 = scope.read(product_h)?.iter().sum();
        let denom = scope.norm(tiled_h)? * scope.norm(trust_weighted_h)?;
        let agreement = if denom > f32::EPSILON {
            (dot / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let integration = self.state.integration_param();
        let integration_delta = (self.config.belief_learn_rate
            * ((agreement + 1.0) / 2.0 - integration))
            .clamp(-MAX_INTEGRATION_DELTA, MAX_INTEGRATION_DELTA);

        // Observed on a copy; the state's monitor is replaced at commit.
        let mut history = self.state.variance_history().clone();
        let reading = history.observe(emotion_norm);

        // Belief blend.
        let decay = if reading.increasing {
            (2.0 * self.config.belief_decay).min(1.0)
        } else {
            self.config.belief_decay
        };
        let observation_h = scope.allocate(&fit_observation(observation, BELIEF_DIM))?;
        let retained_h = scope.scale(trust_weighted_h, 1.0 - decay)?;
        let target_h = scope.add(tiled_h, observation_h)?;
        let negated_h = scope.scale(trust_weighted_h, -1.0)?;
        let error_h = scope.add(target_h, negated_h)?;
        let pull_h = scope.scale(error_h, self.config.belief_learn_rate)?;
        let blended_h = scope.add(retained_h, pull_h)?;
        let belief_h = scope.clip(blended_h, -CLIP_BOUND, CLIP_BOUND)?;

        // Commit: nothing below can fail.
        scope.retain(belief_h);
        scope.retain(emotion_h);
        *self.state.variance_history_mut() = history;

        // Trust.
        let deviation = (emotion_norm - self.state.previous_emotion_norm()).abs();
        if deviation > self.config.trust_deviation_threshold {
            log::debug!(
                "Large emotion deviation {:.3} (threshold {:.3})",
                deviation,
                self.config.trust_deviation_threshold
            );
            self.penalize_trust(reading.high_variance);
        } else {
            let streak = self.state.stable_streak().saturating_add(1);
            self.state.set_stable_streak(streak);
            if streak >= self.config.trust_recovery_streak {
                self.state
                    .set_trust(self.state.trust_score() + self.config.trust_recovery);
            }
        }

        self.state.set_integration(integration + integration_delta);
        self.state
            .replace_vectors(backend.as_ref(), belief_h, emotion_h, emotion_norm);
        self.state.advance();

        log::debug!(
            "step {}: |e|={:.3} agreement={:.3} trust={:.3} integration={:.3} variance={:.4}{}{} scratch={}",
            self.state.step_count(),
            emotion_norm,
            agreement,
            self.state.trust_score(),
            self.state.integration_param(),
            reading.variance_level,
            if reading.high_variance { " [high]" } else { "" },
            if reading.increasing { " [increasing]" } else { "" },
            scope.tracked()
        );

        Ok(StepResult {
            emotion,
            trust_score: self.state.trust_score(),
            integration_param: self.state.integration_param(),
            valid: true,
        })
    }

    /// Discard the prediction: keep both vectors, decay trust, report invalid.
    fn reject(
        &mut self,
        scope: &ScratchScope<'_>,
        rejection: Rejection,
    ) -> Result<StepResult, BackendError> {
        let emotion = scope.read(self.state.previous_emotion())?;

        log::warn!(
            "Step {} rejected: {}; retaining previous state",
            self.state.step_count() + 1,
            rejection
        );
        let high_variance = self.state.variance_history().last_reading().high_variance;
        self.penalize_trust(high_variance);
        self.state.advance();

        Ok(StepResult {
            emotion,
            trust_score: self.state.trust_score(),
            integration_param: self.state.integration_param(),
            valid: false,
        })
    }

    /// Large-deviation trust decay; twice as fast under high variance.
    fn penalize_trust(&mut self, high_variance: bool) {
        let factor = if high_variance { 2.0 } else { 1.0 };
        let decay = (self.config.trust_decay * factor).min(1.0);
        let floor = self.config.trust_floor;
        let trust = self.state.trust_score();
        let decayed = (trust * (1.0 - decay)).max(floor);

        self.state.set_trust(decayed.min(trust));
        self.state.set_stable_streak(0);
        if self.state.trust_score() <= floor && trust > floor {
            log::warn!("Trust collapsed to floor {:.3}", floor);
        }
    }

    /// Release the persistent state.  Also happens on drop.
    pub fn teardown(mut self) {
        self.release_state();
    }

    fn release_state(&mut self) {
        if !self.state.is_released() {
            self.state.release(self.backend.as_ref());
            log::info!(
                "StepEngine torn down after {} steps",
                self.state.step_count()
            );
        }
    }
}

impl Drop for StepEngine {
    fn drop(&mut self) {
        self.release_state();
    }
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("emotion_width", &self.emotion_width)
            .field("state", &self.state)
            .field("usable", &self.usable)
            .finish()
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Repeat `values` cyclically to `width` components (zeros if empty).
fn tile(values: &[f32], width: usize) -> Vec<f32> {
    if values.is_empty() {
        return vec![0.0; width];
    }
    values.iter().copied().cycle().take(width).collect()
}

/// Zero-pad or truncate an observation to `width`; absent or non-finite
/// components become 0.
fn fit_observation(observation: Option<&[f32]>, width: usize) -> Vec<f32> {
    let mut out = vec![0.0; width];
    if let Some(obs) = observation {
        for (slot, v) in out.iter_mut().zip(obs) {
            if v.is_finite() {
                *slot = *v;
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
