//! Dense `tanh` predictor.
//!
//! One fully-connected layer, `y = tanh(W·x + b)`.  Weights are either drawn
//! from a seeded RNG (uniform in `±1/√input_width`) or loaded from a JSON
//! weight file produced by an external trainer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, PredictorError};

use super::EmotionPredictor;

/// Single-layer predictor with `tanh` activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensePredictor {
    input_width: usize,
    /// Row-major `[output_width][input_width]`.
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl DensePredictor {
    /// Seeded random initialization.
    pub fn seeded(input_width: usize, output_width: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (input_width.max(1) as f32).sqrt();
        let weights = (0..output_width)
            .map(|_| {
                (0..input_width)
                    .map(|_| rng.gen_range(-bound..=bound))
                    .collect()
            })
            .collect();

        log::debug!(
            "DensePredictor initialized: {} inputs -> {} outputs (seed {})",
            input_width,
            output_width,
            seed
        );

        Self {
            input_width,
            weights,
            bias: vec![0.0; output_width],
        }
    }

    /// Build from explicit weights.  Every row must be `input_width` long and
    /// `bias` must have one entry per row.
    pub fn from_weights(
        input_width: usize,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self, AgentError> {
        if let Some(row) = weights.iter().find(|row| row.len() != input_width) {
            return Err(AgentError::ShapeMismatch {
                expected: input_width,
                actual: row.len(),
            });
        }
        if bias.len() != weights.len() {
            return Err(AgentError::ShapeMismatch {
                expected: weights.len(),
                actual: bias.len(),
            });
        }
        Ok(Self {
            input_width,
            weights,
            bias,
        })
    }

    /// Load weights serialized as JSON (`{"input_width", "weights", "bias"}`).
    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let raw: DensePredictor =
            serde_json::from_str(json).map_err(crate::errors::ConfigError::from)?;
        Self::from_weights(raw.input_width, raw.weights, raw.bias)
    }
}

impl EmotionPredictor for DensePredictor {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn output_width(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, PredictorError> {
        if input.len() != self.input_width {
            return Err(PredictorError::Failed(format!(
                "expected {} inputs, got {}",
                self.input_width,
                input.len()
            )));
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                (z + b).tanh()
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_deterministic() {
        let a = DensePredictor::seeded(8, 3, 42);
        let b = DensePredictor::seeded(8, 3, 42);
        let input = [0.5; 8];
        assert_eq!(a.predict(&input).unwrap(), b.predict(&input).unwrap());
    }

    #[test]
    fn test_output_is_bounded() {
        let p = DensePredictor::seeded(4, 6, 1);
        let out = p.predict(&[1e6, -1e6, 1e6, 3.0]).unwrap();
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|v| v.is_finite() && (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_explicit_weights() {
        let p = DensePredictor::from_weights(2, vec![vec![1.0, 0.0], vec![0.0, 0.0]], vec![0.0, 0.5])
            .unwrap();
        let out = p.predict(&[0.0, 9.0]).unwrap();
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_bad_weight_shape_rejected() {
        let err = DensePredictor::from_weights(3, vec![vec![1.0, 2.0]], vec![0.0]).unwrap_err();
        assert!(matches!(
            err,
            AgentError::ShapeMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_wrong_input_length_is_prediction_failure() {
        let p = DensePredictor::seeded(4, 2, 0);
        assert!(p.predict(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_json_weights_roundtrip() {
        let p = DensePredictor::seeded(3, 2, 9);
        let json = serde_json::to_string(&p).unwrap();
        let loaded = DensePredictor::from_json(&json).unwrap();
        assert_eq!(loaded.output_width(), 2);
        assert_eq!(
            loaded.predict(&[0.1, 0.2, 0.3]).unwrap(),
            p.predict(&[0.1, 0.2, 0.3]).unwrap()
        );
    }
}
