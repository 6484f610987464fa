//! Emotion predictors — the function approximator behind each step.
//!
//! A predictor is an opaque strategy with a declared shape contract: it
//! consumes exactly [`EmotionPredictor::input_width`] values and produces
//! [`EmotionPredictor::output_width`] values.  The step engine checks the
//! input width once at construction and treats everything the predictor
//! returns as untrusted.
//!
//! Provided strategies:
//!
//! | Type | Use |
//! |---|---|
//! | [`DensePredictor`] | seeded single-layer `tanh` approximator |
//! | [`FnPredictor`] | wrap any closure (stubs, external models) |
//! | [`ConstantPredictor`] | fixed output, ignores input |

pub mod dense;

use crate::errors::PredictorError;

pub use dense::DensePredictor;

/// Strategy interface for producing an emotion estimate from a step input.
///
/// Implementations hold no per-call hidden state the core relies on.
pub trait EmotionPredictor: Send + Sync {
    /// Number of values `predict` expects.
    fn input_width(&self) -> usize;

    /// Number of values `predict` returns.
    fn output_width(&self) -> usize;

    /// Produce a raw emotion estimate.
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, PredictorError>;
}

/// Closure signature wrapped by [`FnPredictor`].
pub type PredictFn = Box<dyn Fn(&[f32]) -> Result<Vec<f32>, PredictorError> + Send + Sync>;

/// Predictor backed by a closure.
pub struct FnPredictor {
    input_width: usize,
    output_width: usize,
    f: PredictFn,
}

impl FnPredictor {
    /// Wrap `f` with the given shape contract.
    pub fn new(
        input_width: usize,
        output_width: usize,
        f: impl Fn(&[f32]) -> Result<Vec<f32>, PredictorError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            input_width,
            output_width,
            f: Box::new(f),
        }
    }
}

impl std::fmt::Debug for FnPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredictor")
            .field("input_width", &self.input_width)
            .field("output_width", &self.output_width)
            .finish()
    }
}

impl EmotionPredictor for FnPredictor {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, PredictorError> {
        (self.f)(input)
    }
}

/// Predictor that always returns the same vector.
#[derive(Debug, Clone)]
pub struct ConstantPredictor {
    input_width: usize,
    output: Vec<f32>,
}

impl ConstantPredictor {
    pub fn new(input_width: usize, output: Vec<f32>) -> Self {
        Self {
            input_width,
            output,
        }
    }
}

impl EmotionPredictor for ConstantPredictor {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn output_width(&self) -> usize {
        self.output.len()
    }

    fn predict(&self, _input: &[f32]) -> Result<Vec<f32>, PredictorError> {
        Ok(self.output.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_predictor_delegates() {
        let p = FnPredictor::new(3, 1, |input| Ok(vec![input.iter().sum()]));
        assert_eq!(p.input_width(), 3);
        assert_eq!(p.output_width(), 1);
        assert_eq!(p.predict(&[1.0, 2.0, 3.0]).unwrap(), vec![6.0]);
    }

    #[test]
    fn test_fn_predictor_propagates_failure() {
        let p = FnPredictor::new(1, 1, |_| Err(PredictorError::Failed("offline".into())));
        assert_eq!(
            p.predict(&[0.0]),
            Err(PredictorError::Failed("offline".into()))
        );
    }

    #[test]
    fn test_constant_predictor_width_from_output() {
        let p = ConstantPredictor::new(10, vec![0.1, 0.2, 0.3]);
        assert_eq!(p.output_width(), 3);
        assert_eq!(p.predict(&[0.0; 10]).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_predictors_are_object_safe() {
        let boxed: Vec<Box<dyn EmotionPredictor>> = vec![
            Box::new(ConstantPredictor::new(2, vec![0.0])),
            Box::new(FnPredictor::new(2, 1, |_| Ok(vec![1.0]))),
        ];
        assert!(boxed.iter().all(|p| p.output_width() == 1));
    }
}
