use std::str::FromStr;

use super::error::InferenceError;
use super::normalizer::NormalizedTensor;

/// A loaded model that can run a forward pass.
///
/// Implementations must be safe to share across request threads. Engines
/// that cannot run simultaneous forward passes serialize internally.
pub trait Classifier: Send + Sync {
    /// Shape of the single input tensor, `[1, height, width, 3]`.
    fn input_shape(&self) -> [usize; 4];

    /// Raw per-class scores for one input.
    fn forward(&self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Declares how raw model output maps onto class probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreActivation {
    /// The output layer already emits a normalized distribution.
    #[default]
    None,
    /// The output layer emits logits.
    Softmax,
}

impl FromStr for ScoreActivation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "probabilities" => Ok(ScoreActivation::None),
            "softmax" | "logits" => Ok(ScoreActivation::Softmax),
            other => Err(format!("unknown score activation: {other}")),
        }
    }
}

/// Runs one forward pass and checks that what comes back is usable.
pub fn infer(
    model: &dyn Classifier,
    tensor: &NormalizedTensor,
) -> Result<Vec<f32>, InferenceError> {
    let expected = model.input_shape();
    let actual = tensor.shape();
    if expected != actual {
        return Err(InferenceError::ShapeMismatch { expected, actual });
    }

    let scores = model.forward(tensor)?;
    if scores.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    if let Some((index, &value)) = scores
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(InferenceError::InvalidScore { index, value });
    }
    Ok(scores)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same scores for every input and counts its calls.
    pub(crate) struct FixedClassifier {
        pub shape: [usize; 4],
        pub scores: Vec<f32>,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub(crate) fn new(scores: Vec<f32>) -> Self {
            Self {
                shape: [1, 224, 224, 3],
                scores,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for FixedClassifier {
        fn input_shape(&self) -> [usize; 4] {
            self.shape
        }

        fn forward(&self, _input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    #[test]
    fn passes_scores_through() {
        let model = FixedClassifier::new(vec![0.2, 0.8]);
        let scores = infer(&model, &NormalizedTensor::zeros([1, 224, 224, 3])).unwrap();
        assert_eq!(scores, vec![0.2, 0.8]);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn shape_mismatch_never_reaches_the_model() {
        let model = FixedClassifier::new(vec![1.0]);
        let err = infer(&model, &NormalizedTensor::zeros([1, 128, 128, 3])).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn rejects_negative_and_nan_scores() {
        let input = NormalizedTensor::zeros([1, 224, 224, 3]);
        let err = infer(&FixedClassifier::new(vec![0.5, -0.1]), &input).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidScore { index: 1, .. }));
        let err = infer(&FixedClassifier::new(vec![f32::NAN, 0.5]), &input).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidScore { index: 0, .. }));
        let err = infer(&FixedClassifier::new(vec![]), &input).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyOutput));
    }

    #[test]
    fn parses_activation() {
        assert_eq!("softmax".parse::<ScoreActivation>(), Ok(ScoreActivation::Softmax));
        assert_eq!("None".parse::<ScoreActivation>(), Ok(ScoreActivation::None));
        assert!("relu".parse::<ScoreActivation>().is_err());
    }
}
