use std::path::Path;
use std::sync::Mutex;

use tch::{CModule, Device, Kind, Tensor};

use super::error::{InferenceError, StartupError};
use super::executor::{Classifier, ScoreActivation};
use super::normalizer::NormalizedTensor;

/// TorchScript classifier. Forward passes are serialized behind the mutex;
/// callers normalize their inputs before taking it.
///
/// The exported module must take a single NHWC float tensor,
/// `[1, height, width, 3]`, already normalized the way the Keras backbone
/// expects (caffe mode by default: BGR, ImageNet means subtracted, no
/// scaling). A stock PyTorch export takes NCHW and will fail the load-time
/// check. It must return one score per class, either probabilities or,
/// with `ScoreActivation::Softmax`, logits.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
    input_shape: [usize; 4],
    activation: ScoreActivation,
}

impl TorchClassifier {
    pub fn load(
        model_path: &Path,
        input_shape: [usize; 4],
        activation: ScoreActivation,
    ) -> Result<Self, StartupError> {
        if !model_path.is_file() {
            return Err(StartupError::ModelMissing(model_path.to_path_buf()));
        }
        let device = Device::cuda_if_available();
        let mut model =
            CModule::load_on_device(model_path, device).map_err(|e| StartupError::ModelLoad {
                path: model_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        model.set_eval();
        log::info!("Loaded TorchScript model on {:?}", device);
        Ok(Self {
            model: Mutex::new(model),
            device,
            input_shape,
            activation,
        })
    }
}

impl Classifier for TorchClassifier {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn forward(&self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_slice(&input.to_vec())
            .view(dims.as_slice())
            .to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Engine("model lock poisoned".to_string()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Engine(e.to_string()))?
        };

        Ok(to_scores(&output, self.activation))
    }
}

fn to_scores(output: &Tensor, activation: ScoreActivation) -> Vec<f32> {
    let output = match activation {
        ScoreActivation::None => output.to_kind(Kind::Float),
        ScoreActivation::Softmax => output.softmax(-1, Kind::Float),
    };
    let output_flat = output.to_device(Device::Cpu).view([-1]);
    let num_elements = output_flat.size()[0] as usize;
    let mut output_vec = vec![0.0f32; num_elements];
    output_flat.copy_data(&mut output_vec, num_elements);
    output_vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_turns_logits_into_a_distribution() {
        let logits = Tensor::from_slice(&[1.0f32, 2.0, 3.0]).view([1, 3]);
        let probs = to_scores(&logits, ScoreActivation::Softmax);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn probabilities_pass_through() {
        let output = Tensor::from_slice(&[0.25f32, 0.75]).view([1, 2]);
        assert_eq!(to_scores(&output, ScoreActivation::None), vec![0.25, 0.75]);
    }

    #[test]
    fn missing_model_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = TorchClassifier::load(
            &dir.path().join("model.pt"),
            [1, 224, 224, 3],
            ScoreActivation::None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, StartupError::ModelMissing(_)));
    }
}
