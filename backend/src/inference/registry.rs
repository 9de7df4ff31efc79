use std::sync::{Arc, OnceLock};

use crate::config::AppConfig;

use super::config::PreprocessingConfig;
use super::error::StartupError;
use super::executor::{self, Classifier};
use super::labels::LabelIndex;
use super::normalizer::NormalizedTensor;

const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

static REGISTRY: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

/// The loaded model and its labels. Immutable once built.
pub struct ModelRegistry {
    model: Arc<dyn Classifier>,
    labels: LabelIndex,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("input_shape", &self.model.input_shape())
            .field("classes", &self.labels.len())
            .finish()
    }
}

impl ModelRegistry {
    /// Loads the model artifact and label index named by `config`.
    pub fn load(
        config: &AppConfig,
        preprocessing: &PreprocessingConfig,
    ) -> Result<Self, StartupError> {
        log::info!("Loading label index from {}", config.class_indices_path.display());
        let labels = LabelIndex::load(&config.class_indices_path)?;
        log::info!("Loading model from {}", config.model_path.display());
        let model = load_engine(config, preprocessing.tensor_shape())?;
        Self::from_parts(model, labels)
    }

    /// Validates that `model` emits one normalized score per label by running
    /// a single probe pass.
    pub fn from_parts(
        model: Arc<dyn Classifier>,
        labels: LabelIndex,
    ) -> Result<Self, StartupError> {
        let probe = NormalizedTensor::zeros(model.input_shape());
        let scores = executor::infer(model.as_ref(), &probe)?;

        if scores.len() != labels.len() {
            return Err(StartupError::LabelCountMismatch {
                classes: scores.len(),
                labels: labels.len(),
            });
        }
        let sum: f32 = scores.iter().sum();
        if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(StartupError::NotADistribution(format!(
                "probe scores sum to {sum}"
            )));
        }

        Ok(Self { model, labels })
    }

    #[cfg(test)]
    pub(crate) fn unchecked(model: Arc<dyn Classifier>, labels: LabelIndex) -> Self {
        Self { model, labels }
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }
}

#[cfg(feature = "torch")]
fn load_engine(
    config: &AppConfig,
    input_shape: [usize; 4],
) -> Result<Arc<dyn Classifier>, StartupError> {
    let model =
        super::torch::TorchClassifier::load(&config.model_path, input_shape, config.score_activation)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
fn load_engine(
    config: &AppConfig,
    _input_shape: [usize; 4],
) -> Result<Arc<dyn Classifier>, StartupError> {
    if !config.model_path.is_file() {
        return Err(StartupError::ModelMissing(config.model_path.clone()));
    }
    Err(StartupError::EngineUnavailable)
}

/// Makes `registry` the process-wide instance. Only the first call succeeds.
pub fn install(registry: ModelRegistry) -> Result<Arc<ModelRegistry>, StartupError> {
    let registry = Arc::new(registry);
    REGISTRY
        .set(registry.clone())
        .map_err(|_| StartupError::AlreadyLoaded)?;
    Ok(registry)
}

/// The installed registry, if startup got that far. Never loads.
pub fn handle() -> Option<Arc<ModelRegistry>> {
    REGISTRY.get().cloned()
}
