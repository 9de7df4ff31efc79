use std::path::PathBuf;

use shared::ErrorKind;

/// The payload could not be turned into a pixel grid.
#[derive(Debug, thiserror::Error)]
#[error("Error processing image: {0}")]
pub struct DecodeError(pub String);

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Input shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: [usize; 4],
    },
    #[error("Model emitted an invalid score at index {index}: {value}")]
    InvalidScore { index: usize, value: f32 },
    #[error("Model emitted no scores")]
    EmptyOutput,
    #[error("Model execution failed: {0}")]
    Engine(String),
}

/// Failures that keep the process from serving traffic.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Model artifact not found: {0}")]
    ModelMissing(PathBuf),
    #[error("Failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("Failed to read label index {path}: {source}")]
    LabelsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed label index: {0}")]
    LabelsMalformed(String),
    #[error("Model emits {classes} classes but the label index has {labels} entries")]
    LabelCountMismatch { classes: usize, labels: usize },
    #[error("Model output is not a probability distribution: {0}")]
    NotADistribution(String),
    #[error("Probe inference failed: {0}")]
    Probe(#[from] InferenceError),
    #[error("Model registry is already loaded")]
    AlreadyLoaded,
    #[error("Model registry has not been loaded")]
    NotLoaded,
    #[error("Inference engine not available in this build")]
    EngineUnavailable,
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Everything a single classification request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("No image provided")]
    MissingInput,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Failed to stage image: {0}")]
    Staging(#[source] std::io::Error),
    #[error("Error during prediction: {0}")]
    Inference(#[from] InferenceError),
    #[error("No label configured for class index {0}")]
    LabelMapping(usize),
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifyError::MissingInput => ErrorKind::MissingInput,
            ClassifyError::Decode(_) => ErrorKind::DecodeError,
            ClassifyError::Staging(_) => ErrorKind::StagingError,
            ClassifyError::Inference(_) => ErrorKind::InferenceError,
            ClassifyError::LabelMapping(_) => ErrorKind::LabelMappingError,
        }
    }

    /// User errors are the caller's to fix; everything else is ours.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ClassifyError::MissingInput | ClassifyError::Decode(_))
    }

    /// Message safe to hand back to a caller.
    pub fn public_message(&self) -> String {
        match self {
            ClassifyError::MissingInput | ClassifyError::Decode(_) => self.to_string(),
            ClassifyError::Staging(_) => "Failed to save image".to_string(),
            ClassifyError::Inference(_) => "Error during prediction".to_string(),
            ClassifyError::LabelMapping(_) => "Prediction could not be labelled".to_string(),
        }
    }
}
