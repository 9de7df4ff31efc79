use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

/// Body returned by a successful classification.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub disease_name: String,
    pub confidence: f64,
    pub class_label: usize,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    DecodeError,
    StagingError,
    InferenceError,
    LabelMappingError,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<ErrorKind>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    pub fn with_kind(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            error: error.into(),
            kind: Some(kind),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub classes: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResetPasswordResponse {
    pub success: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub email: String,
}
