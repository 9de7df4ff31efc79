use serde::Serialize;
use shared::PredictionResponse;

use super::error::ClassifyError;
use super::labels::LabelIndex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub confidence: f64,
    pub class_index: usize,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        PredictionResponse {
            disease_name: result.label,
            confidence: result.confidence,
            class_label: result.class_index,
        }
    }
}

/// Index of the highest score; the first one wins a tie.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

pub fn confidence_percent(score: f32) -> f64 {
    let percent = (score as f64 * 100.0).clamp(0.0, 100.0);
    (percent * 100.0).round() / 100.0
}

pub fn translate(scores: &[f32], labels: &LabelIndex) -> Result<PredictionResult, ClassifyError> {
    let class_index = argmax(scores).ok_or(ClassifyError::LabelMapping(0))?;
    let label = labels
        .get(class_index)
        .ok_or(ClassifyError::LabelMapping(class_index))?;

    Ok(PredictionResult {
        label: label.to_string(),
        confidence: confidence_percent(scores[class_index]),
        class_index,
    })
}
