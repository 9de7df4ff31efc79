use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::error::{ClassifyError, InferenceError, StartupError};
use super::executor;
use super::normalizer::{Normalizer, RawImage};
use super::registry::ModelRegistry;
use super::staging::StagingArea;
use super::translator::{self, PredictionResult};

/// Progress of a single request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Staged,
    Normalized,
    Scored,
    Translated,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one upload from raw bytes to a labelled prediction.
///
/// Blocking; run it off the async workers. Nothing in here is shared
/// between requests except the registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<ModelRegistry>,
    normalizer: Normalizer,
    staging: StagingArea,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        normalizer: Normalizer,
        staging: StagingArea,
    ) -> Result<Self, StartupError> {
        let expected = registry.model().input_shape();
        let actual = normalizer.output_shape();
        if expected != actual {
            return Err(StartupError::Probe(InferenceError::ShapeMismatch {
                expected,
                actual,
            }));
        }
        Ok(Self {
            registry,
            normalizer,
            staging,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn classify(&self, payload: Option<RawImage>) -> Result<PredictionResult, ClassifyError> {
        let request_id = Uuid::new_v4();
        let mut stage = Stage::Received;

        match self.run(request_id, payload, &mut stage) {
            Ok(result) => {
                log::info!(
                    "[{}] classified as {} ({:.2}%)",
                    request_id,
                    result.label,
                    result.confidence
                );
                Ok(result)
            }
            Err(err) => {
                if err.is_user_error() {
                    log::warn!("[{}] {}: {}", request_id, failure_summary(stage, &err), err);
                } else {
                    log::error!("[{}] {}: {:?}", request_id, failure_summary(stage, &err), err);
                }
                advance(request_id, &mut stage, Stage::Failed);
                Err(err)
            }
        }
    }

    fn run(
        &self,
        request_id: Uuid,
        payload: Option<RawImage>,
        stage: &mut Stage,
    ) -> Result<PredictionResult, ClassifyError> {
        let raw = payload
            .filter(|raw| !raw.is_empty())
            .ok_or(ClassifyError::MissingInput)?;

        // Dropped on every exit from this function, success or not.
        let staged = self.staging.stage(raw)?;
        advance(request_id, stage, Stage::Staged);

        let tensor = staged.normalize(&self.normalizer)?;
        advance(request_id, stage, Stage::Normalized);

        let scores = executor::infer(self.registry.model(), &tensor)?;
        advance(request_id, stage, Stage::Scored);

        let result = translator::translate(&scores, self.registry.labels())?;
        advance(request_id, stage, Stage::Translated);

        drop(staged);
        advance(request_id, stage, Stage::Completed);
        Ok(result)
    }
}

/// `stage` is the last step that completed, not the one that failed.
fn failure_summary(stage: Stage, err: &ClassifyError) -> String {
    let kind = err.kind();
    let kind: &str = kind.as_ref();
    format!("{kind} after {stage}")
}

fn advance(request_id: Uuid, stage: &mut Stage, next: Stage) {
    log::debug!("[{}] {} -> {}", request_id, stage, next);
    *stage = next;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::config::PreprocessingConfig;
    use crate::inference::executor::tests::FixedClassifier;
    use crate::inference::labels::LabelIndex;
    use crate::inference::normalizer::tests::sample_jpeg;

    pub(crate) fn pipeline_with(
        scores: Vec<f32>,
        staging: StagingArea,
    ) -> (Pipeline, Arc<FixedClassifier>) {
        let model = Arc::new(FixedClassifier::new(scores));
        let labels = LabelIndex::from_json(r#"{"0": "Healthy", "1": "Rust"}"#).unwrap();
        let registry = Arc::new(ModelRegistry::from_parts(model.clone(), labels).unwrap());
        let pipeline = Pipeline::new(
            registry,
            Normalizer::new(PreprocessingConfig::default()),
            staging,
        )
        .unwrap();
        (pipeline, model)
    }

    #[test]
    fn classifies_jpeg_end_to_end() {
        let (pipeline, _) = pipeline_with(vec![0.2, 0.8], StagingArea::Memory);
        let result = pipeline
            .classify(Some(RawImage::new(sample_jpeg(320, 240))))
            .unwrap();
        assert_eq!(
            result,
            PredictionResult {
                label: "Rust".to_string(),
                confidence: 80.0,
                class_index: 1,
            }
        );
    }

    #[test]
    fn tie_reports_lowest_index() {
        let (pipeline, _) = pipeline_with(vec![0.5, 0.5], StagingArea::Memory);
        let result = pipeline
            .classify(Some(RawImage::new(sample_jpeg(50, 80))))
            .unwrap();
        assert_eq!(result.label, "Healthy");
        assert_eq!(result.confidence, 50.0);
        assert_eq!(result.class_index, 0);
    }

    #[test]
    fn missing_payload_skips_the_model() {
        let (pipeline, model) = pipeline_with(vec![0.2, 0.8], StagingArea::Memory);
        let probe_calls = model.calls();

        let err = pipeline.classify(None).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingInput));
        let err = pipeline.classify(Some(RawImage::new(Vec::new()))).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingInput));
        assert_eq!(model.calls(), probe_calls);
    }

    #[test]
    fn corrupt_payload_skips_the_model() {
        let (pipeline, model) = pipeline_with(vec![0.2, 0.8], StagingArea::Memory);
        let probe_calls = model.calls();

        let err = pipeline
            .classify(Some(RawImage::new(b"definitely not a jpeg".to_vec())))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(_)));
        assert!(err.is_user_error());
        assert_eq!(model.calls(), probe_calls);
    }

    #[test]
    fn disk_staging_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) =
            pipeline_with(vec![0.2, 0.8], StagingArea::Disk(dir.path().to_path_buf()));

        for _ in 0..3 {
            pipeline
                .classify(Some(RawImage::new(sample_jpeg(64, 48))))
                .unwrap();
            pipeline
                .classify(Some(RawImage::new(b"\xff\xd8\xffbroken".to_vec())))
                .unwrap_err();
            pipeline.classify(None).unwrap_err();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn model_failure_after_staging_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FixedClassifier::new(vec![0.2, 0.8]));
        // One label short; from_parts would refuse this at startup.
        let short_labels = LabelIndex::from_json(r#"{"0": "Healthy"}"#).unwrap();
        let registry = Arc::new(ModelRegistry::unchecked(model, short_labels));
        let pipeline = Pipeline::new(
            registry,
            Normalizer::new(PreprocessingConfig::default()),
            StagingArea::Disk(dir.path().to_path_buf()),
        )
        .unwrap();

        let err = pipeline
            .classify(Some(RawImage::new(sample_jpeg(32, 32))))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::LabelMapping(1)));
        assert!(!err.is_user_error());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_normalizer_model_shape_mismatch() {
        let model = Arc::new(FixedClassifier::new(vec![0.2, 0.8]));
        let labels = LabelIndex::from_json(r#"{"0": "Healthy", "1": "Rust"}"#).unwrap();
        let registry = Arc::new(ModelRegistry::from_parts(model, labels).unwrap());
        let mut config = PreprocessingConfig::default();
        config.image.size = [256, 256];
        let err = Pipeline::new(registry, Normalizer::new(config), StagingArea::Memory).unwrap_err();
        assert!(matches!(err, StartupError::Probe(InferenceError::ShapeMismatch { .. })));
    }

    #[test]
    fn failure_summary_names_kind_and_last_completed_stage() {
        let err = ClassifyError::Decode(crate::inference::error::DecodeError("bad header".into()));
        assert_eq!(failure_summary(Stage::Staged, &err), "decode_error after Staged");
        assert_eq!(
            failure_summary(Stage::Received, &ClassifyError::MissingInput),
            "missing_input after Received"
        );
        assert_eq!(
            failure_summary(Stage::Scored, &ClassifyError::LabelMapping(7)),
            "label_mapping_error after Scored"
        );
    }

    #[test]
    fn concurrent_requests_share_one_pipeline() {
        let (pipeline, model) = pipeline_with(vec![0.1, 0.9], StagingArea::Memory);
        let probe_calls = model.calls();
        let inputs = [(64, 48), (300, 200), (17, 91), (224, 224)];

        std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|&(width, height)| {
                    let pipeline = &pipeline;
                    scope.spawn(move || {
                        (0..3)
                            .map(|_| {
                                pipeline.classify(Some(RawImage::new(sample_jpeg(width, height))))
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for handle in handles {
                for result in handle.join().unwrap() {
                    let result = result.unwrap();
                    assert_eq!(result.label, "Rust");
                    assert_eq!(result.confidence, 90.0);
                    assert_eq!(result.class_index, 1);
                }
            }
        });
        assert_eq!(model.calls(), probe_calls + inputs.len() * 3);
    }
}
