use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures::{StreamExt, TryStreamExt};
use log::{debug, error};
use shared::{ErrorResponse, HealthResponse, PredictionResponse};

use crate::account;
use crate::inference::error::{DecodeError, InferenceError};
use crate::inference::normalizer::RawImage;
use crate::inference::{ClassifyError, Pipeline};

const IMAGE_FIELD: &str = "image";

/// Largest upload accepted for classification, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

impl ResponseError for ClassifyError {
    fn status_code(&self) -> StatusCode {
        if self.is_user_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ErrorResponse::with_kind(self.public_message(), self.kind()))
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/crop-disease/predict/")
            .route(web::post().to(predict_disease))
            .default_service(web::to(method_not_allowed)),
    )
    .service(web::resource("/health").route(web::get().to(health)))
    .configure(account::routes::configure_routes);
}

async fn predict_disease(
    pipeline: web::Data<Pipeline>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, ClassifyError> {
    let image = read_image_field(payload, limit.0).await?;
    let pipeline = pipeline.into_inner();

    let result = web::block(move || pipeline.classify(image))
        .await
        .map_err(|e| {
            error!("Blocking pool failed during classification: {:?}", e);
            ClassifyError::Inference(InferenceError::Engine(e.to_string()))
        })??;

    Ok(HttpResponse::Ok().json(PredictionResponse::from(result)))
}

/// Pulls the `image` field out of the form. A body that is not a readable
/// multipart form counts as no image at all.
async fn read_image_field(
    mut payload: Multipart,
    limit: usize,
) -> Result<Option<RawImage>, ClassifyError> {
    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!("Unreadable multipart body: {}", e);
                return Ok(None);
            }
        };

        if field.name() != Some(IMAGE_FIELD) {
            while let Some(chunk) = field.next().await {
                if chunk.is_err() {
                    return Ok(None);
                }
            }
            continue;
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| DecodeError(format!("upload interrupted: {e}")))?;
            if image_data.len() + data.len() > limit {
                return Err(DecodeError("Image exceeds upload limit".to_string()).into());
            }
            image_data.extend_from_slice(&data);
        }
        return Ok(Some(RawImage::new(image_data)));
    }
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ErrorResponse::new("Only POST requests are allowed"))
}

async fn health(pipeline: web::Data<Pipeline>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        classes: pipeline.registry().labels().len(),
    })
}
