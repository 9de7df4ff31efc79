use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use shared::{ErrorResponse, ResetPasswordRequest, ResetPasswordResponse, VerifyTokenResponse};

use super::token_store::{AccountError, TokenStore};

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/account/password-reset/verify/").route(web::get().to(verify_reset_token)),
    )
    .service(
        web::resource("/account/password-reset/confirm/").route(web::post().to(confirm_reset)),
    );
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(message))
}

fn internal_error(err: AccountError) -> HttpResponse {
    log::error!("Password reset failed: {:?}", err);
    HttpResponse::InternalServerError().json(ErrorResponse::new("An error occurred"))
}

pub async fn verify_reset_token(
    store: web::Data<dyn TokenStore>,
    query: web::Query<VerifyQuery>,
) -> HttpResponse {
    let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) else {
        return bad_request("Invalid reset link. No token provided.");
    };

    let record = match store.lookup(token) {
        Ok(record) => record,
        Err(AccountError::NotFound) => {
            return bad_request("Invalid reset link. Please request a new password reset.");
        }
        Err(e) => return internal_error(e),
    };

    if record.is_expired(Utc::now()) {
        return bad_request("This reset link has expired. Please request a new password reset.");
    }
    if record.used {
        return bad_request(
            "This reset link has already been used. Please request a new password reset.",
        );
    }

    match store.account_email(record.account_id) {
        Ok(email) => HttpResponse::Ok().json(VerifyTokenResponse { valid: true, email }),
        Err(e) => internal_error(e),
    }
}

pub async fn confirm_reset(store: web::Data<dyn TokenStore>, body: web::Bytes) -> HttpResponse {
    let request: ResetPasswordRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::debug!("Unparseable reset request: {}", e);
            return bad_request("Invalid request body");
        }
    };

    let (Some(token), Some(new_password)) = (
        request.token.filter(|t| !t.is_empty()),
        request.new_password.filter(|p| !p.is_empty()),
    ) else {
        return bad_request("Token and new password are required");
    };

    if let Err(e) = store.lookup(&token) {
        return match e {
            AccountError::NotFound => bad_request("Invalid token"),
            other => internal_error(other),
        };
    }

    match store.consume(&token, &new_password) {
        Ok(()) => HttpResponse::Ok().json(ResetPasswordResponse {
            success: "Password reset successfully".to_string(),
        }),
        Err(AccountError::Expired | AccountError::AlreadyUsed) => {
            bad_request("Invalid or expired token")
        }
        Err(AccountError::NotFound) => bad_request("Invalid token"),
        Err(e @ AccountError::WeakPassword) => bad_request(&e.to_string()),
        Err(e) => internal_error(e),
    }
}
