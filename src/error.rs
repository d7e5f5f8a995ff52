use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{HttpResponse, ResponseError, error::BlockingError, http::StatusCode};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

const SERVER_ERROR_MESSAGE: &str = "Terjadi kesalahan pada server";

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Development mode appends the underlying cause of server errors to the
/// response body.
pub fn expose_error_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Data yang dikirim tidak valid")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Blocking task failed: {0}")]
    Blocking(#[from] BlockingError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Gives a server-side failure the localized message of the operation
    /// that hit it. Client errors pass through unchanged.
    pub fn context(self, message: impl Into<String>) -> Self {
        if self.status_code().is_server_error() {
            ApiError::Failed {
                message: message.into(),
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Database(DieselError::NotFound) => "Data tidak ditemukan".to_string(),
            ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                _,
            )) => "Data tidak bisa diproses karena masih memiliki data terkait".to_string(),
            ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => "Data sudah terdaftar".to_string(),
            ApiError::Database(_)
            | ApiError::Pool(_)
            | ApiError::Blocking(_)
            | ApiError::Internal(_) => SERVER_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Failed { source, .. } => Some(source.to_string()),
            ApiError::Database(_)
            | ApiError::Pool(_)
            | ApiError::Blocking(_)
            | ApiError::Internal(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Database(DieselError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation | DatabaseErrorKind::UniqueViolation,
                _,
            )) => StatusCode::BAD_REQUEST,
            ApiError::Failed { source, .. } => source.status_code(),
            ApiError::Database(_)
            | ApiError::Pool(_)
            | ApiError::Blocking(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, "{}", self.public_message());
        }

        let mut body = json!({
            "success": false,
            "message": self.public_message(),
        });

        if let ApiError::Validation(errors) = self {
            body["errors"] = json!(errors);
        }

        if status.is_server_error() && EXPOSE_DETAILS.load(Ordering::Relaxed) {
            if let Some(detail) = self.detail() {
                body["error"] = json!(detail);
            }
        }

        HttpResponse::build(status).json(body)
    }
}

/// Attaches a localized operation message to server-side failures.
pub trait ResultExt<T> {
    fn context(self, message: &str) -> Result<T, ApiError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ApiError>,
{
    fn context(self, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            let err: ApiError = e.into();
            err.context(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn validation_errors_list_fields() {
        let (status, body) = body_of(ApiError::Validation(vec![FieldError::new(
            "email",
            "Email tidak valid",
        )]))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0]["field"], "email");
        assert_eq!(body["errors"][0]["message"], "Email tidak valid");
    }

    #[actix_web::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_of(ApiError::forbidden("Token tidak valid")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Token tidak valid");
        assert!(body.get("error").is_none());
    }

    #[actix_web::test]
    async fn server_errors_use_operation_message() {
        let err = ApiError::from(anyhow::anyhow!("socket closed")).context("Gagal mengambil data user");
        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Gagal mengambil data user");
    }

    #[actix_web::test]
    async fn context_leaves_client_errors_alone() {
        let err = ApiError::not_found("User tidak ditemukan").context("Gagal mengambil data user");
        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User tidak ditemukan");
    }

    #[actix_web::test]
    async fn diesel_not_found_maps_to_404() {
        let (status, _) = body_of(ApiError::from(DieselError::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
