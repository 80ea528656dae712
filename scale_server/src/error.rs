//! Error taxonomy for the HTTP surface (spec §7), each with an
//! `actix_web::ResponseError` impl so a handler can simply `?` out of its
//! body and let the framework pick the status code and JSON shape.
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown device")]
    UnknownDevice,
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ResponseError for IngestError {
    fn status_code(&self) -> StatusCode {
        match self {
            IngestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::Registry(RegistryError::UnknownDevice) => StatusCode::NOT_FOUND,
            IngestError::Registry(RegistryError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            IngestError::Registry(RegistryError::Db(_)) | IngestError::Db(_) | IngestError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            IngestError::Unauthorized => "Unauthorized".to_string(),
            IngestError::Registry(RegistryError::UnknownDevice) => "unknown device".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ResponseError for WorkerError {
    fn status_code(&self) -> StatusCode {
        match self {
            WorkerError::Unauthorized => StatusCode::UNAUTHORIZED,
            WorkerError::Config(_) | WorkerError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            WorkerError::Unauthorized => "Unauthorized".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
