use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::repo::RepoError;

/// One entry of the `errors` array returned on 4xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl FieldError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self { msg: msg.into(), param: None, location: None }
    }
    pub fn body(param: &str, msg: impl Into<String>) -> Self {
        Self { msg: msg.into(), param: Some(param.to_string()), location: Some("body".into()) }
    }
    pub fn query(param: &str, msg: impl Into<String>) -> Self {
        Self { msg: msg.into(), param: Some(param.to_string()), location: Some("query".into()) }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub errors: Vec<FieldError>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("validation failed")] Validation(Vec<FieldError>),
    #[error("Invalid Credentials")] InvalidCredentials,
    #[error("User already exists")] UserExists,
    #[error("{0}")] Unauthorized(&'static str),
    #[error("Server error")] Internal,
}

impl ApiError {
    /// Logs `cause` and returns the opaque 500 variant.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "request failed");
        ApiError::Internal
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => ApiError::UserExists,
            other => ApiError::internal(other),
        }
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        ApiError::internal(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) | ApiError::InvalidCredentials | ApiError::UserExists => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let errors = match self {
            ApiError::Validation(errors) => errors.clone(),
            ApiError::Internal => {
                return HttpResponse::build(self.status_code())
                    .content_type("text/plain; charset=utf-8")
                    .body(self.to_string());
            }
            other => vec![FieldError::message(other.to_string())],
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { errors })
    }
}
