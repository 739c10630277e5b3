use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::users::repo::RepoError;

/// Per-field validation messages, serialized as `{ "field": ["msg", ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed on {} field(s)", .0.fields().count())]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self) {
        match self {
            AppError::Validation(errors) => {
                let fields: Vec<_> = errors.fields().collect();
                warn!(?fields, "validation rejected request");
            }
            AppError::BadRequest(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => {
                warn!(message = %msg, "request rejected");
            }
            AppError::Database(e) => error!(error = ?e, "database error"),
            AppError::Internal(e) => error!(error = ?e, "internal error"),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Duplicate(field) => AppError::Conflict(field.conflict_message().into()),
            RepoError::Database(e) => AppError::Database(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<M: Serialize> {
    success: bool,
    message: M,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.log();

        match self {
            AppError::Validation(errors) => (
                status,
                Json(ErrorBody {
                    success: false,
                    message: errors,
                }),
            )
                .into_response(),
            AppError::BadRequest(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => (
                status,
                Json(ErrorBody {
                    success: false,
                    message: msg,
                }),
            )
                .into_response(),
            // Storage and internal failures stay opaque to the caller
            AppError::Database(_) | AppError::Internal(_) => (
                status,
                Json(ErrorBody {
                    success: false,
                    message: "An unexpected error occurred",
                }),
            )
                .into_response(),
        }
    }
}
