use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("product \"{name}\" has only {available} of {requested} requested units in stock")]
    InsufficientStock {
        name: String,
        requested: i32,
        available: i32,
    },

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("transaction aborted: {0}")]
    TransactionAbort(String),

    #[error("Database error")]
    Db(#[from] sqlx::Error),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientStock { .. } | AppError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::TransactionAbort(_) | AppError::Db(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let mut data = serde_json::json!({ "error": self.to_string() });
        if let AppError::InsufficientStock { available, .. } = &self {
            data["available"] = serde_json::json!(available);
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(data),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
