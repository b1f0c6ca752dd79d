use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("The resource you're looking for can't be found.")]
    NotFound,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Upstream(String),

    #[error("An unexpected error has occurred on the server.")]
    Unexpected(#[from] anyhow::Error),
}

/// Attached to error responses so `render_errors` can re-render them as HTML
/// or JSON once the request path is known.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::UNAUTHORIZED,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unexpected(e) => error!("Unexpected error: {:?}", e),
            AppError::Upstream(message) => warn!("OAuth provider error: {}", message),
            _ => {}
        }

        let report = ErrorReport {
            status: self.status(),
            message: self.to_string(),
        };

        let mut response = (report.status, report.message.clone()).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
