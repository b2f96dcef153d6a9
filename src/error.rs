use poem::{error::ResponseError, http::StatusCode};

use crate::models::TaskStatus;

#[derive(thiserror::Error, Debug)]
pub enum ReviewError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("upstream request failed ({}): {message}", describe_status(.status))]
    Upstream { status: Option<u16>, message: String },
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
    #[error("inference request failed: {0}")]
    Inference(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("queue error: {0}")]
    Queue(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "transport".to_string(),
    }
}

impl ReviewError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReviewError::NotFound(_))
    }
}

impl From<lapin::Error> for ReviewError {
    fn from(err: lapin::Error) -> Self {
        ReviewError::Queue(err.to_string())
    }
}

impl ResponseError for ReviewError {
    fn status(&self) -> StatusCode {
        match self {
            ReviewError::Validation(_) | ReviewError::Upstream { .. } => StatusCode::BAD_REQUEST,
            ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::Conflict(_) | ReviewError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
