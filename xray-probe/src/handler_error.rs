use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failure returned by an instrumented handler.
///
/// Declared errors keep their status and carry structured detail; anything
/// unexpected becomes a 500 whose body is the message as a JSON string.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{status}: {detail}")]
    Declared { status: StatusCode, detail: Value },

    #[error("{0}")]
    Unexpected(String),
}

impl HandlerError {
    pub fn declared(status: StatusCode, detail: impl Into<Value>) -> Self {
        HandlerError::Declared {
            status,
            detail: detail.into(),
        }
    }

    /// Request validation failure: 422 with the list of problems.
    pub fn validation(errors: Vec<Value>) -> Self {
        Self::declared(StatusCode::UNPROCESSABLE_ENTITY, Value::Array(errors))
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        HandlerError::Unexpected(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Declared { status, .. } => *status,
            HandlerError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            HandlerError::Declared { detail, .. } => detail,
            HandlerError::Unexpected(message) => Value::String(message),
        };
        (status, Json(body)).into_response()
    }
}
