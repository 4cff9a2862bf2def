use crate::error::{Error, NotFoundError};
use crate::log::HTTP;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

pub const SERVER_ERROR: &str = "Server error";
pub const ENDPOINT_NOT_FOUND: &str = "Endpoint not found";

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Message {
        Message {
            message: message.into(),
        }
    }
}

///
/// Error returned from a handler.
///
/// Client errors carry their own message.
/// Anything else is logged and reported as a generic server error.
///
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<NotFoundError> for ApiError {
    fn from(err: NotFoundError) -> Self {
        ApiError(err.into())
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Authentication(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden { .. } => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);

        let message = if status.is_server_error() {
            error!(target: HTTP, msg = "Request failed", error = self.0.to_string());
            SERVER_ERROR.to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(Message::new(message))).into_response()
    }
}
