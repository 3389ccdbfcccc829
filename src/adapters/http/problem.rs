//! Problem details (RFC 7807) error responses

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::commands::Error;

const UNPROCESSABLE_ENTITY_TYPE: &str = "https://tools.ietf.org/html/rfc4918#section-11.2";
const INTERNAL_SERVER_ERROR_TYPE: &str = "https://tools.ietf.org/html/rfc7231#section-6.6.1";

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub detail: String,
    pub status: u16,
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self),
        )
            .into_response()
    }
}

impl From<&Error> for ProblemDetails {
    fn from(err: &Error) -> Self {
        match err {
            Error::WouldCorruptData { operation, detail } => ProblemDetails {
                kind: UNPROCESSABLE_ENTITY_TYPE,
                title: format!("The operation {operation} would corrupt data."),
                detail: detail.to_string(),
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            },
            // Infrastructure details stay in the logs
            Error::Ledger(_) | Error::InvalidState(_) => ProblemDetails {
                kind: INTERNAL_SERVER_ERROR_TYPE,
                title: "An unexpected error occurred.".to_string(),
                detail: "The request could not be processed.".to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let problem = ProblemDetails::from(&self);
        if problem.status >= 500 {
            error!(error = %self, "request failed");
        }
        problem.into_response()
    }
}
