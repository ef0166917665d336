//! Error handling for the DataLens Server API
//!
//! Maps the server error taxonomy onto HTTP statuses with the `{error}`
//! payload shape collaborators depend on. None of these terminate the serving
//! process; they terminate the current request only.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::error::ServerError;

impl ServerError {
    /// HTTP status the error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// General error response handler for API errors
pub fn api_error_response(err: &ServerError) -> axum::response::Response {
    let body = Json(json!({
        "error": err.to_string(),
    }));
    (err.status_code(), body).into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        api_error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(
            ServerError::NotFound("File x.csv".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Execution("boom".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServerError::Timeout(5000).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ServerError::Io("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
