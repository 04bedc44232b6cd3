use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dworkers_core::DworkersError;
use tracing::{error, warn};

/// A [`DworkersError`] rendered as `{"error": message}` with a status code
/// chosen by error family.
#[derive(Debug)]
pub struct ApiError(pub DworkersError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            e if e.is_graph_error() => StatusCode::UNPROCESSABLE_ENTITY,
            DworkersError::InvalidState(_) => StatusCode::CONFLICT,
            DworkersError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DworkersError> for ApiError {
    fn from(err: DworkersError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Handler result.
pub type ApiResult<T> = Result<T, ApiError>;
