use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tagstream::TranscodeError;
use tracing::error;

/// A custom error type for the server application.
///
/// Only failures that happen before the response head is committed end up
/// here; once a body is streaming, errors are logged by the transcoder.
pub enum AppError {
    /// The catalog tool could not be started.
    Startup(TranscodeError),
}

/// Conversion from `TranscodeError` to `AppError`.
impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        AppError::Startup(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Startup(err) => {
                error!("Catalog tool startup failed: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        // Plain text, unlike the JSON success body.
        (status_code, error_message).into_response()
    }
}
