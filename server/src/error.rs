use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::{ErrorBody, ErrorCode};

use crate::domain::StorageError;

/// Failure returned by a handler, rendered as an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal<E: std::fmt::Display>(e: &E) -> Self {
        tracing::error!("{e}");
        Self::new(ErrorCode::InternalError, e.to_string())
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let code = e.code();
        if code == ErrorCode::InternalError {
            tracing::error!("storage failure: {e}");
        } else {
            tracing::debug!("request rejected with {code}: {e}");
        }
        Self::new(code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StorageError::ShareNotFound("s1".into()), StatusCode::NOT_FOUND)]
    #[case(StorageError::DirectoryNotEmpty("s1/d1".into()), StatusCode::CONFLICT)]
    #[case(StorageError::InvalidRange { offset: 10, length: 5, file_length: 12 }, StatusCode::RANGE_NOT_SATISFIABLE)]
    #[case(StorageError::NoPendingCopy("s1/f1".into()), StatusCode::CONFLICT)]
    #[case(StorageError::ConditionNotMet { expected: "a".into(), actual: "b".into() }, StatusCode::PRECONDITION_FAILED)]
    #[case(StorageError::QuotaExceeded { quota: 1 }, StatusCode::PAYLOAD_TOO_LARGE)]
    #[case(StorageError::InvalidMetadata("bad".into()), StatusCode::BAD_REQUEST)]
    #[case(StorageError::Io(std::io::Error::other("disk")), StatusCode::INTERNAL_SERVER_ERROR)]
    #[trace]
    fn storage_errors_map_to_status(#[case] error: StorageError, #[case] expected: StatusCode) {
        // Arrange
        let api: ApiError = error.into();

        // Act
        let response = api.into_response();

        // Assert
        assert_eq!(response.status(), expected);
    }
}
