use std::time::Duration;

use kernel::{ErrorBody, ErrorCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Code reported for failures that never reached the service.
pub const TRANSPORT_ERROR: &str = "TransportError";

/// Every failure a facade operation can end with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// The copy already left the pending state; an abort came too late.
    #[error("no pending copy: {0}")]
    NoPendingCopy(String),
    #[error("copy {copy_id} still pending after {waited:?}")]
    CopyTimedOut { copy_id: String, waited: Duration },
    #[error("local I/O error on {context}: {source}")]
    LocalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remote service error {code} (status {status:?}): {message}")]
    RemoteService {
        status: Option<u16>,
        code: String,
        message: String,
    },
}

impl Error {
    pub(crate) fn local_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::LocalIo {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn transport(e: &reqwest::Error) -> Self {
        Error::RemoteService {
            status: e.status().map(|s| s.as_u16()),
            code: TRANSPORT_ERROR.to_owned(),
            message: e.to_string(),
        }
    }

    /// Classifies an error response of the service.
    pub(crate) fn from_service(status: u16, body: ErrorBody) -> Self {
        let message = body.message;
        match body.code {
            ErrorCode::ShareAlreadyExists | ErrorCode::ResourceAlreadyExists => {
                Error::AlreadyExists(message)
            }
            ErrorCode::ShareNotFound | ErrorCode::ResourceNotFound | ErrorCode::ParentNotFound => {
                Error::NotFound(message)
            }
            ErrorCode::DirectoryNotEmpty => Error::NotEmpty(message),
            ErrorCode::InvalidRange => Error::OutOfBounds(message),
            ErrorCode::NoPendingCopyOperation => Error::NoPendingCopy(message),
            code => Error::RemoteService {
                status: Some(status),
                code: code.to_string(),
                message,
            },
        }
    }

    /// Error response whose body is not an [`ErrorBody`].
    pub(crate) fn unclassified(status: u16, text: String) -> Self {
        if status == 404 {
            return Error::NotFound(text);
        }
        Error::RemoteService {
            status: Some(status),
            code: format!("Http{status}"),
            message: text,
        }
    }

    /// Service error code for [`Error::RemoteService`].
    #[must_use]
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Error::RemoteService { code, .. } => Some(code),
            _ => None,
        }
    }
}
