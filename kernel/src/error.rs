use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine readable failure reported by the file service.
///
/// Each code owns the HTTP status it is returned with.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ShareAlreadyExists,
    ShareNotFound,
    ResourceAlreadyExists,
    ResourceNotFound,
    ParentNotFound,
    DirectoryNotEmpty,
    InvalidRange,
    NoPendingCopyOperation,
    PendingCopyOperation,
    CopyIdMismatch,
    ConditionNotMet,
    InvalidResourceName,
    InvalidMetadata,
    InvalidInput,
    ShareSizeLimitReached,
    RequestBodyTooLarge,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::ShareNotFound | ErrorCode::ResourceNotFound | ErrorCode::ParentNotFound => {
                404
            }
            ErrorCode::ShareAlreadyExists
            | ErrorCode::ResourceAlreadyExists
            | ErrorCode::DirectoryNotEmpty
            | ErrorCode::NoPendingCopyOperation
            | ErrorCode::PendingCopyOperation
            | ErrorCode::CopyIdMismatch => 409,
            ErrorCode::ConditionNotMet => 412,
            ErrorCode::ShareSizeLimitReached | ErrorCode::RequestBodyTooLarge => 413,
            ErrorCode::InvalidRange => 416,
            ErrorCode::InvalidResourceName | ErrorCode::InvalidMetadata | ErrorCode::InvalidInput => {
                400
            }
            ErrorCode::InternalError => 500,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ShareAlreadyExists => "ShareAlreadyExists",
            ErrorCode::ShareNotFound => "ShareNotFound",
            ErrorCode::ResourceAlreadyExists => "ResourceAlreadyExists",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::ParentNotFound => "ParentNotFound",
            ErrorCode::DirectoryNotEmpty => "DirectoryNotEmpty",
            ErrorCode::InvalidRange => "InvalidRange",
            ErrorCode::NoPendingCopyOperation => "NoPendingCopyOperation",
            ErrorCode::PendingCopyOperation => "PendingCopyOperation",
            ErrorCode::CopyIdMismatch => "CopyIdMismatch",
            ErrorCode::ConditionNotMet => "ConditionNotMet",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::InvalidMetadata => "InvalidMetadata",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::ShareSizeLimitReached => "ShareSizeLimitReached",
            ErrorCode::RequestBodyTooLarge => "RequestBodyTooLarge",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every error response.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// Failure classification
    pub code: ErrorCode,
    /// Human readable details
    pub message: String,
}
