use kernel::{
    CopySource, CopyState, CreateFileRequest, CreateShareRequest, DirectoryProperties, ErrorCode,
    FileHeaders, FileProperties, FileRange, ListPage, Metadata, ServiceProperties, ShareItem,
    ShareProperties, ShareStats,
};
use thiserror::Error;

use crate::validation;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("share `{0}` already exists")]
    ShareAlreadyExists(String),
    #[error("share `{0}` not found")]
    ShareNotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("parent directory of `{0}` not found")]
    ParentNotFound(String),
    #[error("directory `{0}` is not empty")]
    DirectoryNotEmpty(String),
    #[error("range at offset {offset} with length {length} exceeds file length {file_length}")]
    InvalidRange {
        offset: u64,
        length: u64,
        file_length: u64,
    },
    #[error("there is no pending copy on `{0}`")]
    NoPendingCopy(String),
    #[error("copy `{0}` is already pending on the destination")]
    PendingCopy(String),
    #[error("copy id `{given}` does not match pending copy `{pending}`")]
    CopyIdMismatch { given: String, pending: String },
    #[error("condition not met: expected etag {expected}, current etag {actual}")]
    ConditionNotMet { expected: String, actual: String },
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("share quota of {quota} GiB exceeded")]
    QuotaExceeded { quota: u32 },
    #[error("body of {0} bytes exceeds the range size limit")]
    BodyTooLarge(u64),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::ShareAlreadyExists(_) => ErrorCode::ShareAlreadyExists,
            StorageError::ShareNotFound(_) => ErrorCode::ShareNotFound,
            StorageError::AlreadyExists(_) => ErrorCode::ResourceAlreadyExists,
            StorageError::NotFound(_) => ErrorCode::ResourceNotFound,
            StorageError::ParentNotFound(_) => ErrorCode::ParentNotFound,
            StorageError::DirectoryNotEmpty(_) => ErrorCode::DirectoryNotEmpty,
            StorageError::InvalidRange { .. } => ErrorCode::InvalidRange,
            StorageError::NoPendingCopy(_) => ErrorCode::NoPendingCopyOperation,
            StorageError::PendingCopy(_) => ErrorCode::PendingCopyOperation,
            StorageError::CopyIdMismatch { .. } => ErrorCode::CopyIdMismatch,
            StorageError::ConditionNotMet { .. } => ErrorCode::ConditionNotMet,
            StorageError::InvalidName { .. } => ErrorCode::InvalidResourceName,
            StorageError::InvalidMetadata(_) => ErrorCode::InvalidMetadata,
            StorageError::InvalidInput(_) => ErrorCode::InvalidInput,
            StorageError::QuotaExceeded { .. } => ErrorCode::ShareSizeLimitReached,
            StorageError::BodyTooLarge(_) => ErrorCode::RequestBodyTooLarge,
            StorageError::Sqlite(_) | StorageError::Io(_) | StorageError::Json(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

/// Share addressed by account and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRef {
    pub account: String,
    pub name: String,
}

impl ShareRef {
    pub fn new(account: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            name: name.into(),
        }
    }
}

/// Directory or file addressed by its normalized path inside a share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub share: ShareRef,
    path: String,
}

impl NodeRef {
    /// Normalizes `path` and validates every component of it.
    pub fn new(share: ShareRef, path: &str) -> Result<Self> {
        let path = validation::normalize_path(path)?;
        Ok(Self { share, path })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Path of the containing directory, empty for children of the root.
    #[must_use]
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(ix) => &self.path[..ix],
            None => "",
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self.path.rfind('/') {
            Some(ix) => &self.path[ix + 1..],
            None => &self.path,
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.share.name, self.path)
    }
}

/// File share storage backend.
///
/// Every method is one atomic operation: it either applies completely or
/// leaves the stored state unchanged.
pub trait Storage {
    fn new_database(&self) -> Result<()>;

    fn get_service_properties(&mut self, account: &str) -> Result<ServiceProperties>;

    fn set_service_properties(&mut self, account: &str, properties: &ServiceProperties)
        -> Result<()>;

    fn list_shares(&mut self, account: &str) -> Result<Vec<ShareItem>>;

    fn create_share(
        &mut self,
        share: &ShareRef,
        request: &CreateShareRequest,
    ) -> Result<ShareProperties>;

    fn get_share(&mut self, share: &ShareRef) -> Result<ShareProperties>;

    fn set_share_quota(
        &mut self,
        share: &ShareRef,
        quota: u32,
        if_match: Option<&str>,
    ) -> Result<ShareProperties>;

    fn set_share_metadata(
        &mut self,
        share: &ShareRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<ShareProperties>;

    fn get_share_stats(&mut self, share: &ShareRef) -> Result<ShareStats>;

    fn delete_share(&mut self, share: &ShareRef) -> Result<()>;

    fn create_directory(&mut self, node: &NodeRef, metadata: &Metadata)
        -> Result<DirectoryProperties>;

    fn get_directory(&mut self, node: &NodeRef) -> Result<DirectoryProperties>;

    fn set_directory_metadata(
        &mut self,
        node: &NodeRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<DirectoryProperties>;

    fn delete_directory(&mut self, node: &NodeRef) -> Result<()>;

    fn list_directory(
        &mut self,
        node: &NodeRef,
        marker: Option<&str>,
        max_results: u32,
    ) -> Result<ListPage>;

    fn create_file(&mut self, node: &NodeRef, request: &CreateFileRequest) -> Result<FileProperties>;

    fn get_file(&mut self, node: &NodeRef) -> Result<FileProperties>;

    fn set_file_headers(
        &mut self,
        node: &NodeRef,
        headers: &FileHeaders,
        if_match: Option<&str>,
    ) -> Result<FileProperties>;

    fn set_file_metadata(
        &mut self,
        node: &NodeRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<FileProperties>;

    fn delete_file(&mut self, node: &NodeRef) -> Result<()>;

    fn write_range(&mut self, node: &NodeRef, offset: u64, data: &[u8]) -> Result<FileProperties>;

    fn clear_range(&mut self, node: &NodeRef, offset: u64, length: u64) -> Result<FileProperties>;

    fn list_ranges(&mut self, node: &NodeRef) -> Result<Vec<FileRange>>;

    /// Reads `length` bytes at `offset`, up to the end of the file when no
    /// length is given. Unallocated bytes read as zeros.
    fn read_range(
        &mut self,
        node: &NodeRef,
        offset: u64,
        length: Option<u64>,
    ) -> Result<(FileProperties, Vec<u8>)>;

    /// Records a pending copy on the destination and sizes it like the source.
    fn begin_copy(&mut self, node: &NodeRef, source: &CopySource, copy_id: &str)
        -> Result<CopyState>;

    /// Transfers the source into the destination if the copy is still pending.
    fn complete_copy(&mut self, node: &NodeRef, copy_id: &str) -> Result<CopyState>;

    fn abort_copy(&mut self, node: &NodeRef, copy_id: &str) -> Result<CopyState>;
}
