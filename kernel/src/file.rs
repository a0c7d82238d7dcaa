use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{CopyState, Metadata};

/// Standard content headers kept with a file.
///
/// Updates replace the whole set in one call.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeaders {
    /// MIME type returned on download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content encoding, e.g. `gzip`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Natural language of the content, e.g. `en`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Presentation hint returned on download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Caching directive returned on download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Base64 encoded MD5 hash of the whole content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
}

/// Properties of a file.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct FileProperties {
    /// Normalized path inside the share
    pub path: String,
    /// Declared length fixed at creation
    pub length: u64,
    /// Content headers
    pub headers: FileHeaders,
    /// Time of the last change to content, headers or metadata
    pub last_modified: DateTime<Utc>,
    /// Opaque version token used for conditional updates
    pub etag: String,
    /// User-defined metadata
    pub metadata: Metadata,
    /// State of the last copy that targeted this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<CopyState>,
}

/// Request body of file creation.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateFileRequest {
    /// Declared length; every byte starts unallocated
    pub length: u64,
    /// Content headers stored with the new file
    #[serde(default)]
    pub headers: FileHeaders,
    /// Metadata stored with the new file
    #[serde(default)]
    pub metadata: Metadata,
}

/// Allocated byte extent of a file. Both offsets are inclusive.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRange {
    /// First allocated byte
    pub start: u64,
    /// Last allocated byte
    pub end: u64,
}

impl FileRange {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes in the extent.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_len_is_inclusive() {
        // Arrange
        let range = FileRange::new(4096, 4607);

        // Act
        let len = range.len();

        // Assert
        assert_eq!(len, 512);
    }

    #[test]
    fn empty_headers_serialize_to_empty_object() {
        // Act
        let json = serde_json::to_string(&FileHeaders::default()).unwrap();

        // Assert
        assert_eq!(json, "{}");
    }
}
