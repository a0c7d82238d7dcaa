#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod copy;
pub mod error;
pub mod file;
pub mod service;

pub use copy::{CopySource, CopyState, CopyStatus, StartCopyRequest};
pub use error::{ErrorBody, ErrorCode};
pub use file::{CreateFileRequest, FileHeaders, FileProperties, FileRange};
pub use service::{MetricsLevel, MetricsProperties, ServiceProperties};

/// User-defined name/value pairs stored alongside a share, directory or file.
///
/// Writes always replace the whole map.
pub type Metadata = BTreeMap<String, String>;

/// Largest body accepted by a single upload-range request (4 MiB).
pub const MAX_RANGE_SIZE: u64 = 4 * 1024 * 1024;

/// Largest share quota, in GiB. Also the quota of shares created without one.
pub const MAX_SHARE_QUOTA_GB: u32 = 5120;

/// Largest number of entries returned by one listing page.
pub const MAX_LIST_PAGE_SIZE: u32 = 5000;

/// Represents a share as reported by the account level listing.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct ShareItem {
    /// Share name, unique per account
    pub name: String,
    /// Share quota in GiB
    pub quota: u32,
    /// Time of the last change to the share's properties or metadata
    pub last_modified: DateTime<Utc>,
    /// Opaque version token of the share
    pub etag: String,
}

/// Properties of a single share.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct ShareProperties {
    /// Share quota in GiB
    pub quota: u32,
    /// Time of the last change to the share's properties or metadata
    pub last_modified: DateTime<Utc>,
    /// Opaque version token used for conditional updates
    pub etag: String,
    /// User-defined metadata
    pub metadata: Metadata,
}

/// Space used by the files of a share.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShareStats {
    /// Sum of the declared lengths of all files in the share
    pub usage_bytes: u64,
    /// Number of files in the share
    pub file_count: u64,
}

/// Request body of share creation.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateShareRequest {
    /// Quota in GiB, `MAX_SHARE_QUOTA_GB` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u32>,
    /// Metadata stored atomically with the new share
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request body of a quota change.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRequest {
    /// New quota in GiB
    pub quota: u32,
}

/// Request and response body of metadata reads and writes.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBody {
    /// Complete metadata map
    #[serde(default)]
    pub metadata: Metadata,
}

/// Properties of a directory node.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct DirectoryProperties {
    /// Normalized path inside the share, empty for the root directory
    pub path: String,
    /// Time of the last change to the directory's metadata
    pub last_modified: DateTime<Utc>,
    /// Opaque version token used for conditional updates
    pub etag: String,
    /// User-defined metadata
    pub metadata: Metadata,
}

/// Kind of a directory child.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Directory,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::File => "FILE",
            ItemKind::Directory => "DIR",
        }
    }
}

/// Entry of a directory listing.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Name of the child inside its parent directory
    pub name: String,
    /// Whether the child is a file or a directory
    pub kind: ItemKind,
    /// Declared length, present for files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// One page of a directory listing.
///
/// `next_marker` is present while more entries remain; pass it back to get
/// the next page.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries of this page
    pub items: Vec<ListItem>,
    /// Continuation marker for the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
}

/// Joins a parent path and a child name with the share path separator.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    let name = name.trim_matches('/');
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_owned(),
        (false, true) => parent.to_owned(),
        (false, false) => format!("{parent}/{name}"),
    }
}
