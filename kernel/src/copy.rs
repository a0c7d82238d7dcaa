use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status of a server-side copy.
///
/// A copy starts `Pending` and moves exactly once to one of the terminal
/// states.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }
}

/// File a copy reads from. Copies stay inside one account.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Share holding the source file
    pub share: String,
    /// Path of the source file inside the share
    pub path: String,
}

impl std::fmt::Display for CopySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.share, self.path)
    }
}

/// Request body of a copy start.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct StartCopyRequest {
    pub source: CopySource,
}

/// Copy state recorded on the destination file.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct CopyState {
    /// Identifier returned when the copy started
    pub id: String,
    /// Source of the copy
    pub source: CopySource,
    /// Current status
    pub status: CopyStatus,
    /// Bytes copied over total bytes, e.g. `512/1024`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Time the copy reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Reason of a failed or aborted copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}
