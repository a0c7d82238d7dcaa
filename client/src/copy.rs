//! Server-side copy.
//!
//! A copy is started on the destination file and runs in the service. Its
//! state is part of the destination's properties and moves from pending to
//! exactly one of success, failed or aborted. An abort that loses the race
//! with completion is reported as [`Error::NoPendingCopy`].

use std::time::{Duration, Instant};

use kernel::{CopySource, CopyState, ErrorCode, StartCopyRequest};
use reqwest::Method;

use crate::error::{Error, Result};
use crate::file::FileClient;

/// Fixed delay polling used by [`FileClient::wait_for_copy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up with [`Error::CopyTimedOut`] after this long; wait forever when `None`
    pub max_wait: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

impl FileClient {
    /// Starts copying `source` into this file and returns the copy id.
    pub async fn start_copy(&self, source: &FileClient) -> Result<String> {
        let body = StartCopyRequest {
            source: CopySource {
                share: source.share().name().to_owned(),
                path: source.path().to_owned(),
            },
        };
        let request = self.request(Method::PUT, &["copy"]).json(&body);
        let state: CopyState = self.share().transport().json(request).await?;
        tracing::debug!("copy {} started: {} into {}", state.id, state.source, self.path());
        Ok(state.id)
    }

    /// Last copy recorded on this file, `None` when it never was a copy target.
    pub async fn copy_status(&self) -> Result<Option<CopyState>> {
        Ok(self.get_properties().await?.copy)
    }

    /// Aborts a pending copy. Fails with [`Error::NoPendingCopy`] once the
    /// copy has finished.
    pub async fn abort_copy(&self, copy_id: &str) -> Result<CopyState> {
        let request = self
            .request(Method::DELETE, &["copy"])
            .query(&[("copy_id", copy_id)]);
        self.share().transport().json(request).await
    }

    /// Polls until the copy reaches a terminal status and returns it.
    ///
    /// A failed copy is a terminal state, not an error.
    pub async fn wait_for_copy(&self, copy_id: &str, options: &PollOptions) -> Result<CopyState> {
        let started = Instant::now();
        loop {
            let state = self.copy_status().await?.ok_or_else(|| {
                Error::NotFound(format!("no copy recorded on {}", self.path()))
            })?;
            if state.id != copy_id {
                return Err(Error::RemoteService {
                    status: None,
                    code: ErrorCode::CopyIdMismatch.to_string(),
                    message: format!(
                        "copy {copy_id} on {} was replaced by {}",
                        self.path(),
                        state.id
                    ),
                });
            }
            if state.status.is_terminal() {
                return Ok(state);
            }

            let waited = started.elapsed();
            if let Some(max_wait) = options.max_wait {
                if waited >= max_wait {
                    return Err(Error::CopyTimedOut {
                        copy_id: copy_id.to_owned(),
                        waited,
                    });
                }
            }
            tracing::trace!(
                "copy {copy_id} pending after {waited:?}, progress {}",
                state.progress.as_deref().unwrap_or("unknown")
            );
            tokio::time::sleep(options.interval).await;
        }
    }
}
