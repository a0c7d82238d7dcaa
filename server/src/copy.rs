use std::sync::Arc;

use kernel::CopyStatus;

use crate::domain::{NodeRef, Storage, StorageError};
use crate::sqlite::{Mode, Sqlite};
use crate::AppState;

/// Runs a started copy in the background once the configured delay passed.
///
/// Completion applies only while the copy is still pending, so an abort that
/// lands first wins.
pub fn spawn(state: Arc<AppState>, destination: NodeRef, copy_id: String) {
    tokio::spawn(async move {
        tokio::time::sleep(state.copy_delay).await;
        let db = state.db.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut storage = Sqlite::open(db, Mode::ReadWrite)?;
            let outcome = storage.complete_copy(&destination, &copy_id);
            Ok::<_, StorageError>((destination, copy_id, outcome))
        })
        .await;

        match result {
            Ok(Ok((destination, copy_id, Ok(copy)))) => match copy.status {
                CopyStatus::Success => {
                    tracing::info!("copy {copy_id} from {} into {destination} succeeded", copy.source);
                }
                status => tracing::warn!(
                    "copy {copy_id} into {destination} ended {}: {}",
                    status.as_str(),
                    copy.status_description.unwrap_or_default()
                ),
            },
            Ok(Ok((destination, copy_id, Err(e)))) => {
                tracing::debug!("copy {copy_id} into {destination} not applied: {e}");
            }
            Ok(Err(e)) => tracing::error!("copy task cannot open storage: {e}"),
            Err(e) => tracing::error!("copy task panicked: {e}"),
        }
    });
}
