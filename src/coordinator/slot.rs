//! Single-flight operation slot
//!
//! Holds zero or one download. Claiming and finishing happen under one lock, so two
//! concurrent `start` calls can never both succeed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::download::Download;
use crate::error::{Error, Result};
use crate::types::DownloadId;

enum SlotState {
    /// Nothing ever started
    Idle,
    /// A download holds the slot
    Active {
        download: Download,
        cancel: CancellationToken,
    },
    /// The last download reached a terminal status
    Finished(Download),
}

pub(crate) struct OperationSlot {
    state: Mutex<SlotState>,
}

impl OperationSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ID of the download holding the slot
    pub(crate) fn active_id(&self) -> Option<DownloadId> {
        match &*self.lock() {
            SlotState::Active { download, .. } => Some(download.id()),
            SlotState::Idle | SlotState::Finished(_) => None,
        }
    }

    /// Take the slot for `download`, or report who holds it
    pub(crate) fn claim(&self, download: Download, cancel: CancellationToken) -> Result<()> {
        let mut state = self.lock();
        if let SlotState::Active { download: current, .. } = &*state {
            return Err(Error::AlreadyRunning { id: current.id() });
        }
        *state = SlotState::Active { download, cancel };
        Ok(())
    }

    /// Copy of the current (or last finished) download
    pub(crate) fn snapshot(&self) -> Option<Download> {
        match &*self.lock() {
            SlotState::Idle => None,
            SlotState::Active { download, .. } => Some(download.clone()),
            SlotState::Finished(download) => Some(download.clone()),
        }
    }

    /// Signal cancellation if `id` holds the slot
    pub(crate) fn cancel(&self, id: DownloadId) -> bool {
        match &*self.lock() {
            SlotState::Active { download, cancel } if download.id() == id => {
                if !cancel.is_cancelled() {
                    tracing::info!(download_id = %id, status = %download.status(), "Cancellation requested");
                    cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }

    /// Mutate the active download if it is `id`
    pub(crate) fn update<R>(&self, id: DownloadId, f: impl FnOnce(&mut Download) -> R) -> Option<R> {
        match &mut *self.lock() {
            SlotState::Active { download, .. } if download.id() == id => Some(f(download)),
            _ => None,
        }
    }

    /// Apply the terminal mutation and release the slot
    ///
    /// Returns the final download, or `None` if `id` does not hold the slot.
    pub(crate) fn finish(&self, id: DownloadId, f: impl FnOnce(&mut Download)) -> Option<Download> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Idle) {
            SlotState::Active { mut download, .. } if download.id() == id => {
                f(&mut download);
                *state = SlotState::Finished(download.clone());
                Some(download)
            }
            other => {
                *state = other;
                None
            }
        }
    }
}
