use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::live::{LiveValue, Subscription};
use crate::model::LaunchRecord;
use crate::storage::StorageHandle;

/// The feed's local launch cache.
///
/// Writes go through [`LaunchStore::upsert_all`] only. After each committed
/// batch the full `net`-ordered collection is re-read and published, so
/// observers never see a half-applied batch.
pub struct LaunchStore {
    storage: StorageHandle,
    launches: LiveValue<Vec<LaunchRecord>>,
    write_lock: Mutex<()>,
}

impl LaunchStore {
    pub fn open(storage: StorageHandle) -> Result<Self> {
        let initial = storage
            .fetch_launches()
            .context("loading cached launches")?;
        tracing::debug!(count = initial.len(), "launch store opened");
        Ok(Self {
            storage,
            launches: LiveValue::new(initial),
            write_lock: Mutex::new(()),
        })
    }

    pub fn upsert_all(&self, launches: &[LaunchRecord]) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let written = self.storage.upsert_launches(launches)?;
        let snapshot = self
            .storage
            .fetch_launches()
            .context("re-reading launches after upsert")?;
        tracing::debug!(written, total = snapshot.len(), "launch store updated");
        self.launches.publish(snapshot);
        Ok(written)
    }

    /// Live, `net`-ordered view of every cached launch.
    pub fn all(&self) -> Subscription<Vec<LaunchRecord>> {
        self.launches.subscribe()
    }

    pub fn by_id(&self, id: &str) -> Result<Option<LaunchRecord>> {
        self.storage.fetch_launch_by_id(id)
    }

    pub fn snapshot(&self) -> Result<Vec<LaunchRecord>> {
        self.storage.fetch_launches()
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }
}
