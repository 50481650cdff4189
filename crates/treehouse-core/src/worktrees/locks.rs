use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::types::WorktreeKey;

/// One async mutex per `(base, label)`; there is no lock across labels.
///
/// Entries nobody holds are pruned whenever a new handle is taken.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    inner: Mutex<HashMap<WorktreeKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    fn handle(&self, key: &WorktreeKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Take the lock without waiting; `None` when it is held.
    pub(crate) fn try_acquire(&self, key: &WorktreeKey) -> Option<OwnedMutexGuard<()>> {
        self.handle(key).try_lock_owned().ok()
    }

    pub(crate) async fn acquire(&self, key: &WorktreeKey) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
