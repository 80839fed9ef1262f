//! Per-group sequencing. Operations on the same equivalence group take turns;
//! different groups proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct GroupLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one group operation.
pub struct GroupGuard {
    pub group_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, group_id: Uuid) -> GroupGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Nobody holds or waits on a slot whose only reference is the map's.
            slots.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(slots.entry(group_id).or_default())
        };
        GroupGuard {
            group_id,
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of live lock slots.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

}
