//! Per-equipment write serialisation.
//!
//! Every capacity- or counter-affecting operation on one equipment line runs
//! under that line's lock, so check-then-commit cannot interleave. Different
//! lines proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use equiplend_core::EquipmentId;

#[derive(Debug, Default)]
pub struct EquipmentLocks {
    inner: Mutex<HashMap<EquipmentId, Arc<AsyncMutex<()>>>>,
}

impl EquipmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `equipment_id`.
    pub async fn acquire(&self, equipment_id: EquipmentId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = match self.inner.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(equipment_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_equipment_is_exclusive() {
        let locks = Arc::new(EquipmentLocks::new());
        let id = EquipmentId::new();

        let guard = locks.acquire(id).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire(id).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_equipment_do_not_block() {
        let locks = EquipmentLocks::new();
        let _a = locks.acquire(EquipmentId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(EquipmentId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
